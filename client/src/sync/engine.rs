//! Reconciliation engine
//!
//! Owns the single light/schedule/timer state of the application. Other
//! components only hand it raw poll results and proposed edits; the engine
//! decides what is displayed and publishes every change as a [`Snapshot`]
//! on a `watch` channel.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveTime, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::errors::ClientError;
use crate::models::light::{LightId, PowerStatus};
use crate::models::schedule::{ScheduleEdit, ScheduleField};
use crate::models::snapshot::{RemoteState, ScheduleView, Snapshot, TimerView};
use crate::models::timer::TimerDuration;
use crate::sync::field::{MutationId, Observation, TrackedField};

/// Engine options
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Consecutive disagreeing polls before a pending edit is dropped
    pub staleness_threshold: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            staleness_threshold: 3,
        }
    }
}

/// Address of one tracked field
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldKey {
    Light(LightId),
    Schedule(ScheduleField),
    TimerDuration,
    AutoTimeout,
    NotifyDuration,
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKey::Light(id) => write!(f, "light {}", id),
            FieldKey::Schedule(field) => write!(f, "schedule {}", field),
            FieldKey::TimerDuration => f.write_str("timer duration"),
            FieldKey::AutoTimeout => f.write_str("auto timeout"),
            FieldKey::NotifyDuration => f.write_str("notify duration"),
        }
    }
}

/// A proposed optimistic change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    Power { light: LightId, status: PowerStatus },
    Schedule(ScheduleEdit),
    TimerDuration(TimerDuration),
    AutoTimeout(bool),
    NotifyDuration(u32),
}

impl Edit {
    pub fn key(&self) -> FieldKey {
        match self {
            Edit::Power { light, .. } => FieldKey::Light(light.clone()),
            Edit::Schedule(edit) => FieldKey::Schedule(edit.field()),
            Edit::TimerDuration(_) => FieldKey::TimerDuration,
            Edit::AutoTimeout(_) => FieldKey::AutoTimeout,
            Edit::NotifyDuration(_) => FieldKey::NotifyDuration,
        }
    }
}

/// What one reconciliation cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub revision: u64,
    pub confirmed: Vec<FieldKey>,
    pub disagreed: Vec<FieldKey>,
    pub force_cleared: Vec<FieldKey>,
    pub pruned: Vec<LightId>,
}

#[derive(Debug, Default)]
struct ScheduleFields {
    wake_up: TrackedField<NaiveTime>,
    wake_up_light: TrackedField<LightId>,
    sleep: TrackedField<NaiveTime>,
    sleep_light: TrackedField<LightId>,
}

#[derive(Debug, Default)]
struct EngineState {
    sequence: u64,
    revision: u64,
    authenticated: bool,
    lights: BTreeMap<LightId, TrackedField<PowerStatus>>,
    schedule: ScheduleFields,
    timer_duration: TrackedField<TimerDuration>,
    auto_timeout: TrackedField<bool>,
    notify_duration: TrackedField<u32>,
    last_applied_poll: u64,
    reset_at: u64,
    last_polled_at: Option<DateTime<Utc>>,
}

impl EngineState {
    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn is_pending(&self, key: &FieldKey) -> bool {
        match key {
            FieldKey::Light(id) => self.lights.get(id).is_some_and(|f| f.is_pending()),
            FieldKey::Schedule(ScheduleField::WakeUp) => self.schedule.wake_up.is_pending(),
            FieldKey::Schedule(ScheduleField::WakeUpLight) => self.schedule.wake_up_light.is_pending(),
            FieldKey::Schedule(ScheduleField::Sleep) => self.schedule.sleep.is_pending(),
            FieldKey::Schedule(ScheduleField::SleepLight) => self.schedule.sleep_light.is_pending(),
            FieldKey::TimerDuration => self.timer_duration.is_pending(),
            FieldKey::AutoTimeout => self.auto_timeout.is_pending(),
            FieldKey::NotifyDuration => self.notify_duration.is_pending(),
        }
    }

    /// Apply an already validated edit
    fn propose(&mut self, edit: Edit, id: MutationId) -> Result<(), MutationId> {
        match edit {
            Edit::Power { light, status } => match self.lights.get_mut(&light) {
                Some(field) => field.propose(status, id),
                None => Ok(()),
            },
            Edit::Schedule(ScheduleEdit::WakeUp(t)) => self.schedule.wake_up.propose(t, id),
            Edit::Schedule(ScheduleEdit::WakeUpLight(l)) => self.schedule.wake_up_light.propose(l, id),
            Edit::Schedule(ScheduleEdit::Sleep(t)) => self.schedule.sleep.propose(t, id),
            Edit::Schedule(ScheduleEdit::SleepLight(l)) => self.schedule.sleep_light.propose(l, id),
            Edit::TimerDuration(d) => self.timer_duration.propose(d, id),
            Edit::AutoTimeout(enabled) => self.auto_timeout.propose(enabled, id),
            Edit::NotifyDuration(secs) => self.notify_duration.propose(secs, id),
        }
    }

    /// Acknowledge the edit at sequence `acknowledged_at`, or revert it when `None`
    fn settle(&mut self, key: &FieldKey, id: MutationId, acknowledged_at: Option<u64>) -> bool {
        macro_rules! settle {
            ($field:expr) => {
                match acknowledged_at {
                    Some(at) => $field.acknowledge(id, at),
                    None => $field.reject(id),
                }
            };
        }

        match key {
            FieldKey::Light(light) => match self.lights.get_mut(light) {
                Some(field) => settle!(field),
                None => false,
            },
            FieldKey::Schedule(ScheduleField::WakeUp) => settle!(self.schedule.wake_up),
            FieldKey::Schedule(ScheduleField::WakeUpLight) => settle!(self.schedule.wake_up_light),
            FieldKey::Schedule(ScheduleField::Sleep) => settle!(self.schedule.sleep),
            FieldKey::Schedule(ScheduleField::SleepLight) => settle!(self.schedule.sleep_light),
            FieldKey::TimerDuration => settle!(self.timer_duration),
            FieldKey::AutoTimeout => settle!(self.auto_timeout),
            FieldKey::NotifyDuration => settle!(self.notify_duration),
        }
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            revision: self.revision,
            authenticated: self.authenticated,
            lights: self
                .lights
                .iter()
                .map(|(id, field)| (id.clone(), field.view()))
                .collect(),
            schedule: ScheduleView {
                wake_up: self.schedule.wake_up.view(),
                wake_up_light: self.schedule.wake_up_light.view(),
                sleep: self.schedule.sleep.view(),
                sleep_light: self.schedule.sleep_light.view(),
            },
            timer: TimerView {
                duration: self.timer_duration.view(),
                auto_timeout_enabled: self.auto_timeout.view(),
            },
            notify_duration: self.notify_duration.view(),
            last_polled_at: self.last_polled_at,
        }
    }
}

fn record(report: &mut ReconcileReport, key: FieldKey, observation: Observation) {
    match observation {
        Observation::Confirmed => {
            debug!("Poll confirmed pending {}", key);
            report.confirmed.push(key);
        }
        Observation::Disagreed { count } => {
            debug!("Poll disagreed with pending {} ({} so far)", key, count);
            report.disagreed.push(key);
        }
        Observation::ForceCleared => {
            warn!("Pending {} never confirmed, reverting to polled value", key);
            report.force_cleared.push(key);
        }
        Observation::Unchanged | Observation::Updated | Observation::Skipped => {}
    }
}

/// Reconciliation engine
pub struct ReconciliationEngine {
    options: EngineOptions,
    state: Mutex<EngineState>,
    snapshots: watch::Sender<Snapshot>,
}

impl ReconciliationEngine {
    /// Create an engine with an empty, unauthenticated snapshot
    pub fn new(options: EngineOptions) -> Self {
        let (snapshots, _) = watch::channel(Snapshot::default());
        Self {
            options,
            state: Mutex::new(EngineState::default()),
            snapshots,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    /// Subscribe to snapshot updates
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Publish while the state lock is held so revisions are emitted in order
    fn publish(&self, state: &mut EngineState) -> u64 {
        state.revision += 1;
        self.snapshots.send_replace(state.to_snapshot());
        state.revision
    }

    pub fn set_authenticated(&self, authenticated: bool) {
        let mut state = self.lock();
        if state.authenticated != authenticated {
            state.authenticated = authenticated;
            self.publish(&mut state);
        }
    }

    /// Take the sequence marker for a poll cycle that is about to start
    pub fn begin_poll(&self) -> u64 {
        self.lock().next_sequence()
    }

    /// Merge a poll result that was started at `started`.
    ///
    /// Returns `None` when the result is superseded (an equal or newer poll was
    /// already applied, or the engine was reset after the poll began).
    pub fn apply_poll(&self, started: u64, remote: RemoteState) -> Option<ReconcileReport> {
        let mut state = self.lock();

        if started <= state.last_applied_poll || started < state.reset_at {
            debug!(
                "Discarding superseded poll result (started at {}, last applied {}, reset at {})",
                started, state.last_applied_poll, state.reset_at
            );
            return None;
        }
        state.last_applied_poll = started;

        let at = remote.fetched_at;
        let threshold = self.options.staleness_threshold;
        let mut report = ReconcileReport::default();

        let polled_ids: HashSet<LightId> = remote.lights.keys().cloned().collect();
        for (id, status) in remote.lights {
            let field = state.lights.entry(id.clone()).or_default();
            let observation = field.observe(Some(status), at, started, threshold);
            record(&mut report, FieldKey::Light(id), observation);
        }

        // Lights the service no longer reports are pruned unless an edit is in flight
        let vanished: Vec<LightId> = state
            .lights
            .keys()
            .filter(|id| !polled_ids.contains(*id))
            .cloned()
            .collect();
        for id in vanished {
            let keep = state.lights.get(&id).is_some_and(|f| f.is_pending());
            if !keep {
                state.lights.remove(&id);
                report.pruned.push(id);
            }
        }

        let schedule = remote.schedule;
        let observation = state.schedule.wake_up.observe(schedule.wake_up, at, started, threshold);
        record(&mut report, FieldKey::Schedule(ScheduleField::WakeUp), observation);
        let observation = state
            .schedule
            .wake_up_light
            .observe(schedule.wake_up_light, at, started, threshold);
        record(&mut report, FieldKey::Schedule(ScheduleField::WakeUpLight), observation);
        let observation = state.schedule.sleep.observe(schedule.sleep, at, started, threshold);
        record(&mut report, FieldKey::Schedule(ScheduleField::Sleep), observation);
        let observation = state
            .schedule
            .sleep_light
            .observe(schedule.sleep_light, at, started, threshold);
        record(&mut report, FieldKey::Schedule(ScheduleField::SleepLight), observation);

        let observation = state
            .timer_duration
            .observe(remote.timer_duration, at, started, threshold);
        record(&mut report, FieldKey::TimerDuration, observation);
        let observation = state
            .auto_timeout
            .observe(remote.auto_timeout_enabled, at, started, threshold);
        record(&mut report, FieldKey::AutoTimeout, observation);
        let observation = state
            .notify_duration
            .observe(remote.notify_duration, at, started, threshold);
        record(&mut report, FieldKey::NotifyDuration, observation);

        state.last_polled_at = Some(at);
        report.revision = self.publish(&mut state);
        Some(report)
    }

    /// Mark the opposite of a light's confirmed status as pending.
    ///
    /// Returns the mutation id and the requested status.
    pub fn begin_toggle(&self, light: &LightId) -> Result<(MutationId, PowerStatus), ClientError> {
        let mut state = self.lock();

        let current = match state.lights.get(light) {
            None => {
                return Err(ClientError::ValidationError(format!("unknown light {}", light)));
            }
            Some(field) if field.is_pending() => {
                return Err(ClientError::ConflictError(format!(
                    "light {} already has a pending toggle",
                    light
                )));
            }
            Some(field) => field.confirmed().copied(),
        };
        let Some(current) = current else {
            return Err(ClientError::ValidationError(format!(
                "status of light {} is not known yet",
                light
            )));
        };

        let status = current.toggled();
        let id = MutationId(state.next_sequence());
        let edit = Edit::Power {
            light: light.clone(),
            status,
        };
        state
            .propose(edit, id)
            .map_err(|existing| ClientError::Internal(format!("unexpected pending edit {}", existing)))?;
        self.publish(&mut state);

        debug!("Light {} pending {} ({})", light, status.as_str(), id);
        Ok((id, status))
    }

    /// Mark all `edits` as pending under one mutation id, or none of them.
    pub fn propose(&self, edits: Vec<Edit>) -> Result<MutationId, ClientError> {
        if edits.is_empty() {
            return Err(ClientError::ValidationError("nothing to update".to_string()));
        }

        let mut state = self.lock();

        let mut keys = HashSet::new();
        for edit in &edits {
            let key = edit.key();
            if let Edit::Power { light, .. } = edit {
                if !state.lights.contains_key(light) {
                    return Err(ClientError::ValidationError(format!("unknown light {}", light)));
                }
            }
            if state.is_pending(&key) {
                return Err(ClientError::ConflictError(format!(
                    "{} already has a pending change",
                    key
                )));
            }
            if !keys.insert(key.clone()) {
                return Err(ClientError::ValidationError(format!(
                    "{} is edited twice in one request",
                    key
                )));
            }
        }

        let id = MutationId(state.next_sequence());
        for edit in edits {
            state
                .propose(edit, id)
                .map_err(|existing| ClientError::Internal(format!("unexpected pending edit {}", existing)))?;
        }
        self.publish(&mut state);

        debug!("Proposed {} field(s) as {}", keys.len(), id);
        Ok(id)
    }

    /// The remote write for `id` succeeded. Polls started from here on may
    /// confirm or dispute the edit.
    pub fn acknowledge(&self, keys: &[FieldKey], id: MutationId) {
        let mut state = self.lock();
        let at = state.next_sequence();
        let mut changed = false;
        for key in keys {
            changed |= state.settle(key, id, Some(at));
        }
        if changed {
            self.publish(&mut state);
        }
    }

    /// The remote write for `id` failed: revert those fields
    pub fn reject(&self, keys: &[FieldKey], id: MutationId) {
        let mut state = self.lock();
        let mut reverted = false;
        for key in keys {
            if state.settle(key, id, None) {
                debug!("Reverted {} ({})", key, id);
                reverted = true;
            }
        }
        if reverted {
            self.publish(&mut state);
        }
    }

    /// Drop everything, including pending edits, and return to an empty
    /// unauthenticated snapshot. Polls started before this point are ignored.
    pub fn reset(&self) {
        let mut state = self.lock();
        let reset_at = state.next_sequence();
        let sequence = state.sequence;
        let revision = state.revision;
        let last_applied_poll = state.last_applied_poll;

        *state = EngineState {
            sequence,
            revision,
            last_applied_poll,
            reset_at,
            ..Default::default()
        };
        self.publish(&mut state);
        info!("Sync state reset");
    }
}

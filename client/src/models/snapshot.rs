//! Poll results and the reconciled snapshot observed by the application

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveTime, Utc};

use crate::models::light::{LightId, PowerStatus};
use crate::models::schedule::RemoteSchedule;
use crate::models::timer::TimerDuration;

/// Authoritative state returned by one poll cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteState {
    pub lights: BTreeMap<LightId, PowerStatus>,
    pub schedule: RemoteSchedule,
    pub timer_duration: Option<TimerDuration>,
    pub auto_timeout_enabled: Option<bool>,
    pub notify_duration: Option<u32>,
    pub fetched_at: DateTime<Utc>,
}

impl RemoteState {
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self {
            lights: BTreeMap::new(),
            schedule: RemoteSchedule::default(),
            timer_duration: None,
            auto_timeout_enabled: None,
            notify_duration: None,
            fetched_at,
        }
    }
}

/// Synchronization phase of a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldPhase {
    /// Value is purely poll-driven
    #[default]
    Confirmed,
    /// A local edit is shown and no poll has disagreed with it yet
    Pending,
    /// A local edit is shown but at least one poll has disagreed
    StalePending,
}

impl FieldPhase {
    pub fn is_pending(&self) -> bool {
        !matches!(self, FieldPhase::Confirmed)
    }
}

/// Displayed state of one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldView<T> {
    /// What the interface shows: the pending value if any, else the confirmed one
    pub value: Option<T>,
    pub confirmed: Option<T>,
    pub pending: Option<T>,
    pub phase: FieldPhase,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl<T> Default for FieldView<T> {
    fn default() -> Self {
        Self {
            value: None,
            confirmed: None,
            pending: None,
            phase: FieldPhase::Confirmed,
            confirmed_at: None,
        }
    }
}

impl<T> FieldView<T> {
    pub fn is_pending(&self) -> bool {
        self.phase.is_pending()
    }
}

pub type LightView = FieldView<PowerStatus>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleView {
    pub wake_up: FieldView<NaiveTime>,
    pub wake_up_light: FieldView<LightId>,
    pub sleep: FieldView<NaiveTime>,
    pub sleep_light: FieldView<LightId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerView {
    pub duration: FieldView<TimerDuration>,
    pub auto_timeout_enabled: FieldView<bool>,
}

/// The single reconciled view of the remote system
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Strictly increasing across published snapshots
    pub revision: u64,
    pub authenticated: bool,
    pub lights: BTreeMap<LightId, LightView>,
    pub schedule: ScheduleView,
    pub timer: TimerView,
    pub notify_duration: FieldView<u32>,
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    pub fn light(&self, id: &LightId) -> Option<&LightView> {
        self.lights.get(id)
    }

    /// Whether any field is still awaiting confirmation
    pub fn has_pending(&self) -> bool {
        self.lights.values().any(|l| l.is_pending())
            || self.schedule.wake_up.is_pending()
            || self.schedule.wake_up_light.is_pending()
            || self.schedule.sleep.is_pending()
            || self.schedule.sleep_light.is_pending()
            || self.timer.duration.is_pending()
            || self.timer.auto_timeout_enabled.is_pending()
            || self.notify_duration.is_pending()
    }
}

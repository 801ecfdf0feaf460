//! Remote state poller
//!
//! Fetches the full light, schedule and timer state on a fixed interval and
//! hands every result to the reconciliation engine and to poll observers.
//! At most one cycle is in flight; ticks that fire while a cycle is running
//! are skipped. `stop()` bumps a generation counter under the emission lock,
//! so a cycle that finishes afterwards is dropped without being emitted, and
//! `poll_now()` refuses to run until the poller is started again.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::authn::credential::Credential;
use crate::authn::session::SessionManager;
use crate::errors::{ClientError, PollError};
use crate::http::service::LightService;
use crate::models::snapshot::RemoteState;
use crate::sync::engine::ReconciliationEngine;

/// Poller worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Polling interval
    pub interval: Duration,

    /// Upper bound for one cycle. Defaults to the polling interval.
    pub cycle_timeout: Option<Duration>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            cycle_timeout: None,
        }
    }
}

/// Result of one poll cycle as seen by observers
pub type PollResult = Result<RemoteState, PollError>;

/// Observers run under the emission lock and must not call back into the poller
pub type PollObserver = Box<dyn Fn(&PollResult) + Send + Sync>;

/// One poll cycle in flight
#[derive(Debug, Clone)]
pub struct SyncSession {
    /// Identifies the cycle in logs
    pub request_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Engine sequence marker taken when the cycle started
    pub sequence: u64,
    generation: u64,
}

struct Shared {
    engine: Arc<ReconciliationEngine>,
    session: Arc<SessionManager>,
    service: Arc<dyn LightService>,
    options: Mutex<Options>,
    observers: Mutex<Vec<PollObserver>>,
    emission: Mutex<()>,
    generation: AtomicU64,
    stopped: AtomicBool,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a cycle ends, including on abort
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Poller {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Poller {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        session: Arc<SessionManager>,
        service: Arc<dyn LightService>,
        options: Options,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                engine,
                session,
                service,
                options: Mutex::new(options),
                observers: Mutex::new(Vec::new()),
                emission: Mutex::new(()),
                generation: AtomicU64::new(0),
                stopped: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    /// Register an observer called once per completed cycle
    pub fn on_result<F>(&self, observer: F)
    where
        F: Fn(&PollResult) + Send + Sync + 'static,
    {
        self.shared
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(observer));
    }

    /// Poll once now and then every `every`. Restarts a running poller.
    pub fn start(&self, every: Duration) {
        self.stop();
        self.shared.stopped.store(false, Ordering::SeqCst);

        let every = every.max(Duration::from_millis(1));
        self.shared.lock_options().interval = every;
        let generation = self.shared.generation.load(Ordering::SeqCst);

        let shared = self.shared.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if shared.generation.load(Ordering::SeqCst) != generation {
                    return;
                }
                shared.cycle(generation).await;
            }
        });

        *self.lock_task() = Some(handle);
        info!("Poller started, interval {:?}", every);
    }

    /// Stop polling. Once this returns no observer is called and the engine
    /// receives no further poll results, even from a cycle still in flight.
    pub fn stop(&self) {
        {
            let _emission = self.shared.lock_emission();
            self.shared.stopped.store(true, Ordering::SeqCst);
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
            info!("Poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_task().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Run one cycle immediately. Returns `false` when the poller was
    /// stopped, a cycle is already in flight or nobody is signed in.
    pub async fn poll_now(&self) -> bool {
        // generation first: a stop() racing with this call is caught either here or in emit
        let generation = self.shared.generation.load(Ordering::SeqCst);
        if self.shared.stopped.load(Ordering::SeqCst) {
            debug!("Poller stopped, skipping poll");
            return false;
        }
        self.shared.cycle(generation).await
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        if let Some(handle) = self.lock_task().take() {
            handle.abort();
        }
    }
}

impl Shared {
    fn lock_options(&self) -> std::sync::MutexGuard<'_, Options> {
        self.options.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_emission(&self) -> std::sync::MutexGuard<'_, ()> {
        self.emission.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn cycle(&self, generation: u64) -> bool {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("Poll already in flight, skipping");
            return false;
        }
        let _in_flight = InFlight(&self.in_flight);

        if !self.session.is_signed_in() {
            debug!("Not signed in, skipping poll");
            return false;
        }

        let limit = {
            let options = self.lock_options();
            options.cycle_timeout.unwrap_or(options.interval)
        };

        let sync = SyncSession {
            request_id: Uuid::new_v4(),
            started_at: Utc::now(),
            sequence: self.engine.begin_poll(),
            generation,
        };
        debug!(request_id = %sync.request_id, sequence = sync.sequence, "Poll cycle started");

        let (credential, outcome) = match self.session.fresh_credential().await {
            Ok(credential) => {
                let outcome = match timeout(limit, fetch_remote_state(self.service.as_ref(), &credential)).await {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::Timeout(limit)),
                };
                (Some(credential), outcome)
            }
            Err(e) => (None, Err(e)),
        };

        let rejected = matches!(outcome, Err(ClientError::Unauthorized(_)));
        if outcome.is_ok() {
            self.session.report_accepted();
        }

        let result = outcome.map_err(|e| e.to_poll_error());
        if let Err(e) = &result {
            warn!(request_id = %sync.request_id, "Poll failed: {}", e);
        }
        if !self.emit(&sync, result) {
            return true;
        }

        // reported first, then handed to the session's refresh policy
        if let (true, Some(credential)) = (rejected, credential) {
            if let Err(e) = self.session.report_rejected(&credential).await {
                warn!("Session could not recover from rejected poll: {}", e);
            }
        }
        true
    }

    fn emit(&self, sync: &SyncSession, result: PollResult) -> bool {
        let _emission = self.lock_emission();
        if self.generation.load(Ordering::SeqCst) != sync.generation {
            debug!(request_id = %sync.request_id, "Discarding poll result of a stopped poller");
            return false;
        }

        if let Ok(remote) = &result {
            match self.engine.apply_poll(sync.sequence, remote.clone()) {
                Some(report) => debug!(
                    request_id = %sync.request_id,
                    revision = report.revision,
                    "Poll applied in {} ms",
                    (Utc::now() - sync.started_at).num_milliseconds()
                ),
                None => debug!(request_id = %sync.request_id, "Poll result superseded"),
            }
        }

        let observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        for observer in observers.iter() {
            observer(&result);
        }
        true
    }
}

/// Read everything the engine tracks under one credential
pub async fn fetch_remote_state(service: &dyn LightService, credential: &Credential) -> Result<RemoteState, ClientError> {
    let ids = service.list_lights(credential).await?;

    let lights = async {
        if ids.is_empty() {
            Ok(BTreeMap::new())
        } else {
            service.light_status(credential, &ids).await
        }
    };
    let (lights, schedule, timer_duration, auto_timeout_enabled, notify_duration) = futures::try_join!(
        lights,
        service.get_schedule(credential),
        service.get_timer(credential),
        service.get_auto_timeout(credential),
        service.get_notify_duration(credential),
    )?;

    Ok(RemoteState {
        lights,
        schedule,
        timer_duration,
        auto_timeout_enabled,
        notify_duration,
        fetched_at: Utc::now(),
    })
}

/// Run the poller until shutdown
pub async fn run(options: &Options, poller: &Poller, shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>) {
    info!("Poller worker starting...");
    poller.start(options.interval);

    shutdown_signal.await;

    info!("Poller worker shutting down...");
    poller.stop();
}

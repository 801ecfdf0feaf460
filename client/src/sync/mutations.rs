//! Optimistic mutation queue
//!
//! Every request marks its fields pending in the engine (which publishes a
//! new snapshot before the first await), performs the remote write under
//! the session's auth policy, and then either acknowledges the write or
//! reverts the fields to their last confirmed value.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::authn::credential::Credential;
use crate::authn::session::SessionManager;
use crate::errors::ClientError;
use crate::http::service::LightService;
use crate::models::light::{EnergyData, LightId, PowerStatus};
use crate::models::schedule::ScheduleEdit;
use crate::models::timer::TimerDuration;
use crate::sync::engine::{Edit, FieldKey, ReconciliationEngine};
use crate::sync::field::MutationId;

#[derive(Debug, Clone)]
pub struct MutationOptions {
    /// Upper bound for one remote write, including a refresh-and-retry
    pub request_timeout: Duration,
}

impl Default for MutationOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

pub struct MutationQueue {
    engine: Arc<ReconciliationEngine>,
    session: Arc<SessionManager>,
    service: Arc<dyn LightService>,
    options: MutationOptions,
}

impl MutationQueue {
    pub fn new(
        engine: Arc<ReconciliationEngine>,
        session: Arc<SessionManager>,
        service: Arc<dyn LightService>,
        options: MutationOptions,
    ) -> Self {
        Self {
            engine,
            session,
            service,
            options,
        }
    }

    /// Flip a light to the opposite of its last known status.
    ///
    /// Fails with `ConflictError` while a toggle of the same light is
    /// outstanding and with `ValidationError` for an unknown light.
    pub async fn request_toggle(&self, light: &LightId) -> Result<PowerStatus, ClientError> {
        let (id, status) = self.engine.begin_toggle(light)?;
        info!("Switching light {} {}", light, status.as_str());

        let result = self
            .remote(|credential| {
                let service = self.service.clone();
                let light = light.clone();
                async move { service.set_power(&credential, &light, status).await }
            })
            .await;

        self.settle(&[FieldKey::Light(light.clone())], id, result)?;
        Ok(status)
    }

    pub async fn request_schedule_update(&self, edit: ScheduleEdit) -> Result<(), ClientError> {
        self.request_schedule_updates(vec![edit]).await
    }

    /// Edit several schedule fields in one remote write. All fields are
    /// marked pending together and reverted together on failure.
    pub async fn request_schedule_updates(&self, edits: Vec<ScheduleEdit>) -> Result<(), ClientError> {
        let keys: Vec<FieldKey> = edits.iter().map(|e| FieldKey::Schedule(e.field())).collect();
        let id = self
            .engine
            .propose(edits.iter().cloned().map(Edit::Schedule).collect())?;
        debug!("Updating schedule fields {:?} ({})", keys, id);

        let edits = Arc::new(edits);
        let result = self
            .remote(|credential| {
                let service = self.service.clone();
                let edits = edits.clone();
                async move { service.put_schedule(&credential, &edits).await }
            })
            .await;

        self.settle(&keys, id, result)
    }

    /// Set the idle timeout. The duration and the auto-timeout flag are
    /// written concurrently and reverted independently; the flag is only
    /// written when it differs from what is displayed.
    pub async fn request_timer_update(&self, duration: TimerDuration, enabled: bool) -> Result<(), ClientError> {
        duration.validate()?;

        let flag_changed = self.engine.snapshot().timer.auto_timeout_enabled.value != Some(enabled);
        let mut edits = vec![Edit::TimerDuration(duration)];
        if flag_changed {
            edits.push(Edit::AutoTimeout(enabled));
        }
        let id = self.engine.propose(edits)?;
        info!("Setting idle timeout to {} (auto timeout {})", duration, enabled);

        let duration_write = self.remote(|credential| {
            let service = self.service.clone();
            async move { service.put_timer(&credential, duration).await }
        });
        let flag_write = async {
            if !flag_changed {
                return Ok(());
            }
            self.remote(|credential| {
                let service = self.service.clone();
                async move { service.put_auto_timeout(&credential, enabled).await }
            })
            .await
        };
        let (duration_result, flag_result) = futures::join!(duration_write, flag_write);

        let duration_result = self.settle(&[FieldKey::TimerDuration], id, duration_result);
        let flag_result = if flag_changed {
            self.settle(&[FieldKey::AutoTimeout], id, flag_result)
        } else {
            Ok(())
        };
        duration_result.and(flag_result)
    }

    /// Change only the auto-timeout flag
    pub async fn request_auto_timeout(&self, enabled: bool) -> Result<(), ClientError> {
        let id = self.engine.propose(vec![Edit::AutoTimeout(enabled)])?;

        let result = self
            .remote(|credential| {
                let service = self.service.clone();
                async move { service.put_auto_timeout(&credential, enabled).await }
            })
            .await;

        self.settle(&[FieldKey::AutoTimeout], id, result)
    }

    /// Seconds a light may stay on before the user is notified
    pub async fn request_notify_duration(&self, seconds: u32) -> Result<(), ClientError> {
        if seconds == 0 {
            return Err(ClientError::ValidationError(
                "notify duration must be greater than zero".to_string(),
            ));
        }
        let id = self.engine.propose(vec![Edit::NotifyDuration(seconds)])?;

        let result = self
            .remote(|credential| {
                let service = self.service.clone();
                async move { service.put_notify_duration(&credential, seconds).await }
            })
            .await;

        self.settle(&[FieldKey::NotifyDuration], id, result)
    }

    /// Attach a device to the account. Nothing is tracked optimistically.
    pub async fn pair_device(&self, device_id: &str) -> Result<(), ClientError> {
        let device_id = device_id.trim();
        if device_id.is_empty() {
            return Err(ClientError::ValidationError("device id is empty".to_string()));
        }

        self.remote(|credential| {
            let service = self.service.clone();
            let device_id = device_id.to_string();
            async move { service.pair_device(&credential, &device_id).await }
        })
        .await
    }

    /// Read the energy analytics. Not tracked by the engine.
    pub async fn fetch_energy(&self) -> Result<EnergyData, ClientError> {
        self.remote(|credential| {
            let service = self.service.clone();
            async move { service.get_energy(&credential).await }
        })
        .await
    }

    async fn remote<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let limit = self.options.request_timeout;
        match timeout(limit, self.session.authorized(op)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout(limit)),
        }
    }

    fn settle(&self, keys: &[FieldKey], id: MutationId, result: Result<(), ClientError>) -> Result<(), ClientError> {
        match result {
            Ok(()) => {
                self.engine.acknowledge(keys, id);
                debug!("Remote write {} accepted, waiting for a poll to confirm", id);
                Ok(())
            }
            Err(e) => {
                warn!("Remote write {} failed, reverting: {}", id, e);
                self.engine.reject(keys, id);
                Err(e)
            }
        }
    }
}

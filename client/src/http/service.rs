//! Light service seam

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::authn::credential::Credential;
use crate::errors::ClientError;
use crate::http::client::HttpClient;
use crate::models::light::{EnergyData, LightId, PowerStatus};
use crate::models::schedule::{RemoteSchedule, ScheduleEdit};
use crate::models::timer::TimerDuration;

/// Remote light service.
///
/// A rejected credential fails with `ClientError::Unauthorized`, any other
/// non-success answer with `ClientError::RemoteError`.
#[async_trait]
pub trait LightService: Send + Sync {
    async fn list_lights(&self, credential: &Credential) -> Result<Vec<LightId>, ClientError>;

    async fn light_status(
        &self,
        credential: &Credential,
        lights: &[LightId],
    ) -> Result<BTreeMap<LightId, PowerStatus>, ClientError>;

    async fn set_power(&self, credential: &Credential, light: &LightId, status: PowerStatus) -> Result<(), ClientError>;

    async fn get_schedule(&self, credential: &Credential) -> Result<RemoteSchedule, ClientError>;

    /// Write all edits in a single request; either all apply or none
    async fn put_schedule(&self, credential: &Credential, edits: &[ScheduleEdit]) -> Result<(), ClientError>;

    async fn get_timer(&self, credential: &Credential) -> Result<Option<TimerDuration>, ClientError>;

    async fn put_timer(&self, credential: &Credential, duration: TimerDuration) -> Result<(), ClientError>;

    async fn get_auto_timeout(&self, credential: &Credential) -> Result<Option<bool>, ClientError>;

    async fn put_auto_timeout(&self, credential: &Credential, enabled: bool) -> Result<(), ClientError>;

    async fn get_notify_duration(&self, credential: &Credential) -> Result<Option<u32>, ClientError>;

    async fn put_notify_duration(&self, credential: &Credential, seconds: u32) -> Result<(), ClientError>;

    async fn pair_device(&self, credential: &Credential, device_id: &str) -> Result<(), ClientError>;

    async fn get_energy(&self, credential: &Credential) -> Result<EnergyData, ClientError>;
}

#[async_trait]
impl LightService for HttpClient {
    async fn list_lights(&self, credential: &Credential) -> Result<Vec<LightId>, ClientError> {
        self.list_light_ids(credential).await
    }

    async fn light_status(
        &self,
        credential: &Credential,
        lights: &[LightId],
    ) -> Result<BTreeMap<LightId, PowerStatus>, ClientError> {
        self.get_light_status(credential, lights).await
    }

    async fn set_power(&self, credential: &Credential, light: &LightId, status: PowerStatus) -> Result<(), ClientError> {
        self.control_light(credential, light, status).await
    }

    async fn get_schedule(&self, credential: &Credential) -> Result<RemoteSchedule, ClientError> {
        HttpClient::get_schedule(self, credential).await
    }

    async fn put_schedule(&self, credential: &Credential, edits: &[ScheduleEdit]) -> Result<(), ClientError> {
        HttpClient::put_schedule(self, credential, edits).await
    }

    async fn get_timer(&self, credential: &Credential) -> Result<Option<TimerDuration>, ClientError> {
        HttpClient::get_timer(self, credential).await
    }

    async fn put_timer(&self, credential: &Credential, duration: TimerDuration) -> Result<(), ClientError> {
        HttpClient::put_timer(self, credential, duration).await
    }

    async fn get_auto_timeout(&self, credential: &Credential) -> Result<Option<bool>, ClientError> {
        HttpClient::get_auto_timeout(self, credential).await
    }

    async fn put_auto_timeout(&self, credential: &Credential, enabled: bool) -> Result<(), ClientError> {
        HttpClient::put_auto_timeout(self, credential, enabled).await
    }

    async fn get_notify_duration(&self, credential: &Credential) -> Result<Option<u32>, ClientError> {
        HttpClient::get_notify_duration(self, credential).await
    }

    async fn put_notify_duration(&self, credential: &Credential, seconds: u32) -> Result<(), ClientError> {
        HttpClient::put_notify_duration(self, credential, seconds).await
    }

    async fn pair_device(&self, credential: &Credential, device_id: &str) -> Result<(), ClientError> {
        HttpClient::pair_device(self, credential, device_id).await
    }

    async fn get_energy(&self, credential: &Credential) -> Result<EnergyData, ClientError> {
        self.get_energy_data(credential).await
    }
}

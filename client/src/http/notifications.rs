//! Notification settings and device pairing endpoints

use light_api::models::{NotificationSettings, PairDeviceRequest};
use tracing::info;

use crate::authn::credential::Credential;
use crate::errors::ClientError;
use crate::http::client::HttpClient;

const NOTIFICATION_SETTINGS_PATH: &str = "/apiEntrypoint/notification-settings";

impl HttpClient {
    /// Seconds a light may stay on before the user is notified
    pub async fn get_notify_duration(&self, credential: &Credential) -> Result<Option<u32>, ClientError> {
        let settings: NotificationSettings = self.get(NOTIFICATION_SETTINGS_PATH, &[], credential).await?;
        Ok(settings.notify_duration)
    }

    pub async fn put_notify_duration(&self, credential: &Credential, seconds: u32) -> Result<(), ClientError> {
        let body = NotificationSettings {
            notify_duration: Some(seconds),
        };
        let _: serde_json::Value = self.put(NOTIFICATION_SETTINGS_PATH, credential, &body).await?;
        Ok(())
    }

    /// Attach a light device to the signed-in account
    pub async fn pair_device(&self, credential: &Credential, device_id: &str) -> Result<(), ClientError> {
        let request = PairDeviceRequest {
            device_id: device_id.to_string(),
            email: credential.email().unwrap_or(credential.subject()).to_string(),
        };
        let _: serde_json::Value = self.post("/apiEntrypoint/pair-device", credential, &request).await?;
        info!("Paired device {}", device_id);
        Ok(())
    }
}

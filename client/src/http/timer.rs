//! Idle timeout endpoints

use light_api::models::{AutoTimeout, TimeoutResponse};

use crate::authn::credential::Credential;
use crate::errors::ClientError;
use crate::http::client::HttpClient;
use crate::models::timer::TimerDuration;

impl HttpClient {
    pub async fn get_timer(&self, credential: &Credential) -> Result<Option<TimerDuration>, ClientError> {
        let response: TimeoutResponse = self.get("/timer", &[], credential).await?;
        Ok(response
            .timeout
            .and_then(|t| t.total_seconds)
            .map(TimerDuration::from_total_seconds))
    }

    pub async fn put_timer(&self, credential: &Credential, duration: TimerDuration) -> Result<(), ClientError> {
        let _: serde_json::Value = self.put("/timer", credential, &duration.to_request()).await?;
        Ok(())
    }

    pub async fn get_auto_timeout(&self, credential: &Credential) -> Result<Option<bool>, ClientError> {
        let response: AutoTimeout = self.get("/timer_status", &[], credential).await?;
        Ok(response.auto_timeout_enabled)
    }

    pub async fn put_auto_timeout(&self, credential: &Credential, enabled: bool) -> Result<(), ClientError> {
        let body = AutoTimeout {
            auto_timeout_enabled: Some(enabled),
        };
        let _: serde_json::Value = self.put("/auto-timeout", credential, &body).await?;
        Ok(())
    }
}

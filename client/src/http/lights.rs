//! Light control and status endpoints

use std::collections::BTreeMap;

use light_api::models::{LightControlRequest, LightListResponse, LightStatusResponse, PowerStatus};
use tracing::debug;

use crate::authn::credential::Credential;
use crate::errors::ClientError;
use crate::http::client::HttpClient;
use crate::models::light::LightId;

impl HttpClient {
    /// Light ids owned by the signed-in user
    pub async fn list_light_ids(&self, credential: &Credential) -> Result<Vec<LightId>, ClientError> {
        let response: LightListResponse = self.get("/apiEntrypoint/light/list", &[], credential).await?;
        Ok(response
            .lights
            .into_iter()
            .filter(|id| !id.is_empty())
            .map(LightId::from)
            .collect())
    }

    /// Power status of the given lights
    pub async fn get_light_status(
        &self,
        credential: &Credential,
        lights: &[LightId],
    ) -> Result<BTreeMap<LightId, PowerStatus>, ClientError> {
        let query: Vec<(&str, &str)> = lights.iter().map(|id| ("light_ids", id.as_str())).collect();
        let response: LightStatusResponse = self.get("/light/status", &query, credential).await?;

        let statuses = response
            .lights
            .into_iter()
            .map(|entry| (LightId::from(entry.light_id), entry.status))
            .collect::<BTreeMap<_, _>>();
        debug!("Fetched status of {} lights", statuses.len());
        Ok(statuses)
    }

    /// Switch a light on or off
    pub async fn control_light(
        &self,
        credential: &Credential,
        light: &LightId,
        status: PowerStatus,
    ) -> Result<(), ClientError> {
        let request = LightControlRequest {
            email: credential.email().unwrap_or(credential.subject()).to_string(),
            status,
            light_id: light.as_str().to_string(),
        };
        let _: serde_json::Value = self.post("/light/control", credential, &request).await?;
        Ok(())
    }
}

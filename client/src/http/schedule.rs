//! Wake/sleep schedule endpoints

use light_api::models::ScheduleResponse;

use crate::authn::credential::Credential;
use crate::errors::ClientError;
use crate::http::client::HttpClient;
use crate::models::schedule::{edits_to_wire, RemoteSchedule, ScheduleEdit};

const SCHEDULE_PATH: &str = "/apiEntrypoint/light/schedule";

impl HttpClient {
    pub async fn get_schedule(&self, credential: &Credential) -> Result<RemoteSchedule, ClientError> {
        let response: ScheduleResponse = self.get(SCHEDULE_PATH, &[], credential).await?;
        Ok(response
            .schedule
            .map(RemoteSchedule::from_wire)
            .unwrap_or_default())
    }

    /// Write the edited schedule fields in one request
    pub async fn put_schedule(&self, credential: &Credential, edits: &[ScheduleEdit]) -> Result<(), ClientError> {
        let body = edits_to_wire(edits);
        let _: serde_json::Value = self.put(SCHEDULE_PATH, credential, &body).await?;
        Ok(())
    }
}

//! Energy analytics endpoint

use light_api::models::EnergyData;
use tracing::debug;

use crate::authn::credential::Credential;
use crate::errors::ClientError;
use crate::http::client::HttpClient;

impl HttpClient {
    /// Energy usage recorded for the signed-in user's lights
    pub async fn get_energy_data(&self, credential: &Credential) -> Result<EnergyData, ClientError> {
        let email = credential.email().unwrap_or(credential.subject());
        let data: EnergyData = self.get("/energy-data", &[("email", email)], credential).await?;
        debug!("Fetched energy data ({} readings)", data.readings.len());
        Ok(data)
    }
}

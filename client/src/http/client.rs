//! HTTP client implementation

use std::time::Duration;

use light_api::models::ErrorResponse;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error, warn};
use url::Url;
use uuid::Uuid;

use crate::authn::credential::Credential;
use crate::errors::ClientError;

pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// HTTP client for the light service
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
}

impl HttpClient {
    /// Create a new HTTP client. `timeout` bounds every request.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        Url::parse(base_url)
            .map_err(|e| ClientError::ConfigError(format!("Invalid base URL {}: {}", base_url, e)))?;

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        credential: &Credential,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let request = self.authorized(self.client.get(&url), credential).query(query);
        let response = request.send().await?;
        parse_response("GET", &url, response).await
    }

    /// Make a POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        credential: &Credential,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let request = self.authorized(self.client.post(&url), credential).json(body);
        let response = request.send().await?;
        parse_response("POST", &url, response).await
    }

    /// Make a PUT request
    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        credential: &Credential,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("PUT {}", url);

        let request = self.authorized(self.client.put(&url), credential).json(body);
        let response = request.send().await?;
        parse_response("PUT", &url, response).await
    }

    fn authorized(&self, request: RequestBuilder, credential: &Credential) -> RequestBuilder {
        request
            .header(header::AUTHORIZATION, format!("Bearer {}", credential.bearer()))
            .header(REQUEST_ID_HEADER, Uuid::new_v4().to_string())
    }
}

async fn parse_response<T: DeserializeOwned>(
    method: &str,
    url: &str,
    response: Response,
) -> Result<T, ClientError> {
    let status = response.status();
    let text = response.text().await?;

    if !status.is_success() {
        let detail = error_detail(status, &text);
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!("HTTP {} {} rejected credential: {} - {}", method, url, status, detail);
            return Err(ClientError::Unauthorized(detail));
        }
        error!("HTTP {} {} failed: {} - {}", method, url, status, detail);
        return Err(ClientError::RemoteError {
            status: status.as_u16(),
            detail,
        });
    }

    // writes may answer with an empty body
    let body = if text.trim().is_empty() { "null" } else { text.as_str() };
    Ok(serde_json::from_str(body)?)
}

/// Human-readable failure reason from an error payload
pub(crate) fn error_detail(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|e| e.detail)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        })
}

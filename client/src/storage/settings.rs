//! Settings file management

use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::errors::ClientError;
use crate::filesys::file::File;
use crate::http::identity::{DEFAULT_AUTH_URL, DEFAULT_TOKEN_URL};
use crate::logs::LogLevel;

/// Client settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write a daily-rolling log file under the logs directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Light service configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// Identity provider configuration
    #[serde(default)]
    pub identity: IdentitySettings,

    /// Enable polling worker
    #[serde(default = "default_true")]
    pub enable_poller: bool,

    /// Polling interval in seconds
    #[serde(default = "default_polling_interval")]
    pub polling_interval_secs: u64,

    /// Remote call timeout in seconds; the polling interval when absent
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Disagreeing polls before a pending edit is dropped
    #[serde(default = "default_staleness_threshold")]
    pub staleness_threshold: u32,

    /// How often the token refresh worker checks the credential, in seconds
    #[serde(default = "default_token_check_interval")]
    pub token_check_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_polling_interval() -> u64 {
    5
}

fn default_staleness_threshold() -> u32 {
    3
}

fn default_token_check_interval() -> u64 {
    60
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            backend: BackendSettings::default(),
            identity: IdentitySettings::default(),
            enable_poller: true,
            polling_interval_secs: default_polling_interval(),
            request_timeout_secs: None,
            staleness_threshold: default_staleness_threshold(),
            token_check_interval_secs: default_token_check_interval(),
        }
    }
}

impl Settings {
    /// Read the settings file, falling back to defaults when it does not exist
    pub async fn load(file: &File) -> Result<Self, ClientError> {
        if !file.exists().await {
            info!("No settings file at {}, using defaults", file.path().display());
            return Ok(Self::default());
        }
        let settings: Settings = file.read_json().await?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        for url in [
            &self.backend.base_url,
            &self.identity.auth_url,
            &self.identity.token_url,
        ] {
            Url::parse(url).map_err(|e| ClientError::ConfigError(format!("Invalid URL {}: {}", url, e)))?;
        }
        if self.polling_interval_secs == 0 {
            return Err(ClientError::ConfigError(
                "polling_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(ClientError::ConfigError(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Light service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the light service
    #[serde(default = "default_backend_url")]
    pub base_url: String,
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
        }
    }
}

/// Identity provider settings
#[derive(Clone, Serialize, Deserialize)]
pub struct IdentitySettings {
    /// Web API key of the identity project
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
        }
    }
}

impl std::fmt::Debug for IdentitySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitySettings")
            .field("api_key", &"[REDACTED]")
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish()
    }
}

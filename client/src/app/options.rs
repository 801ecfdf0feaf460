//! Application configuration options

use std::time::Duration;

use secrecy::SecretString;

use crate::authn::session::SessionOptions;
use crate::http::identity::IdentityOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::sync::engine::EngineOptions;
use crate::sync::mutations::MutationOptions;
use crate::workers::{poller, token_refresh};

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Light service base URL
    pub backend_base_url: String,

    /// Identity provider
    pub identity: IdentityOptions,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// Enable polling worker
    pub enable_poller: bool,

    /// Poller worker options
    pub poller: poller::Options,

    /// Timeout for remote writes
    pub mutations: MutationOptions,

    /// Reconciliation options
    pub engine: EngineOptions,

    /// Session refresh policy
    pub session: SessionOptions,

    /// Token refresh worker options
    pub token_refresh_worker: token_refresh::Options,

    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl AppOptions {
    /// Runtime options for the given settings
    pub fn from_settings(settings: &Settings, storage: StorageLayout) -> Self {
        let interval = Duration::from_secs(settings.polling_interval_secs.max(1));
        let request_timeout = settings
            .request_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(interval);

        let mut identity = IdentityOptions::new(SecretString::from(settings.identity.api_key.clone()));
        identity.auth_url = settings.identity.auth_url.clone();
        identity.token_url = settings.identity.token_url.clone();
        identity.timeout = request_timeout;

        Self {
            backend_base_url: settings.backend.base_url.clone(),
            identity,
            storage,
            enable_poller: settings.enable_poller,
            poller: poller::Options {
                interval,
                cycle_timeout: Some(request_timeout),
            },
            mutations: MutationOptions { request_timeout },
            engine: EngineOptions {
                staleness_threshold: settings.staleness_threshold,
            },
            session: SessionOptions::default(),
            token_refresh_worker: token_refresh::Options {
                check_interval: Duration::from_secs(settings.token_check_interval_secs.max(1)),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            backend_base_url: "http://localhost:8000".to_string(),
            identity: IdentityOptions::new(SecretString::from(String::new())),
            storage: StorageLayout::default(),
            enable_poller: true,
            poller: poller::Options::default(),
            mutations: MutationOptions::default(),
            engine: EngineOptions::default(),
            session: SessionOptions::default(),
            token_refresh_worker: token_refresh::Options::default(),
            max_shutdown_delay: Duration::from_secs(10),
        }
    }
}

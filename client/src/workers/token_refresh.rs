//! Token refresh worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::authn::session::SessionManager;

/// Token refresh worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Check interval
    pub check_interval: Duration,

    /// Refresh when the credential expires within this duration
    pub refresh_threshold: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            refresh_threshold: Duration::from_secs(300),
        }
    }
}

/// Run the token refresh worker
pub async fn run<S, F>(
    options: &Options,
    session: &SessionManager,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Token refresh worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Token refresh worker shutting down...");
                return;
            }
            _ = sleep_fn(options.check_interval) => {}
        }

        let Some(credential) = session.current_credential() else {
            debug!("No active session, nothing to refresh");
            continue;
        };

        if credential.expires_within(options.refresh_threshold) {
            info!(
                "Credential expires at {}, refreshing...",
                credential.expires_at()
            );

            match session.refresh().await {
                Ok(renewed) => {
                    info!("Credential refreshed, new expiration: {}", renewed.expires_at());
                }
                Err(e) => {
                    // the session signs itself out when a refresh fails
                    error!("Failed to refresh credential: {}", e);
                }
            }
        } else {
            debug!("Credential still valid until {}", credential.expires_at());
        }
    }
}

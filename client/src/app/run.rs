//! Main application run loop

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::authn::session::SessionManager;
use crate::errors::ClientError;
use crate::models::snapshot::Snapshot;
use crate::workers::{poller, token_refresh};

/// Run the HomeGlow client until `shutdown_signal` resolves
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ClientError> {
    info!("Initializing HomeGlow client...");

    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.max_shutdown_delay);

    let app_state = match init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to start client: {}", e);
            shutdown_manager.shutdown().await?;
            return Err(e);
        }
    };

    let mut snapshots = app_state.subscribe();
    tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
        }
        _ = log_snapshots(&mut snapshots) => {}
    }

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

async fn log_snapshots(snapshots: &mut watch::Receiver<Snapshot>) {
    while snapshots.changed().await.is_ok() {
        let snapshot = snapshots.borrow_and_update().clone();
        info!(
            revision = snapshot.revision,
            authenticated = snapshot.authenticated,
            lights = snapshot.lights.len(),
            pending = snapshot.has_pending(),
            "State updated"
        );
    }
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, ClientError> {
    let app_state = Arc::new(AppState::init(options).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    init_token_refresh_worker(
        app_state.session.clone(),
        options.token_refresh_worker.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    if options.enable_poller {
        init_poller_worker(
            options.poller.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    Ok(app_state)
}

fn init_token_refresh_worker(
    session: Arc<SessionManager>,
    options: token_refresh::Options,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ClientError> {
    info!("Initializing token refresh worker...");

    let token_refresh_handle = tokio::spawn(async move {
        token_refresh::run(
            &options,
            session.as_ref(),
            |wait| tokio::time::sleep(wait),
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_token_refresh_worker_handle(token_refresh_handle)
}

fn init_poller_worker(
    options: poller::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), ClientError> {
    info!("Initializing poller worker...");

    let poller = app_state.poller.clone();
    let poller_handle = tokio::spawn(async move {
        poller::run(
            &options,
            poller.as_ref(),
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_poller_worker_handle(poller_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    max_shutdown_delay: Duration,
    app_state: Option<Arc<AppState>>,
    poller_worker_handle: Option<JoinHandle<()>>,
    token_refresh_worker_handle: Option<JoinHandle<()>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, max_shutdown_delay: Duration) -> Self {
        Self {
            shutdown_tx,
            max_shutdown_delay,
            app_state: None,
            poller_worker_handle: None,
            token_refresh_worker_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), ClientError> {
        if self.app_state.is_some() {
            return Err(ClientError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_token_refresh_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), ClientError> {
        if self.token_refresh_worker_handle.is_some() {
            return Err(ClientError::ShutdownError(
                "token_refresh_handle already set".to_string(),
            ));
        }
        self.token_refresh_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_poller_worker_handle(&mut self, handle: JoinHandle<()>) -> Result<(), ClientError> {
        if self.poller_worker_handle.is_some() {
            return Err(ClientError::ShutdownError("poller_handle already set".to_string()));
        }
        self.poller_worker_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), ClientError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(self.max_shutdown_delay, self.shutdown_impl()).await {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.max_shutdown_delay
                );
                Err(ClientError::ShutdownError("shutdown timed out".to_string()))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), ClientError> {
        info!("Shutting down HomeGlow client...");

        // 1. Token refresh worker
        if let Some(handle) = self.token_refresh_worker_handle.take() {
            handle
                .await
                .map_err(|e| ClientError::ShutdownError(e.to_string()))?;
        }

        // 2. Poller worker
        if let Some(handle) = self.poller_worker_handle.take() {
            handle
                .await
                .map_err(|e| ClientError::ShutdownError(e.to_string()))?;
        }

        // 3. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}

//! Application state management

use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::watch;
use tracing::{error, info};

use crate::app::options::AppOptions;
use crate::authn::identity::IdentityProvider;
use crate::authn::session::{CredentialChange, SessionManager, SessionOptions};
use crate::errors::ClientError;
use crate::http::client::HttpClient;
use crate::http::identity::{HttpIdentityProvider, IdentityOptions};
use crate::http::service::LightService;
use crate::models::snapshot::Snapshot;
use crate::storage::kv::{FileKeyValueStore, KeyValueStore};
use crate::sync::engine::{EngineOptions, ReconciliationEngine};
use crate::sync::mutations::{MutationOptions, MutationQueue};
use crate::workers::poller::{self, Poller};

/// Main application state
pub struct AppState {
    /// Owner of the displayed state
    pub engine: Arc<ReconciliationEngine>,

    /// Credential lifecycle
    pub session: Arc<SessionManager>,

    /// Remote state poller
    pub poller: Arc<Poller>,

    /// Optimistic writes
    pub mutations: Arc<MutationQueue>,
}

impl AppState {
    /// Wire the sync core around the given collaborators
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        service: Arc<dyn LightService>,
        store: Arc<dyn KeyValueStore>,
        session_options: SessionOptions,
        engine_options: EngineOptions,
        poller_options: poller::Options,
        mutation_options: MutationOptions,
    ) -> Self {
        let engine = Arc::new(ReconciliationEngine::new(engine_options));
        let session = Arc::new(SessionManager::new(identity, store, session_options));

        let observed = engine.clone();
        let last_subject: Mutex<Option<String>> = Mutex::new(None);
        session.on_credential_change(move |change| {
            let mut last_subject = last_subject.lock().unwrap_or_else(|e| e.into_inner());
            match change {
                CredentialChange::SignedIn(credential) => {
                    // another user's state must never show through
                    if last_subject.as_deref().is_some_and(|s| s != credential.subject()) {
                        observed.reset();
                    }
                    *last_subject = Some(credential.subject().to_string());
                    observed.set_authenticated(true);
                }
                CredentialChange::Refreshed(_) => {}
                CredentialChange::SignedOut => {
                    *last_subject = None;
                    observed.reset();
                }
            }
        });

        let poller = Arc::new(Poller::new(
            engine.clone(),
            session.clone(),
            service.clone(),
            poller_options,
        ));
        let mutations = Arc::new(MutationQueue::new(
            engine.clone(),
            session.clone(),
            service,
            mutation_options,
        ));

        Self {
            engine,
            session,
            poller,
            mutations,
        }
    }

    /// Initialize application state against the configured services
    pub async fn init(options: &AppOptions) -> Result<Self, ClientError> {
        info!("Initializing application state...");

        options.storage.setup().await?;

        let service = Arc::new(HttpClient::new(
            &options.backend_base_url,
            options.mutations.request_timeout,
        )?);
        let identity = Arc::new(HttpIdentityProvider::new(IdentityOptions {
            api_key: SecretString::from(options.identity.api_key.expose_secret().to_owned()),
            auth_url: options.identity.auth_url.clone(),
            token_url: options.identity.token_url.clone(),
            timeout: options.identity.timeout,
        })?);
        let store = Arc::new(FileKeyValueStore::new(Arc::new(options.storage.credentials_file())));

        let state = Self::new(
            identity,
            service,
            store,
            options.session.clone(),
            options.engine.clone(),
            options.poller.clone(),
            options.mutations.clone(),
        );

        if let Err(e) = state.session.restore().await {
            error!("Failed to restore session: {}", e);
        }

        Ok(state)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Snapshot {
        self.engine.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.engine.subscribe()
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        info!("Shutting down application state...");
        self.poller.stop();
        Ok(())
    }
}

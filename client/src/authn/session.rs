//! Session manager
//!
//! Owns the current credential and its lifecycle:
//!
//! ```text
//!  SignedOut --sign_in / sign_up--> Authenticating --ok--> SignedIn
//!      ^                                  |                  |   ^
//!      |                                error                |   | ok
//!      +----------------------------------+            refresh   |
//!      |                                                     v   |
//!      +----------------- error / second rejection ------- Refreshing
//! ```
//!
//! A rejected credential triggers exactly one refresh. If the refreshed
//! credential is rejected again before any request succeeds with it, the
//! session is signed out instead of refreshing in a loop.

use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use secrecy::SecretString;
use tracing::{debug, error, info, warn};

use crate::authn::credential::{Credential, StoredCredential, UserProfile};
use crate::authn::identity::IdentityProvider;
use crate::errors::ClientError;
use crate::storage::kv::{keys, KeyValueStore};

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    Authenticating,
    SignedIn,
    Refreshing,
}

/// Delivered to credential observers on every transition
#[derive(Debug, Clone)]
pub enum CredentialChange {
    SignedIn(Credential),
    Refreshed(Credential),
    SignedOut,
}

impl CredentialChange {
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            CredentialChange::SignedIn(c) | CredentialChange::Refreshed(c) => Some(c),
            CredentialChange::SignedOut => None,
        }
    }
}

/// Observers run synchronously and must not register further observers
pub type CredentialObserver = Box<dyn Fn(&CredentialChange) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// A credential expiring within this window is refreshed before use
    pub refresh_skew: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresh_skew: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct SessionInner {
    state: SessionState,
    credential: Option<Credential>,
    // the current credential came from a rejection-triggered refresh and
    // no request has succeeded with it yet
    rejected_once: bool,
}

pub struct SessionManager {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn KeyValueStore>,
    options: SessionOptions,
    inner: RwLock<SessionInner>,
    observers: Mutex<Vec<CredentialObserver>>,
    // serializes sign-in, refresh and sign-out against each other
    transition: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn KeyValueStore>,
        options: SessionOptions,
    ) -> Self {
        Self {
            identity,
            store,
            options,
            inner: RwLock::new(SessionInner {
                state: SessionState::SignedOut,
                credential: None,
                rejected_once: false,
            }),
            observers: Mutex::new(Vec::new()),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        self.read().state
    }

    /// The credential currently in use, `None` when signed out
    pub fn current_credential(&self) -> Option<Credential> {
        self.read().credential.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        self.read().credential.is_some()
    }

    /// Register an observer for sign-in, refresh and sign-out transitions
    pub fn on_credential_change<F>(&self, observer: F)
    where
        F: Fn(&CredentialChange) + Send + Sync + 'static,
    {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Box::new(observer));
    }

    /// Exchange email and password for a credential
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<Credential, ClientError> {
        info!("Signing in as {}", email);
        self.authenticate(self.identity.sign_in(email, password)).await
    }

    /// Create an account, sign in with it and send the verification email.
    /// A failed verification email does not undo the sign-up.
    pub async fn sign_up(&self, email: &str, password: &SecretString) -> Result<Credential, ClientError> {
        info!("Creating account for {}", email);
        let credential = self.authenticate(self.identity.sign_up(email, password)).await?;

        match self.identity.send_email_verification(&credential).await {
            Ok(()) => info!("Verification email sent to {}", email),
            Err(e) => warn!("Could not send verification email after sign-up: {}", e),
        }
        Ok(credential)
    }

    /// Ask the identity provider to email a password reset link
    pub async fn send_password_reset(&self, email: &str) -> Result<(), ClientError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ClientError::ValidationError("email is required".to_string()));
        }
        self.identity.send_password_reset(email).await?;
        info!("Password reset email sent to {}", email);
        Ok(())
    }

    // shared by sign-in and sign-up: install, persist and announce the credential
    async fn authenticate<Fut>(&self, request: Fut) -> Result<Credential, ClientError>
    where
        Fut: Future<Output = Result<Credential, ClientError>>,
    {
        let _transition = self.transition.lock().await;

        let previous = {
            let mut inner = self.write();
            let previous = inner.state;
            inner.state = SessionState::Authenticating;
            previous
        };

        match request.await {
            Ok(credential) => {
                {
                    let mut inner = self.write();
                    inner.credential = Some(credential.clone());
                    inner.state = SessionState::SignedIn;
                    inner.rejected_once = false;
                }
                self.persist(&credential).await;
                info!(
                    "Signed in as {}, credential expires at {}",
                    credential.subject(),
                    credential.expires_at()
                );
                self.notify(&CredentialChange::SignedIn(credential.clone()));
                Ok(credential)
            }
            Err(e) => {
                self.write().state = previous;
                warn!("Authentication failed: {}", e);
                Err(into_auth_error(e))
            }
        }
    }

    /// Discard the credential. Signing out while signed out is a no-op.
    pub async fn sign_out(&self) {
        let _transition = self.transition.lock().await;
        self.sign_out_locked("requested").await;
    }

    /// Refresh the current credential
    pub async fn refresh(&self) -> Result<Credential, ClientError> {
        let current = self
            .current_credential()
            .ok_or_else(|| ClientError::AuthError("not signed in".to_string()))?;
        self.refresh_from(&current, false).await
    }

    /// The current credential, refreshed first if it is about to expire
    pub async fn fresh_credential(&self) -> Result<Credential, ClientError> {
        let credential = self
            .current_credential()
            .ok_or_else(|| ClientError::AuthError("not signed in".to_string()))?;

        if credential.expires_within(self.options.refresh_skew) {
            debug!("Credential expires at {}, refreshing before use", credential.expires_at());
            return self.refresh_from(&credential, false).await;
        }
        Ok(credential)
    }

    /// Report that the light service rejected `rejected`.
    ///
    /// Returns the credential to retry with, or signs out and fails when the
    /// credential was already refreshed once after a rejection.
    pub async fn report_rejected(&self, rejected: &Credential) -> Result<Credential, ClientError> {
        let give_up = {
            let inner = self.read();
            match &inner.credential {
                None => return Err(ClientError::AuthError("signed out".to_string())),
                // someone else already replaced the rejected credential
                Some(current) if !current.same_token(rejected) => return Ok(current.clone()),
                Some(_) => inner.rejected_once,
            }
        };

        if give_up {
            let _transition = self.transition.lock().await;
            // a transition may have replaced the credential while we waited
            let current = self.read().credential.clone();
            match current {
                None => return Err(ClientError::AuthError("signed out".to_string())),
                Some(current) if !current.same_token(rejected) => return Ok(current),
                Some(_) => {}
            }
            warn!("Refreshed credential was rejected again, signing out");
            self.sign_out_locked("credential rejected after refresh").await;
            return Err(ClientError::AuthError(
                "credential rejected after refresh".to_string(),
            ));
        }

        self.refresh_from(rejected, true).await
    }

    /// Report that a request succeeded with the current credential
    pub fn report_accepted(&self) {
        if self.read().rejected_once {
            self.write().rejected_once = false;
        }
    }

    /// Run `op` with a valid credential. A rejection triggers one refresh and
    /// one retry; a second rejection signs out.
    pub async fn authorized<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        F: Fn(Credential) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let credential = self.fresh_credential().await?;
        match op(credential.clone()).await {
            Err(ClientError::Unauthorized(reason)) => {
                debug!("Request rejected ({}), refreshing credential", reason);
                let renewed = self.report_rejected(&credential).await?;
                match op(renewed.clone()).await {
                    Err(ClientError::Unauthorized(reason)) => {
                        self.report_rejected(&renewed).await?;
                        Err(ClientError::Unauthorized(reason))
                    }
                    result => {
                        self.note_outcome(&result);
                        result
                    }
                }
            }
            result => {
                self.note_outcome(&result);
                result
            }
        }
    }

    /// Load a previously persisted credential, refreshing it if it expired
    pub async fn restore(&self) -> Result<Option<Credential>, ClientError> {
        let Some(raw) = self.store.get(keys::ID_TOKEN).await? else {
            debug!("No stored credential");
            return Ok(None);
        };

        let stored: StoredCredential = match serde_json::from_str(&raw) {
            Ok(stored) => stored,
            Err(e) => {
                warn!("Discarding unreadable stored credential: {}", e);
                self.clear_store().await;
                return Ok(None);
            }
        };
        let credential = Credential::from_stored(stored);

        {
            let _transition = self.transition.lock().await;
            let mut inner = self.write();
            inner.credential = Some(credential.clone());
            inner.state = SessionState::SignedIn;
            inner.rejected_once = false;
        }
        info!("Restored session for {}", credential.subject());
        self.notify(&CredentialChange::SignedIn(credential.clone()));

        if credential.expires_within(self.options.refresh_skew) {
            return self.refresh_from(&credential, false).await.map(Some);
        }
        Ok(Some(credential))
    }

    /// Fetch the current user profile from the identity provider
    pub async fn reload_user(&self) -> Result<UserProfile, ClientError> {
        let credential = self.fresh_credential().await?;
        let profile = self.identity.lookup_user(&credential).await?;

        match serde_json::to_string(&profile) {
            Ok(json) => {
                if let Err(e) = self.store.set(keys::USER_INFO, &json).await {
                    warn!("Failed to store user profile: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize user profile: {}", e),
        }
        Ok(profile)
    }

    /// Send a verification email unless the address is already verified.
    /// Returns whether a message was sent.
    pub async fn send_email_verification(&self) -> Result<bool, ClientError> {
        let profile = self.reload_user().await?;
        if profile.email_verified {
            debug!("Email already verified for {}", profile.uid);
            return Ok(false);
        }

        let credential = self.fresh_credential().await?;
        self.identity.send_email_verification(&credential).await?;
        info!("Verification email sent to {}", profile.email.as_deref().unwrap_or(&profile.uid));
        Ok(true)
    }

    async fn refresh_from(&self, stale: &Credential, after_rejection: bool) -> Result<Credential, ClientError> {
        let _transition = self.transition.lock().await;

        let current = self
            .read()
            .credential
            .clone()
            .ok_or_else(|| ClientError::AuthError("signed out".to_string()))?;

        // a concurrent caller already refreshed while we waited for the lock
        if !current.same_token(stale) {
            debug!("Credential already refreshed");
            return Ok(current);
        }

        self.write().state = SessionState::Refreshing;
        info!("Refreshing credential for {}", current.subject());

        match self.identity.refresh(&current).await {
            Ok(renewed) => {
                {
                    let mut inner = self.write();
                    inner.credential = Some(renewed.clone());
                    inner.state = SessionState::SignedIn;
                    inner.rejected_once = after_rejection;
                }
                self.persist(&renewed).await;
                info!("Credential refreshed, expires at {}", renewed.expires_at());
                self.notify(&CredentialChange::Refreshed(renewed.clone()));
                Ok(renewed)
            }
            Err(e) => {
                error!("Credential refresh failed: {}", e);
                self.sign_out_locked("refresh failed").await;
                Err(ClientError::AuthError(format!("refresh failed: {}", e)))
            }
        }
    }

    // caller holds the transition lock
    async fn sign_out_locked(&self, reason: &str) {
        let previous = {
            let mut inner = self.write();
            if inner.credential.is_none() && inner.state == SessionState::SignedOut {
                debug!("Already signed out");
                return;
            }
            inner.state = SessionState::SignedOut;
            inner.rejected_once = false;
            inner.credential.take()
        };

        if let Some(credential) = &previous {
            if let Err(e) = self.identity.sign_out(credential).await {
                warn!("Identity provider sign-out failed: {}", e);
            }
        }
        self.clear_store().await;

        info!("Signed out ({})", reason);
        self.notify(&CredentialChange::SignedOut);
    }

    fn note_outcome<T>(&self, result: &Result<T, ClientError>) {
        match result {
            Ok(_) => self.report_accepted(),
            // the service processed and answered the request
            Err(ClientError::RemoteError { .. }) | Err(ClientError::ValidationError(_)) => {
                self.report_accepted()
            }
            Err(_) => {}
        }
    }

    async fn persist(&self, credential: &Credential) {
        match serde_json::to_string(&credential.to_stored()) {
            Ok(json) => {
                if let Err(e) = self.store.set(keys::ID_TOKEN, &json).await {
                    error!("Failed to persist credential: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize credential: {}", e),
        }
    }

    async fn clear_store(&self) {
        for key in [keys::ID_TOKEN, keys::USER_INFO] {
            if let Err(e) = self.store.delete(key).await {
                warn!("Failed to delete {} from store: {}", key, e);
            }
        }
    }

    fn notify(&self, change: &CredentialChange) {
        let observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        for observer in observers.iter() {
            observer(change);
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SessionInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SessionInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

fn into_auth_error(err: ClientError) -> ClientError {
    match err {
        ClientError::AuthError(_) => err,
        ClientError::RemoteError { detail, .. } => ClientError::AuthError(detail),
        ClientError::Unauthorized(reason) => ClientError::AuthError(reason),
        other => ClientError::AuthError(other.to_string()),
    }
}

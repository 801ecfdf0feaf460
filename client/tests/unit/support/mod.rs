//! Shared fakes for the sync core tests
#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};

use homeglow::app::state::AppState;
use homeglow::authn::credential::{Credential, UserProfile};
use homeglow::authn::identity::IdentityProvider;
use homeglow::authn::session::SessionOptions;
use homeglow::errors::ClientError;
use homeglow::http::service::LightService;
use homeglow::models::light::{EnergyData, LightId, PowerStatus};
use homeglow::models::schedule::{RemoteSchedule, ScheduleEdit};
use homeglow::models::timer::TimerDuration;
use homeglow::storage::kv::MemoryKeyValueStore;
use homeglow::sync::engine::EngineOptions;
use homeglow::sync::mutations::MutationOptions;
use homeglow::workers::poller;

pub const EMAIL: &str = "user@example.com";
pub const PASSWORD: &str = "correct horse";

pub fn credential(subject: &str, token: &str, expires_in_secs: i64) -> Credential {
    Credential::new(
        subject,
        Some(EMAIL.to_string()),
        SecretString::from(token.to_string()),
        Some(SecretString::from(format!("refresh-{}", token))),
        Utc::now() + chrono::Duration::seconds(expires_in_secs),
    )
}

// ============================== IDENTITY PROVIDER ================================ //

/// Identity provider issuing `token-1`, `token-2`, ... for a single user
pub struct FakeIdentity {
    issued: AtomicU32,
    pub sign_in_calls: AtomicU32,
    pub refresh_calls: AtomicU32,
    pub fail_refresh: AtomicBool,
    pub refresh_delay: Mutex<Option<Duration>>,
    pub email_verified: AtomicBool,
    pub verification_mails: AtomicU32,
    pub token_lifetime_secs: Mutex<i64>,
    /// Registered addresses; `EMAIL` exists from the start
    pub accounts: Mutex<HashSet<String>>,
    pub password_resets: Mutex<Vec<String>>,
}

impl Default for FakeIdentity {
    fn default() -> Self {
        Self {
            issued: AtomicU32::new(0),
            sign_in_calls: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            fail_refresh: AtomicBool::new(false),
            refresh_delay: Mutex::new(None),
            email_verified: AtomicBool::new(false),
            verification_mails: AtomicU32::new(0),
            token_lifetime_secs: Mutex::new(3600),
            accounts: Mutex::new(HashSet::from([EMAIL.to_string()])),
            password_resets: Mutex::new(Vec::new()),
        }
    }
}

impl FakeIdentity {
    fn issue(&self, subject: &str) -> Credential {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let lifetime = *self.token_lifetime_secs.lock().unwrap();
        credential(subject, &format!("token-{}", n), lifetime)
    }

    pub fn refreshes(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn sign_in(&self, identifier: &str, secret: &SecretString) -> Result<Credential, ClientError> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        if identifier != EMAIL || secret.expose_secret() != PASSWORD {
            return Err(ClientError::AuthError("INVALID_LOGIN_CREDENTIALS".to_string()));
        }
        Ok(self.issue("user-1"))
    }

    async fn sign_up(&self, identifier: &str, _secret: &SecretString) -> Result<Credential, ClientError> {
        if !self.accounts.lock().unwrap().insert(identifier.to_string()) {
            return Err(ClientError::AuthError("EMAIL_EXISTS".to_string()));
        }
        Ok(self.issue("user-2"))
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ClientError> {
        if !self.accounts.lock().unwrap().contains(email) {
            return Err(ClientError::AuthError("EMAIL_NOT_FOUND".to_string()));
        }
        self.password_resets.lock().unwrap().push(email.to_string());
        Ok(())
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, ClientError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ClientError::AuthError("TOKEN_EXPIRED".to_string()));
        }
        Ok(self.issue(credential.subject()))
    }

    async fn lookup_user(&self, credential: &Credential) -> Result<UserProfile, ClientError> {
        Ok(UserProfile {
            uid: credential.subject().to_string(),
            email: credential.email().map(str::to_owned),
            email_verified: self.email_verified.load(Ordering::SeqCst),
            ..Default::default()
        })
    }

    async fn send_email_verification(&self, _credential: &Credential) -> Result<(), ClientError> {
        self.verification_mails.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ================================ LIGHT SERVICE ================================== //

/// How the fake service answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    None,
    Remote(u16),
    Unauthorized,
}

impl Failure {
    fn check(self) -> Result<(), ClientError> {
        match self {
            Failure::None => Ok(()),
            Failure::Remote(status) => Err(ClientError::RemoteError {
                status,
                detail: "service unavailable".to_string(),
            }),
            Failure::Unauthorized => Err(ClientError::Unauthorized("token expired".to_string())),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Remote {
    pub lights: BTreeMap<LightId, PowerStatus>,
    pub schedule: RemoteSchedule,
    pub timer: Option<TimerDuration>,
    pub auto_timeout: Option<bool>,
    pub notify_duration: Option<u32>,
}

/// In-memory light service
pub struct FakeLightService {
    pub remote: Mutex<Remote>,
    /// Writes change `remote`; off to simulate a service that ignores them
    pub apply_writes: AtomicBool,
    pub read_failure: Mutex<Failure>,
    pub write_failure: Mutex<Failure>,
    /// Writes whose description starts with one of these fail with a 500
    pub failing_writes: Mutex<Vec<String>>,
    /// Bearer tokens answered with 401
    pub rejected_tokens: Mutex<HashSet<String>>,
    pub read_delay: Mutex<Option<Duration>>,
    pub write_delay: Mutex<Option<Duration>>,
    pub writes: Mutex<Vec<String>>,
    pub tokens_seen: Mutex<Vec<String>>,
    pub fetches: AtomicU32,
}

impl Default for FakeLightService {
    fn default() -> Self {
        Self {
            remote: Mutex::new(Remote::default()),
            apply_writes: AtomicBool::new(true),
            read_failure: Mutex::new(Failure::None),
            write_failure: Mutex::new(Failure::None),
            failing_writes: Mutex::new(Vec::new()),
            rejected_tokens: Mutex::new(HashSet::new()),
            read_delay: Mutex::new(None),
            write_delay: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            tokens_seen: Mutex::new(Vec::new()),
            fetches: AtomicU32::new(0),
        }
    }
}

impl FakeLightService {
    pub fn with_lights(lights: &[(&str, PowerStatus)]) -> Self {
        let service = Self::default();
        {
            let mut remote = service.remote.lock().unwrap();
            for (id, status) in lights {
                remote.lights.insert(LightId::from(*id), *status);
            }
        }
        service
    }

    pub fn set_light(&self, id: &str, status: PowerStatus) {
        self.remote.lock().unwrap().lights.insert(LightId::from(id), status);
    }

    pub fn light(&self, id: &str) -> Option<PowerStatus> {
        self.remote.lock().unwrap().lights.get(&LightId::from(id)).copied()
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail_writes(&self, prefix: &str) {
        self.failing_writes.lock().unwrap().push(prefix.to_string());
    }

    pub fn reject_token(&self, token: &str) {
        self.rejected_tokens.lock().unwrap().insert(token.to_string());
    }

    fn authorize(&self, credential: &Credential) -> Result<(), ClientError> {
        self.tokens_seen
            .lock()
            .unwrap()
            .push(credential.bearer().to_string());
        if self.rejected_tokens.lock().unwrap().contains(credential.bearer()) {
            return Err(ClientError::Unauthorized("token expired".to_string()));
        }
        Ok(())
    }

    async fn read(&self, credential: &Credential) -> Result<(), ClientError> {
        let delay = *self.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.authorize(credential)?;
        let failure = *self.read_failure.lock().unwrap();
        failure.check()
    }

    async fn write(&self, credential: &Credential, what: String) -> Result<bool, ClientError> {
        let delay = *self.write_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.authorize(credential)?;
        let failure = *self.write_failure.lock().unwrap();
        failure.check()?;
        if self.failing_writes.lock().unwrap().iter().any(|p| what.starts_with(p.as_str())) {
            return Failure::Remote(500).check().map(|_| false);
        }
        self.writes.lock().unwrap().push(what);
        Ok(self.apply_writes.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl LightService for FakeLightService {
    async fn list_lights(&self, credential: &Credential) -> Result<Vec<LightId>, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.read(credential).await?;
        Ok(self.remote.lock().unwrap().lights.keys().cloned().collect())
    }

    async fn light_status(
        &self,
        credential: &Credential,
        lights: &[LightId],
    ) -> Result<BTreeMap<LightId, PowerStatus>, ClientError> {
        self.read(credential).await?;
        let remote = self.remote.lock().unwrap();
        Ok(lights
            .iter()
            .filter_map(|id| remote.lights.get(id).map(|s| (id.clone(), *s)))
            .collect())
    }

    async fn set_power(&self, credential: &Credential, light: &LightId, status: PowerStatus) -> Result<(), ClientError> {
        if self.write(credential, format!("power {} {}", light, status.as_str())).await? {
            self.remote.lock().unwrap().lights.insert(light.clone(), status);
        }
        Ok(())
    }

    async fn get_schedule(&self, credential: &Credential) -> Result<RemoteSchedule, ClientError> {
        self.read(credential).await?;
        Ok(self.remote.lock().unwrap().schedule.clone())
    }

    async fn put_schedule(&self, credential: &Credential, edits: &[ScheduleEdit]) -> Result<(), ClientError> {
        if self.write(credential, format!("schedule {}", edits.len())).await? {
            let mut remote = self.remote.lock().unwrap();
            for edit in edits {
                match edit {
                    ScheduleEdit::WakeUp(t) => remote.schedule.wake_up = Some(*t),
                    ScheduleEdit::WakeUpLight(l) => remote.schedule.wake_up_light = Some(l.clone()),
                    ScheduleEdit::Sleep(t) => remote.schedule.sleep = Some(*t),
                    ScheduleEdit::SleepLight(l) => remote.schedule.sleep_light = Some(l.clone()),
                }
            }
        }
        Ok(())
    }

    async fn get_timer(&self, credential: &Credential) -> Result<Option<TimerDuration>, ClientError> {
        self.read(credential).await?;
        Ok(self.remote.lock().unwrap().timer)
    }

    async fn put_timer(&self, credential: &Credential, duration: TimerDuration) -> Result<(), ClientError> {
        if self.write(credential, format!("timer {}", duration.total_seconds())).await? {
            self.remote.lock().unwrap().timer = Some(duration);
        }
        Ok(())
    }

    async fn get_auto_timeout(&self, credential: &Credential) -> Result<Option<bool>, ClientError> {
        self.read(credential).await?;
        Ok(self.remote.lock().unwrap().auto_timeout)
    }

    async fn put_auto_timeout(&self, credential: &Credential, enabled: bool) -> Result<(), ClientError> {
        if self.write(credential, format!("auto_timeout {}", enabled)).await? {
            self.remote.lock().unwrap().auto_timeout = Some(enabled);
        }
        Ok(())
    }

    async fn get_notify_duration(&self, credential: &Credential) -> Result<Option<u32>, ClientError> {
        self.read(credential).await?;
        Ok(self.remote.lock().unwrap().notify_duration)
    }

    async fn put_notify_duration(&self, credential: &Credential, seconds: u32) -> Result<(), ClientError> {
        if self.write(credential, format!("notify {}", seconds)).await? {
            self.remote.lock().unwrap().notify_duration = Some(seconds);
        }
        Ok(())
    }

    async fn pair_device(&self, credential: &Credential, device_id: &str) -> Result<(), ClientError> {
        self.write(credential, format!("pair {}", device_id)).await?;
        Ok(())
    }

    async fn get_energy(&self, credential: &Credential) -> Result<EnergyData, ClientError> {
        self.read(credential).await?;
        let mut data = EnergyData {
            email: credential.email().map(str::to_owned),
            ..Default::default()
        };
        data.readings.insert("total_kwh".to_string(), serde_json::json!(4.2));
        Ok(data)
    }
}

// =================================== HARNESS ===================================== //

pub struct Harness {
    pub identity: Arc<FakeIdentity>,
    pub service: Arc<FakeLightService>,
    pub store: Arc<MemoryKeyValueStore>,
    pub app: AppState,
}

impl Harness {
    pub fn new(service: FakeLightService) -> Self {
        Self::with_options(service, poller::Options::default(), MutationOptions::default())
    }

    pub fn with_options(
        service: FakeLightService,
        poller_options: poller::Options,
        mutation_options: MutationOptions,
    ) -> Self {
        let identity = Arc::new(FakeIdentity::default());
        let service = Arc::new(service);
        let store = Arc::new(MemoryKeyValueStore::new());
        let app = AppState::new(
            identity.clone(),
            service.clone(),
            store.clone(),
            SessionOptions::default(),
            EngineOptions::default(),
            poller_options,
            mutation_options,
        );
        Self {
            identity,
            service,
            store,
            app,
        }
    }

    pub async fn sign_in(&self) -> Credential {
        self.app
            .session
            .sign_in(EMAIL, &SecretString::from(PASSWORD.to_string()))
            .await
            .unwrap()
    }

    /// Sign in and run one successful poll
    pub async fn signed_in_and_polled(&self) {
        self.sign_in().await;
        assert!(self.app.poller.poll_now().await);
    }

    pub fn displayed(&self, id: &str) -> Option<PowerStatus> {
        self.app
            .snapshot()
            .light(&LightId::from(id))
            .and_then(|view| view.value)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.app
            .snapshot()
            .light(&LightId::from(id))
            .is_some_and(|view| view.is_pending())
    }
}

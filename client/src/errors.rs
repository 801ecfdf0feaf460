//! Error types for the HomeGlow client

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Classification of a failed poll cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollErrorKind {
    /// Transport failure (connection refused, DNS, reset...)
    Network,
    /// The credential was missing or rejected
    Auth,
    /// The cycle exceeded its time budget
    Timeout,
    /// The service answered with an error payload
    Service,
}

impl fmt::Display for PollErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PollErrorKind::Network => "network",
            PollErrorKind::Auth => "auth",
            PollErrorKind::Timeout => "timeout",
            PollErrorKind::Service => "service",
        };
        f.write_str(s)
    }
}

/// A failed poll cycle, reported to poll observers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} failure: {message}")]
pub struct PollError {
    pub kind: PollErrorKind,
    pub message: String,
}

impl PollError {
    pub fn new(kind: PollErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind == PollErrorKind::Auth
    }
}

/// Main error type for the HomeGlow client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Poll error: {0}")]
    PollError(#[from] PollError),

    #[error("Conflict: {0}")]
    ConflictError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Remote error ({status}): {detail}")]
    RemoteError { status: u16, detail: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClientError {
    /// Classify this error as a poll failure
    pub fn to_poll_error(&self) -> PollError {
        let kind = match self {
            ClientError::PollError(e) => return e.clone(),
            ClientError::AuthError(_) | ClientError::Unauthorized(_) => PollErrorKind::Auth,
            ClientError::Timeout(_) => PollErrorKind::Timeout,
            ClientError::HttpError(e) if e.is_timeout() => PollErrorKind::Timeout,
            ClientError::HttpError(_) | ClientError::IoError(_) => PollErrorKind::Network,
            _ => PollErrorKind::Service,
        };
        PollError::new(kind, self.to_string())
    }
}

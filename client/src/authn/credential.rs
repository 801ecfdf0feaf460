//! Identity credential

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::errors::ClientError;

/// ID token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Subject (user ID)
    pub sub: String,

    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub email_verified: Option<bool>,

    /// Expiration timestamp
    pub exp: i64,

    /// Issued at timestamp
    #[serde(default)]
    pub iat: Option<i64>,
}

/// Bearer credential issued by the identity provider
#[derive(Debug)]
pub struct Credential {
    subject: String,
    email: Option<String>,
    token: SecretString,
    refresh_token: Option<SecretString>,
    expires_at: DateTime<Utc>,
}

impl Clone for Credential {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            email: self.email.clone(),
            token: SecretString::from(self.token.expose_secret().to_owned()),
            refresh_token: self
                .refresh_token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_owned())),
            expires_at: self.expires_at,
        }
    }
}

impl Credential {
    pub fn new(
        subject: impl Into<String>,
        email: Option<String>,
        token: SecretString,
        refresh_token: Option<SecretString>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject: subject.into(),
            email,
            token,
            refresh_token,
            expires_at,
        }
    }

    /// Build a credential from a raw ID token (JWT).
    /// Note: This does NOT validate the signature, only decodes the claims;
    /// the light service validates the token on every request.
    pub fn from_id_token(raw: String, refresh_token: Option<String>) -> Result<Self, ClientError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.algorithms = vec![Algorithm::RS256, Algorithm::HS256];

        let token_data = decode::<IdTokenClaims>(&raw, &DecodingKey::from_secret(b""), &validation)
            .map_err(|e| ClientError::AuthError(format!("Failed to decode ID token: {}", e)))?;
        let claims = token_data.claims;

        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| ClientError::AuthError(format!("Invalid token expiry: {}", claims.exp)))?;

        Ok(Self {
            subject: claims.sub,
            email: claims.email,
            token: SecretString::from(raw),
            refresh_token: refresh_token.map(SecretString::from),
            expires_at,
        })
    }

    /// Get the subject (user ID)
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Raw bearer token for the `Authorization` header
    pub fn bearer(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_ref().map(|t| t.expose_secret())
    }

    /// Whether both credentials carry the same bearer token
    pub fn same_token(&self, other: &Credential) -> bool {
        self.bearer() == other.bearer()
    }

    /// Check if the credential is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Check if the credential expires within the given duration
    pub fn expires_within(&self, window: std::time::Duration) -> bool {
        let Ok(window) = Duration::from_std(window) else {
            return true;
        };
        match Utc::now().checked_add_signed(window) {
            Some(deadline) => self.expires_at <= deadline,
            None => true,
        }
    }

    /// Get expiration time
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn to_stored(&self) -> StoredCredential {
        StoredCredential {
            subject: self.subject.clone(),
            email: self.email.clone(),
            token: self.token.expose_secret().to_owned(),
            refresh_token: self.refresh_token().map(str::to_owned),
            expires_at: self.expires_at,
        }
    }

    pub fn from_stored(stored: StoredCredential) -> Self {
        Self {
            subject: stored.subject,
            email: stored.email,
            token: SecretString::from(stored.token),
            refresh_token: stored.refresh_token.map(SecretString::from),
            expires_at: stored.expires_at,
        }
    }
}

/// Serialized form kept in the key-value store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub subject: String,
    #[serde(default)]
    pub email: Option<String>,
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// Minimal user profile
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

//! Identity provider seam

use async_trait::async_trait;
use secrecy::SecretString;

use crate::authn::credential::{Credential, UserProfile};
use crate::errors::ClientError;

/// Issues and refreshes bearer credentials
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange an identifier (email) and secret for a credential.
    /// Invalid credentials fail with `ClientError::AuthError`.
    async fn sign_in(&self, identifier: &str, secret: &SecretString) -> Result<Credential, ClientError>;

    /// Register a new email/password account and return its first credential.
    /// An address already in use fails with `ClientError::AuthError`.
    async fn sign_up(&self, identifier: &str, secret: &SecretString) -> Result<Credential, ClientError>;

    /// Email a password reset link. Needs no credential.
    async fn send_password_reset(&self, email: &str) -> Result<(), ClientError>;

    /// Obtain a new credential for the same subject
    async fn refresh(&self, credential: &Credential) -> Result<Credential, ClientError>;

    /// Revoke the credential on the provider side, if the provider supports it
    async fn sign_out(&self, _credential: &Credential) -> Result<(), ClientError> {
        Ok(())
    }

    /// Current profile of the signed-in user, including email verification status
    async fn lookup_user(&self, credential: &Credential) -> Result<UserProfile, ClientError>;

    /// Send an email verification message to the signed-in user
    async fn send_email_verification(&self, credential: &Credential) -> Result<(), ClientError>;
}

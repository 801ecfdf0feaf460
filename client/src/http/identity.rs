//! Identity Toolkit REST adapter

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::authn::credential::{Credential, UserProfile};
use crate::authn::identity::IdentityProvider;
use crate::errors::ClientError;

pub const DEFAULT_AUTH_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

#[derive(Debug)]
pub struct IdentityOptions {
    pub api_key: SecretString,
    pub auth_url: String,
    pub token_url: String,
    pub timeout: Duration,
}

impl IdentityOptions {
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            auth_url: DEFAULT_AUTH_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdTokenRequest<'a> {
    id_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'a str,
    id_token: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResetRequest<'a> {
    request_type: &'a str,
    email: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    message: String,
}

/// Email/password identity provider over the Identity Toolkit REST API
pub struct HttpIdentityProvider {
    client: Client,
    options: IdentityOptions,
}

impl HttpIdentityProvider {
    pub fn new(options: IdentityOptions) -> Result<Self, ClientError> {
        for url in [&options.auth_url, &options.token_url] {
            Url::parse(url)
                .map_err(|e| ClientError::ConfigError(format!("Invalid identity URL {}: {}", url, e)))?;
        }
        let client = Client::builder().timeout(options.timeout).build()?;
        Ok(Self { client, options })
    }

    async fn call<T: DeserializeOwned, B: Serialize + Sync>(
        &self,
        base: &str,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{}", base.trim_end_matches('/'), path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.options.api_key.expose_secret())])
            .json(body)
            .send()
            .await?;
        parse_provider_response(response).await
    }
}

async fn parse_provider_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let text = response.text().await?;

    if status.is_success() {
        return Ok(serde_json::from_str(&text)?);
    }

    let message = serde_json::from_str::<ProviderError>(&text)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| text.trim().to_string());
    warn!("Identity provider answered {}: {}", status, message);

    if status.is_client_error() {
        Err(ClientError::AuthError(message))
    } else {
        Err(ClientError::RemoteError {
            status: status.as_u16(),
            detail: message,
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn sign_in(&self, identifier: &str, secret: &SecretString) -> Result<Credential, ClientError> {
        let request = SignInRequest {
            email: identifier,
            password: secret.expose_secret(),
            return_secure_token: true,
        };
        let response: SignInResponse = self
            .call(&self.options.auth_url, "/accounts:signInWithPassword", &request)
            .await?;
        Credential::from_id_token(response.id_token, response.refresh_token)
    }

    async fn sign_up(&self, identifier: &str, secret: &SecretString) -> Result<Credential, ClientError> {
        let request = SignInRequest {
            email: identifier,
            password: secret.expose_secret(),
            return_secure_token: true,
        };
        let response: SignInResponse = self
            .call(&self.options.auth_url, "/accounts:signUp", &request)
            .await?;
        Credential::from_id_token(response.id_token, response.refresh_token)
    }

    async fn send_password_reset(&self, email: &str) -> Result<(), ClientError> {
        let request = PasswordResetRequest {
            request_type: "PASSWORD_RESET",
            email,
        };
        let _: serde_json::Value = self
            .call(&self.options.auth_url, "/accounts:sendOobCode", &request)
            .await?;
        Ok(())
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, ClientError> {
        let refresh_token = credential
            .refresh_token()
            .ok_or_else(|| ClientError::AuthError("credential has no refresh token".to_string()))?;
        let request = RefreshRequest {
            grant_type: "refresh_token",
            refresh_token,
        };
        let response: RefreshResponse = self.call(&self.options.token_url, "/token", &request).await?;

        // the provider may omit the refresh token when it is unchanged
        let refresh_token = response
            .refresh_token
            .or_else(|| credential.refresh_token().map(str::to_owned));
        Credential::from_id_token(response.id_token, refresh_token)
    }

    async fn lookup_user(&self, credential: &Credential) -> Result<UserProfile, ClientError> {
        let request = IdTokenRequest {
            id_token: credential.bearer(),
        };
        let response: LookupResponse = self
            .call(&self.options.auth_url, "/accounts:lookup", &request)
            .await?;

        let user = response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::AuthError("user not found".to_string()))?;
        Ok(UserProfile {
            uid: user.local_id,
            email: user.email,
            display_name: user.display_name,
            phone_number: user.phone_number,
            email_verified: user.email_verified,
        })
    }

    async fn send_email_verification(&self, credential: &Credential) -> Result<(), ClientError> {
        let request = OobCodeRequest {
            request_type: "VERIFY_EMAIL",
            id_token: credential.bearer(),
        };
        let _: serde_json::Value = self
            .call(&self.options.auth_url, "/accounts:sendOobCode", &request)
            .await?;
        Ok(())
    }
}

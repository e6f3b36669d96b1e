//! HTTP client for the hosted identity platform (GoTrue-style `/auth/v1` API).

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{AuthError, AuthSession, Identity, IdentityProvider};
use crate::config::AuthConfig;

#[derive(Clone)]
pub struct PlatformIdentity {
    client: Client,
    base_url: String,
    anon_key: SecretString,
}

impl std::fmt::Debug for PlatformIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformIdentity")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
    user: UserResponse,
}

fn default_expires_in() -> u64 { 3600 }

#[derive(Deserialize)]
struct UserResponse {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    user_metadata: UserMetadata,
}

#[derive(Deserialize, Default)]
struct UserMetadata {
    full_name: Option<String>,
    name: Option<String>,
}

impl From<UserResponse> for Identity {
    fn from(user: UserResponse) -> Self {
        let UserMetadata { full_name, name } = user.user_metadata;
        Self { id: user.id, email: user.email.unwrap_or_default(), full_name: full_name.or(name) }
    }
}

impl PlatformIdentity {
    #[must_use]
    pub fn new(client: Client, config: &AuthConfig) -> Self {
        Self { client, base_url: config.base_url.clone(), anon_key: config.anon_key.clone() }
    }
}

#[async_trait]
impl IdentityProvider for PlatformIdentity {
    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<AuthSession, AuthError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token?grant_type=pkce", self.base_url))
            .header("apikey", self.anon_key.expose_secret())
            .json(&json!({ "auth_code": code, "code_verifier": code_verifier }))
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Code exchange rejected");
            return Err(AuthError::ExchangeRejected(body));
        }
        if !status.is_success() {
            return Err(AuthError::Response(format!("status {status}")));
        }

        let token: TokenResponse = response.json().await.map_err(|e| AuthError::Response(e.to_string()))?;
        debug!(user_id = %token.user.id, "Code exchanged");
        Ok(AuthSession { access_token: token.access_token, expires_in: token.expires_in, identity: token.user.into() })
    }

    #[instrument(skip_all)]
    async fn user_for_token(&self, access_token: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(AuthError::InvalidToken),
            status if !status.is_success() => return Err(AuthError::Response(format!("status {status}"))),
            _ => {}
        }

        let user: UserResponse = response.json().await.map_err(|e| AuthError::Response(e.to_string()))?;
        Ok(user.into())
    }
}

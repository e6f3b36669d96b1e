//! Authentication against the hosted identity platform.
//!
//! Sign-in happens on the platform; the storefront only receives a PKCE
//! code on `/auth/callback`, swaps it for an access token and keeps that
//! token in an HttpOnly cookie. API requests authenticate with either the
//! cookie or an `Authorization: Bearer` header. Token lookups are cached
//! for a short time so most requests never reach the platform.

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{ProfileRepository, RepositoryError};
use crate::domain::aggregates::Role;
use crate::error::AppError;
use crate::state::AppState;

pub mod platform;

pub use platform::PlatformIdentity;

/// Cookie holding the access token.
pub const SESSION_COOKIE: &str = "atelier_session";

/// Where the callback sends users when `next` is missing or unsafe.
pub const DEFAULT_REDIRECT: &str = "/account";

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token on the request.
    #[error("missing credentials")]
    MissingCredentials,

    /// Token rejected by the identity platform.
    #[error("invalid or expired token")]
    InvalidToken,

    /// The authorization code could not be exchanged.
    #[error("code exchange rejected: {0}")]
    ExchangeRejected(String),

    /// HTTP request failed.
    #[error("identity request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("identity response error: {0}")]
    Response(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl AuthError {
    /// Whether the caller (not the platform or storefront) is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingCredentials | Self::InvalidToken | Self::ExchangeRejected(_))
    }
}

/// A user as the identity platform knows them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub full_name: Option<String>,
}

/// Result of a successful code exchange.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    /// Seconds until the token expires.
    pub expires_in: u64,
    pub identity: Identity,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Swaps a PKCE authorization code for a session.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<AuthSession, AuthError>;

    /// Resolves an access token to its user.
    async fn user_for_token(&self, access_token: &str) -> Result<Identity, AuthError>;
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }
}

/// Extractor for routes that need `role = admin`.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

/// Finds the access token in the `Authorization` header or the session cookie.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value for a fresh session.
pub fn session_cookie(token: &str, max_age: u64) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age={max_age}")
}

/// Only same-site relative paths are followed after sign-in.
pub fn sanitize_next(next: Option<&str>) -> String {
    match next.map(str::trim) {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path.starts_with("/\\")
                && !path.chars().any(|c| c.is_control() || c == '\\') =>
        {
            path.to_string()
        }
        _ => DEFAULT_REDIRECT.to_string(),
    }
}

/// Resolves a token to the current user, consulting the cache first.
/// First-time users get a `customer` profile.
#[tracing::instrument(skip_all)]
pub async fn authenticate(state: &AppState, token: &str) -> Result<CurrentUser, AuthError> {
    if let Some(user) = state.user_cache().get(token).await {
        return Ok(user);
    }

    let identity = state.identity().user_for_token(token).await?;
    let profiles = ProfileRepository::new(state.pool());
    let profile = match profiles.get(identity.id).await? {
        Some(profile) => profile,
        None => profiles.upsert_from_identity(identity.id, &identity.email, identity.full_name.as_deref()).await?,
    };

    let user = CurrentUser { id: profile.id, email: profile.email, role: profile.role };
    state.user_cache().insert(token.to_string(), user.clone()).await;
    Ok(user)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = token_from_headers(&parts.headers).ok_or(AuthError::MissingCredentials)?;
        Ok(authenticate(&state, &token).await?)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::Forbidden("admin access required".to_string()));
        }
        Ok(Self(user))
    }
}

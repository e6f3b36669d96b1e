//! Sign-in callback and logout.

use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::auth::{sanitize_next, session_cookie, token_from_headers, CurrentUser, SESSION_COOKIE};
use crate::db::ProfileRepository;
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Where failed sign-ins land.
const LOGIN_ERROR_REDIRECT: &str = "/login?error=auth";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub next: Option<String>,
}

fn with_cookie(redirect: Redirect, cookie: &str) -> Result<Response> {
    let value = HeaderValue::from_str(cookie).map_err(|e| AppError::Internal(e.to_string()))?;
    let mut response = redirect.into_response();
    response.headers_mut().insert(SET_COOKIE, value);
    Ok(response)
}

/// Swaps the PKCE code for a session, stores the access token in a cookie and
/// redirects to `next`.
#[instrument(skip(state, params))]
pub async fn callback(State(state): State<AppState>, Query(params): Query<CallbackParams>) -> Result<Response> {
    let (Some(code), Some(verifier)) = (params.code.as_deref(), params.code_verifier.as_deref()) else {
        warn!("Auth callback without code");
        return Ok(Redirect::to(LOGIN_ERROR_REDIRECT).into_response());
    };

    let session = match state.identity().exchange_code(code, verifier).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, "Code exchange failed");
            return Ok(Redirect::to(LOGIN_ERROR_REDIRECT).into_response());
        }
    };

    let identity = &session.identity;
    let profile = ProfileRepository::new(state.pool())
        .upsert_from_identity(identity.id, &identity.email, identity.full_name.as_deref())
        .await?;
    let user = CurrentUser { id: profile.id, email: profile.email, role: profile.role };
    state.user_cache().insert(session.access_token.clone(), user).await;
    info!(user_id = %profile.id, "Signed in");

    let next = sanitize_next(params.next.as_deref());
    with_cookie(Redirect::to(&next), &session_cookie(&session.access_token, session.expires_in))
}

/// Forgets the cached session and expires the cookie.
#[instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(token) = token_from_headers(&headers) {
        state.user_cache().invalidate(&token).await;
    }
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Secure; SameSite=Lax; Max-Age=0");
    let value = HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(e.to_string()))?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, value)]).into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::LOCATION;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::http::tests::app;

    async fn location(uri: &str) -> (StatusCode, String) {
        let response = app().oneshot(Request::get(uri).body(Body::empty()).unwrap()).await.unwrap();
        let location = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
        (response.status(), location)
    }

    #[tokio::test]
    async fn test_failed_exchange_redirects_to_login() {
        let (status, to) = location("/auth/callback?code=bad&code_verifier=v&next=/account/orders").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(to, "/login?error=auth");
    }

    #[tokio::test]
    async fn test_missing_code_redirects_to_login() {
        let (status, to) = location("/auth/callback").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(to, "/login?error=auth");
    }

    #[tokio::test]
    async fn test_logout_expires_cookie() {
        let response = app().oneshot(Request::post("/auth/logout").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
        assert!(cookie.starts_with("atelier_session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }
}

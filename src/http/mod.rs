//! HTTP route handlers.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                                  - Health check
//! GET  /auth/callback                           - PKCE code exchange, sets session cookie
//! POST /auth/logout                             - Clears the session cookie
//!
//! # Catalog (public)
//! GET  /api/v1/products                         - Filtered, paginated listing
//! GET  /api/v1/products/:id                     - Product by id
//! GET  /api/v1/products/slug/:slug              - Product by slug
//! GET  /api/v1/categories                       - Distinct categories
//!
//! # Cart & wishlist (auth)
//! GET|POST|DELETE /api/v1/cart                  - Show, add line, clear
//! PATCH|DELETE    /api/v1/cart/items/:id        - Set quantity (0 removes), remove
//! GET|POST        /api/v1/wishlist              - Show, add
//! DELETE          /api/v1/wishlist/:product_id  - Remove
//! POST /api/v1/wishlist/:product_id/move-to-cart
//! POST /api/v1/checkout                         - Place order (COD or hosted payment)
//!
//! # Account (auth)
//! GET|PATCH /api/v1/account                     - Profile
//! GET  /api/v1/orders                           - Own orders
//! GET  /api/v1/orders/:id                       - Detail with items, tracking, eligibility
//! POST /api/v1/orders/:id/cancel|returns|exchanges
//!
//! # Submissions & designs (auth)
//! GET|POST /api/v1/submissions, GET /api/v1/submissions/:id
//! POST /api/v1/submissions/:id/design|submit
//! GET|POST /api/v1/designs, GET|PUT|DELETE /api/v1/designs/:id
//! GET  /api/v1/designs/templates, POST /api/v1/designs/templates/:id/clone
//! POST /api/v1/uploads                          - Image upload
//!
//! # Payment gateway
//! POST /api/v1/webhooks/payments                - Signed webhook
//!
//! # Admin (role = admin)
//! /api/v1/admin/products, /submissions, /orders, /returns, /exchanges
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod submissions;
pub mod uploads;
pub mod webhooks;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(catalog::list))
        .route("/products/:id", get(catalog::show))
        .route("/products/slug/:slug", get(catalog::show_by_slug))
        .route("/categories", get(catalog::categories))
}

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(cart::show).post(cart::add).delete(cart::clear))
        .route("/cart/items/:id", patch(cart::set_quantity).delete(cart::remove))
        .route("/wishlist", get(cart::wishlist).post(cart::add_to_wishlist))
        .route("/wishlist/:product_id", axum::routing::delete(cart::remove_from_wishlist))
        .route("/wishlist/:product_id/move-to-cart", post(cart::move_to_cart))
        .route("/checkout", post(checkout::checkout))
}

pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/account", get(account::profile).patch(account::update_profile))
        .route("/orders", get(account::orders))
        .route("/orders/:id", get(account::order_detail))
        .route("/orders/:id/cancel", post(account::cancel_order))
        .route("/orders/:id/returns", post(account::request_return))
        .route("/orders/:id/exchanges", post(account::request_exchange))
}

pub fn submission_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/submissions", get(submissions::list).post(submissions::create))
        .route("/submissions/:id", get(submissions::show))
        .route("/submissions/:id/design", post(submissions::apply_design))
        .route("/submissions/:id/submit", post(submissions::submit))
        .route("/designs", get(submissions::designs).post(submissions::create_design))
        .route("/designs/templates", get(submissions::templates))
        .route("/designs/templates/:id/clone", post(submissions::clone_template))
        .route(
            "/designs/:id",
            get(submissions::design).put(submissions::update_design).delete(submissions::delete_design),
        )
        .route(
            "/uploads",
            // Room for the multipart framing around the file itself.
            post(uploads::upload).layer(DefaultBodyLimit::max(max_upload_bytes + 64 * 1024)),
        )
}

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(admin::list_products).post(admin::create_product))
        .route("/products/:id", axum::routing::put(admin::update_product).delete(admin::deactivate_product))
        .route("/products/:id/activate", post(admin::activate_product))
        .route("/products/:id/stock", post(admin::adjust_stock))
        .route("/submissions", get(admin::list_submissions))
        .route("/submissions/:id/approve", post(admin::approve_submission))
        .route("/submissions/:id/reject", post(admin::reject_submission))
        .route("/orders", get(admin::list_orders))
        .route("/orders/:id", get(admin::order_detail))
        .route("/orders/:id/:action", post(admin::order_action))
        .route("/returns", get(admin::list_returns))
        .route("/returns/:id/resolve", post(admin::resolve_return))
        .route("/exchanges", get(admin::list_exchanges))
        .route("/exchanges/:id/resolve", post(admin::resolve_exchange))
}

/// All routes for the storefront API.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    let api = Router::new()
        .merge(catalog_routes())
        .merge(cart_routes())
        .merge(account_routes())
        .merge(submission_routes(max_upload_bytes))
        .route("/webhooks/payments", post(webhooks::payments))
        .nest("/admin", admin_routes());

    Router::new()
        .route("/health", get(health))
        .route("/auth/callback", get(auth::callback))
        .route("/auth/logout", post(auth::logout))
        .nest("/api/v1", api)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "atelier-storefront" }))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::auth::{AuthError, AuthSession, Identity, IdentityProvider};
    use crate::config::StorefrontConfig;
    use crate::messaging::EventPublisher;
    use crate::payments::{CheckoutSession, CheckoutSessionRequest, PaymentError, PaymentGateway};
    use crate::state::{AppState, Services};
    use crate::storage::LocalStore;

    pub(crate) struct StubIdentity;

    #[async_trait]
    impl IdentityProvider for StubIdentity {
        async fn exchange_code(&self, code: &str, _code_verifier: &str) -> Result<AuthSession, AuthError> {
            if code != "good-code" {
                return Err(AuthError::ExchangeRejected("invalid grant".into()));
            }
            Ok(AuthSession {
                access_token: "token-1".into(),
                expires_in: 3600,
                identity: Identity { id: uuid::Uuid::nil(), email: "asha@example.com".into(), full_name: None },
            })
        }

        async fn user_for_token(&self, _access_token: &str) -> Result<Identity, AuthError> {
            Err(AuthError::InvalidToken)
        }
    }

    pub(crate) struct StubGateway;

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_checkout_session(&self, _request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError> {
            Err(PaymentError::Request("offline".into()))
        }
    }

    /// State whose pool never connects; fine for routes that fail before
    /// touching the database.
    pub(crate) fn test_state() -> AppState {
        let vars = [
            ("DATABASE_URL", "postgres://shop:pw@localhost:1/shop"),
            ("PUBLIC_BASE_URL", "https://shop.example"),
            ("AUTH_BASE_URL", "https://auth.example"),
            ("AUTH_ANON_KEY", "anon"),
            ("PAYMENT_SECRET_KEY", "sk_test"),
            ("PAYMENT_WEBHOOK_SECRET", "whsec_test"),
            ("STORAGE_BACKEND", "local"),
        ];
        let config = StorefrontConfig::from_lookup(|k| vars.iter().find(|(n, _)| *n == k).map(|(_, v)| (*v).to_string()))
            .unwrap();
        let pool = PgPoolOptions::new().connect_lazy("postgres://shop:pw@localhost:1/shop").unwrap();
        let services = Services {
            identity: Arc::new(StubIdentity),
            payments: Arc::new(StubGateway),
            storage: Arc::new(LocalStore::new(std::env::temp_dir())),
            events: EventPublisher::disabled(),
        };
        AppState::new(config, pool, services)
    }

    pub(crate) fn app() -> Router {
        routes(1024).with_state(test_state())
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_protected_routes_need_credentials() {
        for (method, uri) in [("GET", "/api/v1/cart"), ("POST", "/api/v1/checkout"), ("GET", "/api/v1/admin/orders")] {
            let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
            let response = app().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{method} {uri}");
        }
    }

    #[tokio::test]
    async fn test_rejected_token_is_unauthorized() {
        let request = Request::get("/api/v1/account").header("authorization", "Bearer expired").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

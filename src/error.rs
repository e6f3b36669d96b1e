//! Unified error handling for the HTTP layer.
//!
//! Every handler returns [`Result<T>`]. Layer errors convert into [`AppError`]
//! through `?` and render as `{"error": "..."}` with a matching status.
//! Server-side failures are logged and their details hidden from clients.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::auth::AuthError;
use crate::db::orders::ApplyError;
use crate::db::returns::RequestError;
use crate::db::submissions::ReviewError;
use crate::db::RepositoryError;
use crate::domain::aggregates::{CartError, DesignError, OrderError, ProductError, SubmissionError};
use crate::payments::PaymentError;
use crate::storage::StorageError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Design(#[from] DesignError),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    Product(#[from] ProductError),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ApplyError> for AppError {
    fn from(e: ApplyError) -> Self {
        match e {
            ApplyError::Repository(e) => e.into(),
            ApplyError::Order(e) => e.into(),
        }
    }
}

impl From<RequestError> for AppError {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::Apply(e) => e.into(),
            RequestError::Resolved(e) => Self::BadRequest(e.to_string()),
        }
    }
}

impl From<ReviewError> for AppError {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::Repository(e) => e.into(),
            ReviewError::Submission(e) => e.into(),
            ReviewError::Design(e) => e.into(),
        }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Database(err) => match err {
                RepositoryError::NotFound => StatusCode::NOT_FOUND,
                RepositoryError::Conflict(_) => StatusCode::CONFLICT,
                RepositoryError::Database(_) | RepositoryError::DataCorruption(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Order(OrderError::NoItems) => StatusCode::BAD_REQUEST,
            Self::Order(_) | Self::Product(ProductError::Unavailable(_) | ProductError::InsufficientStock { .. }) => {
                StatusCode::CONFLICT
            }
            Self::Submission(SubmissionError::IllegalTransition { .. }) => StatusCode::CONFLICT,
            Self::Design(DesignError::TemplateReadOnly | DesignError::Linked) => StatusCode::CONFLICT,
            Self::Cart(err) => match err {
                CartError::Empty => StatusCode::BAD_REQUEST,
                CartError::ItemNotFound => StatusCode::NOT_FOUND,
                CartError::Product(ProductError::Unavailable(_) | ProductError::InsufficientStock { .. }) => {
                    StatusCode::CONFLICT
                }
                CartError::Quantity(_) | CartError::Product(_) => StatusCode::UNPROCESSABLE_ENTITY,
            },
            Self::Submission(_) | Self::Design(_) | Self::Product(_) | Self::Validation(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::Payment(PaymentError::InvalidSignature(_) | PaymentError::InvalidPayload(_)) => {
                StatusCode::BAD_REQUEST
            }
            Self::Payment(_) => StatusCode::BAD_GATEWAY,
            Self::Auth(err) if err.is_client_error() => StatusCode::UNAUTHORIZED,
            Self::Auth(AuthError::Repository(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Auth(_) => StatusCode::BAD_GATEWAY,
            Self::Storage(err) => match err {
                StorageError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                StorageError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                StorageError::MissingFile | StorageError::Multipart(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Don't expose internal error details to clients
        let message = if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request error");
            match status {
                StatusCode::BAD_GATEWAY => "External service error".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            match &self {
                Self::Database(RepositoryError::NotFound) => "Not found".to_string(),
                Self::Database(RepositoryError::Conflict(msg)) => msg.clone(),
                Self::Auth(_) => "Authentication failed".to_string(),
                other => other.to_string(),
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{OrderStatus, PaymentStatus, ShippingStatus};

    fn get_status(err: AppError) -> StatusCode { err.into_response().status() }

    async fn body(err: AppError) -> serde_json::Value {
        let bytes = axum::body::to_bytes(err.into_response().into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_app_error_display() {
        let err = AppError::NotFound("order".to_string());
        assert_eq!(err.to_string(), "Not found: order");
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(get_status(AppError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(get_status(AppError::Forbidden("x".into())), StatusCode::FORBIDDEN);
        assert_eq!(get_status(RepositoryError::NotFound.into()), StatusCode::NOT_FOUND);
        assert_eq!(get_status(RepositoryError::Conflict("slug".into()).into()), StatusCode::CONFLICT);
        assert_eq!(get_status(CartError::Empty.into()), StatusCode::BAD_REQUEST);
        assert_eq!(get_status(DesignError::TooManyElements.into()), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(get_status(DesignError::Linked.into()), StatusCode::CONFLICT);
        assert_eq!(get_status(StorageError::TooLarge { limit: 10 }.into()), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            get_status(StorageError::UnsupportedType("text/plain".into()).into()),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(get_status(AppError::Internal("boom".into())), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(get_status(PaymentError::InvalidSignature("stale".into()).into()), StatusCode::BAD_REQUEST);
        assert_eq!(
            get_status(PaymentError::Api { status: 500, message: "down".into() }.into()),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(get_status(AuthError::InvalidToken.into()), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_illegal_transition_is_conflict() {
        let err = OrderError::IllegalTransition {
            action: "cancel",
            order_status: OrderStatus::Shipped,
            payment_status: PaymentStatus::Paid,
            shipping_status: ShippingStatus::Shipped,
        };
        assert_eq!(get_status(ApplyError::Order(err).into()), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_internal_details_hidden() {
        let json = body(AppError::Internal("connection refused on 10.0.0.4".into())).await;
        assert_eq!(json["error"], "Internal server error");

        let json = body(AppError::BadRequest("missing address".into())).await;
        assert_eq!(json["error"], "Bad request: missing address");
    }
}

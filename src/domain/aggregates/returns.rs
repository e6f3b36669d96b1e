//! Return and exchange requests
//!
//! Opening a request is gated by the order's own rules (see
//! [`Order::apply`](super::order::Order::apply)); these rows only record what
//! the customer asked for and how an admin answered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::text_enum;

text_enum! {
    pub enum RequestStatus { Requested => "requested", Approved => "approved", Rejected => "rejected" }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OrderReturn {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub details: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OrderExchange {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub reason: String,
    pub desired_size: Option<String>,
    pub desired_color: Option<String>,
    #[sqlx(try_from = "String")]
    pub status: RequestStatus,
    pub admin_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct ReturnInput {
    #[validate(length(min = 3, max = 200))]
    pub reason: String,
    #[validate(length(max = 2000))]
    pub details: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_exchange_target"))]
pub struct ExchangeInput {
    #[validate(length(min = 3, max = 200))]
    pub reason: String,
    #[validate(length(min = 1, max = 20))]
    pub desired_size: Option<String>,
    #[validate(length(min = 1, max = 40))]
    pub desired_color: Option<String>,
}

fn validate_exchange_target(input: &ExchangeInput) -> Result<(), validator::ValidationError> {
    if input.desired_size.is_none() && input.desired_color.is_none() {
        return Err(validator::ValidationError::new("exchange_target"));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("request was already {0}")]
pub struct AlreadyResolved(pub RequestStatus);

/// Moves a request out of `requested`.
pub fn resolve(status: RequestStatus, approved: bool) -> Result<RequestStatus, AlreadyResolved> {
    match status {
        RequestStatus::Requested if approved => Ok(RequestStatus::Approved),
        RequestStatus::Requested => Ok(RequestStatus::Rejected),
        other => Err(AlreadyResolved(other)),
    }
}

impl OrderReturn {
    pub fn open(order_id: Uuid, user_id: Uuid, input: ReturnInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, user_id, reason: input.reason.trim().to_string(), details: input.details,
            status: RequestStatus::Requested, admin_note: None, created_at: now, updated_at: now,
        }
    }
}

impl OrderExchange {
    pub fn open(order_id: Uuid, user_id: Uuid, input: ExchangeInput, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), order_id, user_id, reason: input.reason.trim().to_string(),
            desired_size: input.desired_size, desired_color: input.desired_color,
            status: RequestStatus::Requested, admin_note: None, created_at: now, updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_once() {
        assert_eq!(resolve(RequestStatus::Requested, true), Ok(RequestStatus::Approved));
        assert_eq!(resolve(RequestStatus::Requested, false), Ok(RequestStatus::Rejected));
        assert_eq!(resolve(RequestStatus::Approved, false), Err(AlreadyResolved(RequestStatus::Approved)));
    }

    #[test]
    fn test_exchange_needs_a_target() {
        let input = ExchangeInput { reason: "Too tight".into(), desired_size: None, desired_color: None };
        assert!(input.validate().is_err());
        let input = ExchangeInput { desired_size: Some("L".into()), ..input };
        assert!(input.validate().is_ok());
    }
}

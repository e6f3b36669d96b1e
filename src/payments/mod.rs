//! Payment gateway integration.
//!
//! Card and UPI orders are paid on the gateway's hosted checkout page. The
//! storefront creates a session for an order, redirects the buyer and learns
//! the outcome from signed webhooks (see [`webhook`] and [`fulfillment`]).

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::PaymentMethod;

pub mod fulfillment;
pub mod stripe;
pub mod webhook;

pub use stripe::StripeGateway;

/// Errors that can occur when talking to the payment gateway.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("Payment request failed: {0}")]
    Request(String),

    /// Failed to parse response.
    #[error("Payment response error: {0}")]
    Response(String),

    /// The gateway rejected the request.
    #[error("Payment API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Webhook signature missing, stale or wrong.
    #[error("Invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// Webhook body could not be understood.
    #[error("Invalid webhook payload: {0}")]
    InvalidPayload(String),
}

/// One line on the hosted checkout page. Amounts are in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLine {
    pub name: String,
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub customer_email: Option<String>,
    /// Method the buyer picked at checkout; the hosted page offers only that one.
    pub payment_method: PaymentMethod,
    /// ISO currency code
    pub currency: String,
    pub lines: Vec<SessionLine>,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    /// Where the buyer is redirected to pay.
    pub url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a hosted checkout session for an order.
    async fn create_checkout_session(&self, request: &CheckoutSessionRequest) -> Result<CheckoutSession, PaymentError>;
}

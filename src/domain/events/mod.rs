//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Order(OrderEvent),
    Submission(SubmissionEvent),
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> String {
        match self {
            Self::Order(e) => format!("storefront.orders.{}", e.name()),
            Self::Submission(e) => format!("storefront.submissions.{}", e.name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: Uuid, user_id: Uuid, total: Decimal },
    Paid { order_id: Uuid, payment_intent: Option<String> },
    PaymentFailed { order_id: Uuid },
    Confirmed { order_id: Uuid },
    Shipped { order_id: Uuid, carrier: Option<String>, tracking_number: Option<String> },
    OutForDelivery { order_id: Uuid },
    Delivered { order_id: Uuid },
    Cancelled { order_id: Uuid, reason: Option<String> },
    ReturnRequested { order_id: Uuid },
    ReturnResolved { order_id: Uuid, approved: bool },
    ExchangeRequested { order_id: Uuid },
    ExchangeResolved { order_id: Uuid, approved: bool },
}

impl OrderEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Placed { .. } => "placed",
            Self::Paid { .. } => "paid",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::Confirmed { .. } => "confirmed",
            Self::Shipped { .. } => "shipped",
            Self::OutForDelivery { .. } => "out_for_delivery",
            Self::Delivered { .. } => "delivered",
            Self::Cancelled { .. } => "cancelled",
            Self::ReturnRequested { .. } => "return_requested",
            Self::ReturnResolved { .. } => "return_resolved",
            Self::ExchangeRequested { .. } => "exchange_requested",
            Self::ExchangeResolved { .. } => "exchange_resolved",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubmissionEvent {
    Submitted { submission_id: Uuid, user_id: Uuid },
    DesignApplied { submission_id: Uuid, design_id: Uuid },
    ReviewStarted { submission_id: Uuid },
    Approved { submission_id: Uuid, catalog_product_id: Uuid },
    Rejected { submission_id: Uuid, reason: String },
}

impl SubmissionEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Submitted { .. } => "submitted",
            Self::DesignApplied { .. } => "design_applied",
            Self::ReviewStarted { .. } => "review_started",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
        }
    }
}

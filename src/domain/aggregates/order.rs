//! Order Aggregate
//!
//! An order carries three independent status fields (payment, order and
//! shipping). Every change to them goes through [`Order::apply`], which owns
//! the transition table; eligibility checks for the account area are derived
//! from the same rules.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::types::Json;
use uuid::Uuid;

use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::text_enum;
use crate::domain::value_objects::{Address, Money, Quantity};

/// Returns and exchanges may be requested for this many days after the order was placed.
pub const RETURN_WINDOW_DAYS: i64 = 7;

text_enum! {
    pub enum PaymentMethod { Card => "card", Upi => "upi", CashOnDelivery => "cod" }
}

text_enum! {
    pub enum PaymentStatus { Pending => "pending", Paid => "paid", Failed => "failed", Refunded => "refunded" }
}

text_enum! {
    pub enum OrderStatus {
        Pending => "pending",
        Confirmed => "confirmed",
        Shipped => "shipped",
        Delivered => "delivered",
        Cancelled => "cancelled",
        ReturnRequested => "return_requested",
        Returned => "returned",
        ExchangeRequested => "exchange_requested",
        Exchanged => "exchanged",
    }
}

text_enum! {
    pub enum ShippingStatus {
        NotShipped => "not_shipped",
        Shipped => "shipped",
        OutForDelivery => "out_for_delivery",
        Delivered => "delivered",
        Returned => "returned",
    }
}

impl PaymentMethod {
    /// Card and UPI payments go through the hosted checkout page.
    pub fn is_hosted(&self) -> bool { !matches!(self, Self::CashOnDelivery) }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct Order {
    id: Uuid,
    order_number: String,
    user_id: Uuid,
    #[sqlx(try_from = "String")]
    payment_method: PaymentMethod,
    #[sqlx(try_from = "String")]
    payment_status: PaymentStatus,
    #[sqlx(try_from = "String")]
    order_status: OrderStatus,
    #[sqlx(try_from = "String")]
    shipping_status: ShippingStatus,
    subtotal: Decimal,
    shipping_fee: Decimal,
    total: Decimal,
    currency: String,
    shipping_address: Json<Address>,
    tracking_number: Option<String>,
    carrier: Option<String>,
    checkout_session_id: Option<String>,
    payment_intent_id: Option<String>,
    cancel_reason: Option<String>,
    delivered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// A priced line about to be written to `order_items`.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderLine {
    pub product_id: Uuid,
    pub name: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: Quantity,
    pub unit_price: Decimal,
}

impl OrderLine {
    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity.value()) }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Flat shipping fee, waived once the subtotal reaches the threshold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub flat_fee: Decimal,
    pub free_threshold: Decimal,
}

impl ShippingPolicy {
    pub fn fee_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal >= self.free_threshold { Decimal::ZERO } else { self.flat_fee }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OrderAction {
    MarkPaid { payment_intent: Option<String> },
    PaymentFailed,
    ConfirmCashOnDelivery,
    Ship { carrier: Option<String>, tracking_number: Option<String> },
    OutForDelivery,
    Deliver,
    Cancel { reason: Option<String> },
    RequestReturn,
    RequestExchange,
    ResolveReturn { approved: bool },
    ResolveExchange { approved: bool },
}

impl OrderAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MarkPaid { .. } => "mark_paid",
            Self::PaymentFailed => "payment_failed",
            Self::ConfirmCashOnDelivery => "confirm_cod",
            Self::Ship { .. } => "ship",
            Self::OutForDelivery => "out_for_delivery",
            Self::Deliver => "deliver",
            Self::Cancel { .. } => "cancel",
            Self::RequestReturn => "request_return",
            Self::RequestExchange => "request_exchange",
            Self::ResolveReturn { .. } => "resolve_return",
            Self::ResolveExchange { .. } => "resolve_exchange",
        }
    }
}

/// Line appended to the order's tracking log after a transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackingNote {
    pub status: String,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Applied {
        note: TrackingNote,
        /// Stock reserved by the order must be put back.
        restock: bool,
    },
    /// The order is already in the requested state; nothing changed.
    AlreadyApplied,
}

/// What the customer may currently do with an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderEligibility {
    pub can_cancel: bool,
    pub can_return: bool,
    pub can_exchange: bool,
    pub return_window_ends_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    #[error("order has no items")]
    NoItems,
    #[error("cannot {action} an order that is {order_status} (payment {payment_status}, shipping {shipping_status})")]
    IllegalTransition {
        action: &'static str,
        order_status: OrderStatus,
        payment_status: PaymentStatus,
        shipping_status: ShippingStatus,
    },
    #[error("the return window closed on {0}")]
    ReturnWindowClosed(DateTime<Utc>),
    #[error("action {0} only applies to cash on delivery orders")]
    NotCashOnDelivery(&'static str),
}

pub struct NewOrder<'a> {
    pub user_id: Uuid,
    pub payment_method: PaymentMethod,
    pub lines: &'a [OrderLine],
    pub shipping: &'a ShippingPolicy,
    pub currency: &'a str,
    pub shipping_address: Address,
}

impl Order {
    /// Prices the lines and creates a pending order.
    pub fn place(new: NewOrder<'_>, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.lines.is_empty() { return Err(OrderError::NoItems); }
        let subtotal: Decimal = new.lines.iter().map(OrderLine::line_total).sum();
        let shipping_fee = new.shipping.fee_for(subtotal);
        let mut order = Self {
            id: Uuid::now_v7(), order_number: Self::generate_number(), user_id: new.user_id,
            payment_method: new.payment_method, payment_status: PaymentStatus::Pending,
            order_status: OrderStatus::Pending, shipping_status: ShippingStatus::NotShipped,
            subtotal, shipping_fee, total: subtotal + shipping_fee, currency: new.currency.to_uppercase(),
            shipping_address: Json(new.shipping_address), tracking_number: None, carrier: None,
            checkout_session_id: None, payment_intent_id: None, cancel_reason: None, delivered_at: None,
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(OrderEvent::Placed { order_id: order.id, user_id: order.user_id, total: order.total });
        Ok(order)
    }

    fn generate_number() -> String { format!("ORD-{:08}", rand::random::<u32>() % 100_000_000) }

    /// Draws a fresh order number after the stored one turned out to be taken.
    pub fn renumber(&mut self) { self.order_number = Self::generate_number(); }

    pub fn id(&self) -> Uuid { self.id }
    pub fn order_number(&self) -> &str { &self.order_number }
    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }
    pub fn payment_status(&self) -> PaymentStatus { self.payment_status }
    pub fn order_status(&self) -> OrderStatus { self.order_status }
    pub fn shipping_status(&self) -> ShippingStatus { self.shipping_status }
    pub fn subtotal(&self) -> Money { Money::new(self.subtotal, &self.currency) }
    pub fn shipping_fee(&self) -> Money { Money::new(self.shipping_fee, &self.currency) }
    pub fn total(&self) -> Money { Money::new(self.total, &self.currency) }
    pub fn currency(&self) -> &str { &self.currency }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address.0 }
    pub fn tracking_number(&self) -> Option<&str> { self.tracking_number.as_deref() }
    pub fn carrier(&self) -> Option<&str> { self.carrier.as_deref() }
    pub fn checkout_session_id(&self) -> Option<&str> { self.checkout_session_id.as_deref() }
    pub fn payment_intent_id(&self) -> Option<&str> { self.payment_intent_id.as_deref() }
    pub fn cancel_reason(&self) -> Option<&str> { self.cancel_reason.as_deref() }
    pub fn delivered_at(&self) -> Option<DateTime<Utc>> { self.delivered_at }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    pub fn attach_checkout_session(&mut self, session_id: impl Into<String>) {
        self.checkout_session_id = Some(session_id.into());
        self.touch();
    }

    pub fn return_window_ends_at(&self) -> DateTime<Utc> { self.created_at + Duration::days(RETURN_WINDOW_DAYS) }

    pub fn can_cancel(&self) -> bool {
        matches!(self.order_status, OrderStatus::Pending | OrderStatus::Confirmed)
            && self.shipping_status == ShippingStatus::NotShipped
    }

    pub fn can_return(&self, now: DateTime<Utc>) -> bool {
        self.order_status == OrderStatus::Delivered && now <= self.return_window_ends_at()
    }

    pub fn can_exchange(&self, now: DateTime<Utc>) -> bool { self.can_return(now) }

    pub fn eligibility(&self, now: DateTime<Utc>) -> OrderEligibility {
        OrderEligibility {
            can_cancel: self.can_cancel(),
            can_return: self.can_return(now),
            can_exchange: self.can_exchange(now),
            return_window_ends_at: self.return_window_ends_at(),
        }
    }

    /// Applies an action to the status triad.
    pub fn apply(&mut self, action: OrderAction, now: DateTime<Utc>) -> Result<Transition, OrderError> {
        let illegal = |o: &Self, action: &OrderAction| OrderError::IllegalTransition {
            action: action.name(),
            order_status: o.order_status,
            payment_status: o.payment_status,
            shipping_status: o.shipping_status,
        };

        let (note, restock) = match &action {
            OrderAction::MarkPaid { payment_intent } => {
                if self.payment_status == PaymentStatus::Paid { return Ok(Transition::AlreadyApplied); }
                let payable = matches!(self.payment_status, PaymentStatus::Pending | PaymentStatus::Failed)
                    && self.order_status == OrderStatus::Pending;
                if !payable { return Err(illegal(self, &action)); }
                self.payment_status = PaymentStatus::Paid;
                self.order_status = OrderStatus::Confirmed;
                if payment_intent.is_some() { self.payment_intent_id.clone_from(payment_intent); }
                self.raise_event(OrderEvent::Paid { order_id: self.id, payment_intent: payment_intent.clone() });
                self.raise_event(OrderEvent::Confirmed { order_id: self.id });
                (note("confirmed", "Payment received, order confirmed"), false)
            }
            OrderAction::PaymentFailed => {
                if self.payment_status == PaymentStatus::Failed { return Ok(Transition::AlreadyApplied); }
                if self.payment_status != PaymentStatus::Pending || self.order_status != OrderStatus::Pending {
                    return Err(illegal(self, &action));
                }
                self.payment_status = PaymentStatus::Failed;
                self.raise_event(OrderEvent::PaymentFailed { order_id: self.id });
                (note("payment_failed", "Payment failed, please try again"), false)
            }
            OrderAction::ConfirmCashOnDelivery => {
                if self.payment_method != PaymentMethod::CashOnDelivery {
                    return Err(OrderError::NotCashOnDelivery(action.name()));
                }
                if self.order_status != OrderStatus::Pending { return Err(illegal(self, &action)); }
                self.order_status = OrderStatus::Confirmed;
                self.raise_event(OrderEvent::Confirmed { order_id: self.id });
                (note("confirmed", "Order confirmed, pay on delivery"), false)
            }
            OrderAction::Ship { carrier, tracking_number } => {
                if self.order_status != OrderStatus::Confirmed { return Err(illegal(self, &action)); }
                self.order_status = OrderStatus::Shipped;
                self.shipping_status = ShippingStatus::Shipped;
                self.carrier.clone_from(carrier);
                self.tracking_number.clone_from(tracking_number);
                self.raise_event(OrderEvent::Shipped {
                    order_id: self.id, carrier: carrier.clone(), tracking_number: tracking_number.clone(),
                });
                let message = match (carrier, tracking_number) {
                    (Some(c), Some(t)) => format!("Shipped via {c}, tracking number {t}"),
                    (Some(c), None) => format!("Shipped via {c}"),
                    (None, Some(t)) => format!("Shipped, tracking number {t}"),
                    (None, None) => "Shipped".to_string(),
                };
                (note("shipped", &message), false)
            }
            OrderAction::OutForDelivery => {
                if self.order_status != OrderStatus::Shipped || self.shipping_status != ShippingStatus::Shipped {
                    return Err(illegal(self, &action));
                }
                self.shipping_status = ShippingStatus::OutForDelivery;
                self.raise_event(OrderEvent::OutForDelivery { order_id: self.id });
                (note("out_for_delivery", "Out for delivery"), false)
            }
            OrderAction::Deliver => {
                if self.order_status != OrderStatus::Shipped { return Err(illegal(self, &action)); }
                self.order_status = OrderStatus::Delivered;
                self.shipping_status = ShippingStatus::Delivered;
                self.delivered_at = Some(now);
                if self.payment_method == PaymentMethod::CashOnDelivery && self.payment_status == PaymentStatus::Pending {
                    self.payment_status = PaymentStatus::Paid;
                }
                self.raise_event(OrderEvent::Delivered { order_id: self.id });
                (note("delivered", "Delivered"), false)
            }
            OrderAction::Cancel { reason } => {
                if self.order_status == OrderStatus::Cancelled { return Ok(Transition::AlreadyApplied); }
                if !self.can_cancel() { return Err(illegal(self, &action)); }
                self.order_status = OrderStatus::Cancelled;
                if self.payment_status == PaymentStatus::Paid { self.payment_status = PaymentStatus::Refunded; }
                self.cancel_reason.clone_from(reason);
                self.raise_event(OrderEvent::Cancelled { order_id: self.id, reason: reason.clone() });
                let message = reason.as_deref().map_or_else(|| "Order cancelled".to_string(), |r| format!("Order cancelled: {r}"));
                (note("cancelled", &message), true)
            }
            OrderAction::RequestReturn | OrderAction::RequestExchange => {
                if self.order_status != OrderStatus::Delivered { return Err(illegal(self, &action)); }
                if now > self.return_window_ends_at() {
                    return Err(OrderError::ReturnWindowClosed(self.return_window_ends_at()));
                }
                if action == OrderAction::RequestReturn {
                    self.order_status = OrderStatus::ReturnRequested;
                    self.raise_event(OrderEvent::ReturnRequested { order_id: self.id });
                    (note("return_requested", "Return requested"), false)
                } else {
                    self.order_status = OrderStatus::ExchangeRequested;
                    self.raise_event(OrderEvent::ExchangeRequested { order_id: self.id });
                    (note("exchange_requested", "Exchange requested"), false)
                }
            }
            OrderAction::ResolveReturn { approved } => {
                if self.order_status != OrderStatus::ReturnRequested { return Err(illegal(self, &action)); }
                self.raise_event(OrderEvent::ReturnResolved { order_id: self.id, approved: *approved });
                if *approved {
                    self.order_status = OrderStatus::Returned;
                    self.shipping_status = ShippingStatus::Returned;
                    if self.payment_status == PaymentStatus::Paid { self.payment_status = PaymentStatus::Refunded; }
                    (note("returned", "Return approved, refund initiated"), true)
                } else {
                    self.order_status = OrderStatus::Delivered;
                    (note("return_rejected", "Return request declined"), false)
                }
            }
            OrderAction::ResolveExchange { approved } => {
                if self.order_status != OrderStatus::ExchangeRequested { return Err(illegal(self, &action)); }
                self.raise_event(OrderEvent::ExchangeResolved { order_id: self.id, approved: *approved });
                if *approved {
                    self.order_status = OrderStatus::Exchanged;
                    (note("exchanged", "Exchange approved, replacement on its way"), false)
                } else {
                    self.order_status = OrderStatus::Delivered;
                    (note("exchange_rejected", "Exchange request declined"), false)
                }
            }
        };

        self.updated_at = now;
        Ok(Transition::Applied { note, restock })
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: OrderEvent) { self.events.push(DomainEvent::Order(e)); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn note(status: &str, message: &str) -> TrackingNote {
    TrackingNote { status: status.to_string(), message: message.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap() }

    fn line(price: i64, qty: u32) -> OrderLine {
        OrderLine {
            product_id: Uuid::new_v4(), name: "Oxford Shirt".into(), size: Some("M".into()), color: None,
            quantity: Quantity::new(qty).unwrap(), unit_price: Decimal::new(price, 0),
        }
    }

    fn policy() -> ShippingPolicy { ShippingPolicy { flat_fee: Decimal::new(99, 0), free_threshold: Decimal::new(999, 0) } }

    fn order(method: PaymentMethod) -> Order {
        let lines = [line(450, 1)];
        let policy = policy();
        Order::place(NewOrder {
            user_id: Uuid::new_v4(), payment_method: method, lines: &lines, shipping: &policy,
            currency: "inr", shipping_address: Address::default(),
        }, now()).unwrap()
    }

    fn delivered(method: PaymentMethod) -> Order {
        let mut o = order(method);
        match method {
            PaymentMethod::CashOnDelivery => o.apply(OrderAction::ConfirmCashOnDelivery, now()).unwrap(),
            _ => o.apply(OrderAction::MarkPaid { payment_intent: Some("pi_1".into()) }, now()).unwrap(),
        };
        o.apply(OrderAction::Ship { carrier: None, tracking_number: None }, now()).unwrap();
        o.apply(OrderAction::Deliver, now()).unwrap();
        o
    }

    #[test]
    fn test_place_prices_order() {
        let lines = [line(450, 1), line(300, 1)];
        let policy = policy();
        let o = Order::place(NewOrder {
            user_id: Uuid::new_v4(), payment_method: PaymentMethod::Card, lines: &lines, shipping: &policy,
            currency: "INR", shipping_address: Address::default(),
        }, now()).unwrap();
        assert_eq!(o.subtotal().amount(), Decimal::new(750, 0));
        assert_eq!(o.shipping_fee().amount(), Decimal::new(99, 0));
        assert_eq!(o.total().amount(), Decimal::new(849, 0));
        assert!(o.order_number().starts_with("ORD-"));
        assert_eq!(o.order_number().len(), 12);
        let mut renumbered = o.clone();
        renumbered.renumber();
        assert_eq!(renumbered.id(), o.id());
        assert!(renumbered.order_number().starts_with("ORD-"));

        let big = [line(500, 2)];
        let o = Order::place(NewOrder {
            user_id: Uuid::new_v4(), payment_method: PaymentMethod::Upi, lines: &big, shipping: &policy,
            currency: "INR", shipping_address: Address::default(),
        }, now()).unwrap();
        assert!(o.shipping_fee().is_zero());
    }

    #[test]
    fn test_place_requires_items() {
        let policy = policy();
        let err = Order::place(NewOrder {
            user_id: Uuid::new_v4(), payment_method: PaymentMethod::Card, lines: &[], shipping: &policy,
            currency: "INR", shipping_address: Address::default(),
        }, now()).unwrap_err();
        assert_eq!(err, OrderError::NoItems);
    }

    #[test]
    fn test_order_workflow() {
        let mut o = order(PaymentMethod::Card);
        o.apply(OrderAction::MarkPaid { payment_intent: Some("pi_123".into()) }, now()).unwrap();
        assert_eq!(o.order_status(), OrderStatus::Confirmed);
        assert_eq!(o.payment_status(), PaymentStatus::Paid);
        assert_eq!(o.payment_intent_id(), Some("pi_123"));

        let t = o.apply(OrderAction::Ship { carrier: Some("Delhivery".into()), tracking_number: Some("DL42".into()) }, now()).unwrap();
        assert_eq!(t, Transition::Applied {
            note: TrackingNote { status: "shipped".into(), message: "Shipped via Delhivery, tracking number DL42".into() },
            restock: false,
        });
        o.apply(OrderAction::OutForDelivery, now()).unwrap();
        o.apply(OrderAction::Deliver, now()).unwrap();
        assert_eq!(o.order_status(), OrderStatus::Delivered);
        assert_eq!(o.shipping_status(), ShippingStatus::Delivered);
        assert_eq!(o.delivered_at(), Some(now()));
    }

    #[test]
    fn test_mark_paid_is_idempotent() {
        let mut o = order(PaymentMethod::Card);
        o.apply(OrderAction::MarkPaid { payment_intent: None }, now()).unwrap();
        o.take_events();
        let again = o.apply(OrderAction::MarkPaid { payment_intent: None }, now()).unwrap();
        assert_eq!(again, Transition::AlreadyApplied);
        assert!(o.take_events().is_empty());
    }

    #[test]
    fn test_paid_after_failure_recovers() {
        let mut o = order(PaymentMethod::Upi);
        o.apply(OrderAction::PaymentFailed, now()).unwrap();
        assert_eq!(o.payment_status(), PaymentStatus::Failed);
        o.apply(OrderAction::MarkPaid { payment_intent: None }, now()).unwrap();
        assert_eq!(o.order_status(), OrderStatus::Confirmed);
    }

    #[test]
    fn test_payment_on_cancelled_order_is_rejected() {
        let mut o = order(PaymentMethod::Card);
        o.apply(OrderAction::Cancel { reason: None }, now()).unwrap();
        let err = o.apply(OrderAction::MarkPaid { payment_intent: None }, now()).unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition { action: "mark_paid", .. }));
    }

    #[test]
    fn test_shipped_order_cannot_be_cancelled() {
        let mut o = order(PaymentMethod::Card);
        o.apply(OrderAction::MarkPaid { payment_intent: None }, now()).unwrap();
        o.apply(OrderAction::Ship { carrier: None, tracking_number: None }, now()).unwrap();
        assert!(!o.can_cancel());
        let err = o.apply(OrderAction::Cancel { reason: None }, now()).unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition {
            action: "cancel", shipping_status: ShippingStatus::Shipped, ..
        }));
    }

    #[test]
    fn test_cancel_refunds_and_restocks() {
        let mut o = order(PaymentMethod::Card);
        o.apply(OrderAction::MarkPaid { payment_intent: None }, now()).unwrap();
        let t = o.apply(OrderAction::Cancel { reason: Some("Ordered wrong size".into()) }, now()).unwrap();
        assert!(matches!(t, Transition::Applied { restock: true, .. }));
        assert_eq!(o.payment_status(), PaymentStatus::Refunded);
        assert_eq!(o.cancel_reason(), Some("Ordered wrong size"));
        assert_eq!(o.apply(OrderAction::Cancel { reason: None }, now()).unwrap(), Transition::AlreadyApplied);
    }

    #[test]
    fn test_cod_paid_on_delivery() {
        let mut o = order(PaymentMethod::CashOnDelivery);
        o.apply(OrderAction::ConfirmCashOnDelivery, now()).unwrap();
        assert_eq!(o.payment_status(), PaymentStatus::Pending);
        o.apply(OrderAction::Ship { carrier: None, tracking_number: None }, now()).unwrap();
        o.apply(OrderAction::Deliver, now()).unwrap();
        assert_eq!(o.payment_status(), PaymentStatus::Paid);
    }

    #[test]
    fn test_confirm_cod_rejects_card_orders() {
        let mut o = order(PaymentMethod::Card);
        assert_eq!(o.apply(OrderAction::ConfirmCashOnDelivery, now()), Err(OrderError::NotCashOnDelivery("confirm_cod")));
    }

    #[test]
    fn test_return_window() {
        let o = delivered(PaymentMethod::Card);
        let last_day = now() + Duration::days(RETURN_WINDOW_DAYS);
        assert!(o.can_return(last_day));
        assert!(o.can_exchange(last_day));
        assert!(!o.can_return(last_day + Duration::seconds(1)));

        let mut late = o.clone();
        let err = late.apply(OrderAction::RequestReturn, last_day + Duration::hours(1)).unwrap_err();
        assert_eq!(err, OrderError::ReturnWindowClosed(last_day));
    }

    #[test]
    fn test_return_only_after_delivery() {
        let mut o = order(PaymentMethod::Card);
        assert!(!o.can_return(now()));
        assert!(o.apply(OrderAction::RequestReturn, now()).is_err());
    }

    #[test]
    fn test_approved_return_refunds() {
        let mut o = delivered(PaymentMethod::Card);
        o.apply(OrderAction::RequestReturn, now()).unwrap();
        assert_eq!(o.order_status(), OrderStatus::ReturnRequested);
        assert!(!o.can_exchange(now()));
        let t = o.apply(OrderAction::ResolveReturn { approved: true }, now()).unwrap();
        assert!(matches!(t, Transition::Applied { restock: true, .. }));
        assert_eq!(o.order_status(), OrderStatus::Returned);
        assert_eq!(o.shipping_status(), ShippingStatus::Returned);
        assert_eq!(o.payment_status(), PaymentStatus::Refunded);
    }

    #[test]
    fn test_rejected_exchange_reverts_to_delivered() {
        let mut o = delivered(PaymentMethod::CashOnDelivery);
        o.apply(OrderAction::RequestExchange, now()).unwrap();
        assert!(o.apply(OrderAction::ResolveReturn { approved: true }, now()).is_err());
        o.apply(OrderAction::ResolveExchange { approved: false }, now()).unwrap();
        assert_eq!(o.order_status(), OrderStatus::Delivered);
    }

    #[test]
    fn test_status_text_roundtrip_and_unknown() {
        assert_eq!("out_for_delivery".parse::<ShippingStatus>().unwrap(), ShippingStatus::OutForDelivery);
        assert_eq!(PaymentMethod::CashOnDelivery.as_str(), "cod");
        assert!(OrderStatus::try_from("lost".to_string()).is_err());
    }
}

//! Applies verified payment events to orders.
//!
//! Webhooks are delivered at least once and possibly out of order, so every
//! step here tolerates repeats: an order that already reached the requested
//! state is left alone, and events that match no order are acknowledged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::webhook::{PaymentEvent, PaymentOutcome, PaymentRefs};
use crate::db::orders::{AppliedAction, ApplyError};
use crate::db::{CartRepository, OrderRepository, RepositoryError};
use crate::domain::aggregates::{Order, OrderAction, OrderError, PaymentStatus, Transition};
use crate::domain::events::DomainEvent;

/// Order persistence the fulfillment flow needs.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError>;
    async fn order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError>;
    async fn order_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>, RepositoryError>;
    async fn apply(&self, id: Uuid, action: OrderAction, now: DateTime<Utc>) -> Result<AppliedAction, ApplyError>;
    async fn clear_cart(&self, user_id: Uuid) -> Result<u64, RepositoryError>;
}

/// [`OrderStore`] backed by the storefront database.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).get(id).await
    }

    async fn order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).find_by_checkout_session(session_id).await
    }

    async fn order_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).find_by_payment_intent(payment_intent_id).await
    }

    async fn apply(&self, id: Uuid, action: OrderAction, now: DateTime<Utc>) -> Result<AppliedAction, ApplyError> {
        OrderRepository::new(&self.pool).apply(id, None, action, now).await
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        CartRepository::new(&self.pool).clear(user_id).await
    }
}

/// Cancel reason recorded when the hosted payment page could not be opened.
pub const PAYMENT_NOT_STARTED: &str = "Payment could not be started";

/// Cancels an order whose checkout session could not be created, releasing
/// its reserved stock. A failure to cancel is logged and yields `None`.
#[instrument(skip(store))]
pub async fn cancel_unstarted<S: OrderStore + ?Sized>(store: &S, order_id: Uuid, now: DateTime<Utc>) -> Option<AppliedAction> {
    let cancel = OrderAction::Cancel { reason: Some(PAYMENT_NOT_STARTED.to_string()) };
    match store.apply(order_id, cancel, now).await {
        Ok(applied) => {
            info!(%order_id, "Order cancelled before payment");
            Some(applied)
        }
        Err(e) => {
            error!(%order_id, error = %e, "Failed to cancel order");
            None
        }
    }
}

#[derive(Debug)]
pub enum Fulfillment {
    /// Event type or outcome the storefront doesn't act on.
    Ignored,
    /// No order carries any of the event's references.
    Unmatched,
    /// The order was already in the requested state.
    Unchanged { order_id: Uuid },
    /// The order's current state doesn't allow the change.
    Rejected { order_id: Uuid, reason: OrderError },
    Applied { order_id: Uuid, events: Vec<DomainEvent> },
}

/// Finds the order an event refers to: metadata order id, then client
/// reference, then stored session id, then stored payment intent.
pub async fn find_order<S: OrderStore + ?Sized>(store: &S, refs: &PaymentRefs) -> Result<Option<Order>, RepositoryError> {
    for id in [refs.order_id, refs.client_reference_id].into_iter().flatten() {
        if let Some(order) = store.order(id).await? {
            return Ok(Some(order));
        }
    }
    if let Some(session_id) = &refs.checkout_session_id {
        if let Some(order) = store.order_by_checkout_session(session_id).await? {
            return Ok(Some(order));
        }
    }
    if let Some(payment_intent_id) = &refs.payment_intent_id {
        if let Some(order) = store.order_by_payment_intent(payment_intent_id).await? {
            return Ok(Some(order));
        }
    }
    Ok(None)
}

/// Applies one payment event. Only storage failures are errors; the webhook
/// endpoint answers 500 for those so the gateway retries.
#[instrument(skip(store, event), fields(event_id = %event.id, kind = %event.kind))]
pub async fn fulfill<S: OrderStore + ?Sized>(store: &S, event: &PaymentEvent, now: DateTime<Utc>) -> Result<Fulfillment, RepositoryError> {
    let Some(outcome) = event.outcome.filter(|o| *o != PaymentOutcome::Pending) else {
        return Ok(Fulfillment::Ignored);
    };

    let Some(order) = find_order(store, &event.refs).await? else {
        warn!(refs = ?event.refs, "Payment event matches no order");
        return Ok(Fulfillment::Unmatched);
    };
    let order_id = order.id();

    let action = match outcome {
        PaymentOutcome::Succeeded => OrderAction::MarkPaid { payment_intent: event.refs.payment_intent_id.clone() },
        PaymentOutcome::Failed => OrderAction::PaymentFailed,
        PaymentOutcome::Expired if matches!(order.payment_status(), PaymentStatus::Pending | PaymentStatus::Failed) => {
            OrderAction::Cancel { reason: Some("Checkout session expired".to_string()) }
        }
        PaymentOutcome::Expired | PaymentOutcome::Pending => return Ok(Fulfillment::Unchanged { order_id }),
    };

    let mut applied = match store.apply(order_id, action, now).await {
        Ok(applied) => applied,
        Err(ApplyError::Order(reason)) => {
            warn!(%order_id, %reason, "Payment event not applicable to order");
            return Ok(Fulfillment::Rejected { order_id, reason });
        }
        Err(ApplyError::Repository(RepositoryError::NotFound)) => return Ok(Fulfillment::Unmatched),
        Err(ApplyError::Repository(e)) => return Err(e),
    };

    if applied.transition == Transition::AlreadyApplied {
        info!(%order_id, "Payment event already applied");
        return Ok(Fulfillment::Unchanged { order_id });
    }

    if outcome == PaymentOutcome::Succeeded {
        if let Err(e) = store.clear_cart(applied.order.user_id()).await {
            warn!(%order_id, error = %e, "Failed to clear cart after payment");
        }
    }

    info!(%order_id, order_status = %applied.order.order_status(), payment_status = %applied.order.payment_status(), "Payment event applied");
    Ok(Fulfillment::Applied { order_id, events: applied.order.take_events() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::NewOrder;
    use crate::domain::aggregates::{OrderLine, OrderStatus, PaymentMethod, ShippingPolicy};
    use crate::domain::value_objects::{Address, Quantity};
    use rust_decimal::Decimal;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        orders: Mutex<HashMap<Uuid, Order>>,
        intents: Mutex<HashMap<String, Uuid>>,
        cleared_carts: AtomicU64,
        stock: Mutex<HashMap<Uuid, i32>>,
        reserved: Mutex<HashMap<Uuid, Vec<(Uuid, i32)>>>,
    }

    impl FakeStore {
        async fn reserve(&self, order_id: Uuid, product_id: Uuid, quantity: i32) {
            *self.stock.lock().await.entry(product_id).or_insert(0) -= quantity;
            self.reserved.lock().await.entry(order_id).or_default().push((product_id, quantity));
        }

        async fn stock_of(&self, product_id: Uuid) -> i32 {
            self.stock.lock().await.get(&product_id).copied().unwrap_or(0)
        }

        async fn insert(&self, order: Order) -> Uuid {
            let id = order.id();
            self.orders.lock().await.insert(id, order);
            id
        }

        async fn get(&self, id: Uuid) -> Order { self.orders.lock().await[&id].clone() }
    }

    #[async_trait]
    impl OrderStore for FakeStore {
        async fn order(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
            Ok(self.orders.lock().await.get(&id).cloned())
        }

        async fn order_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError> {
            Ok(self.orders.lock().await.values().find(|o| o.checkout_session_id() == Some(session_id)).cloned())
        }

        async fn order_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>, RepositoryError> {
            let Some(id) = self.intents.lock().await.get(payment_intent_id).copied() else { return Ok(None) };
            self.order(id).await
        }

        async fn apply(&self, id: Uuid, action: OrderAction, now: DateTime<Utc>) -> Result<AppliedAction, ApplyError> {
            let mut orders = self.orders.lock().await;
            let order = orders.get_mut(&id).ok_or(RepositoryError::NotFound)?;
            let transition = order.apply(action, now)?;
            if matches!(transition, Transition::Applied { restock: true, .. }) {
                let mut stock = self.stock.lock().await;
                for (product_id, quantity) in self.reserved.lock().await.get(&id).into_iter().flatten() {
                    *stock.entry(*product_id).or_insert(0) += quantity;
                }
            }
            // The stored copy drops its events like a database row would.
            let returned = order.clone();
            order.take_events();
            Ok(AppliedAction { order: returned, transition })
        }

        async fn clear_cart(&self, _user_id: Uuid) -> Result<u64, RepositoryError> {
            self.cleared_carts.fetch_add(1, Ordering::Relaxed);
            Ok(1)
        }
    }

    fn card_order() -> Order {
        let lines = [OrderLine {
            product_id: Uuid::new_v4(), name: "Linen Shirt".into(), size: Some("M".into()), color: None,
            quantity: Quantity::new(1).unwrap(), unit_price: Decimal::new(1499, 0),
        }];
        let shipping = ShippingPolicy { flat_fee: Decimal::new(99, 0), free_threshold: Decimal::new(999, 0) };
        let mut order = Order::place(NewOrder {
            user_id: Uuid::new_v4(), payment_method: PaymentMethod::Card, lines: &lines, shipping: &shipping,
            currency: "INR", shipping_address: Address::default(),
        }, Utc::now()).unwrap();
        order.take_events();
        order
    }

    fn event(outcome: PaymentOutcome, refs: PaymentRefs) -> PaymentEvent {
        PaymentEvent { id: "evt_1".into(), kind: "checkout.session.completed".into(), outcome: Some(outcome), refs }
    }

    #[tokio::test]
    async fn test_paid_event_confirms_order_and_clears_cart() {
        let store = FakeStore::default();
        let id = store.insert(card_order()).await;
        let refs = PaymentRefs { order_id: Some(id), payment_intent_id: Some("pi_1".into()), ..PaymentRefs::default() };

        let result = fulfill(&store, &event(PaymentOutcome::Succeeded, refs), Utc::now()).await.unwrap();
        match result {
            Fulfillment::Applied { order_id, events } => {
                assert_eq!(order_id, id);
                assert!(events.iter().any(|e| e.subject() == "storefront.orders.paid"));
            }
            other => panic!("unexpected {other:?}"),
        }
        let order = store.get(id).await;
        assert_eq!(order.payment_status(), PaymentStatus::Paid);
        assert_eq!(order.order_status(), OrderStatus::Confirmed);
        assert_eq!(order.payment_intent_id(), Some("pi_1"));
        assert_eq!(store.cleared_carts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_redelivered_success_is_a_no_op() {
        let store = FakeStore::default();
        let id = store.insert(card_order()).await;
        let refs = PaymentRefs { order_id: Some(id), ..PaymentRefs::default() };
        fulfill(&store, &event(PaymentOutcome::Succeeded, refs.clone()), Utc::now()).await.unwrap();
        let before = store.get(id).await;

        let again = fulfill(&store, &event(PaymentOutcome::Succeeded, refs), Utc::now()).await.unwrap();
        assert!(matches!(again, Fulfillment::Unchanged { order_id } if order_id == id));
        let after = store.get(id).await;
        assert_eq!(after.updated_at(), before.updated_at());
        assert_eq!(store.cleared_carts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_matching_falls_back_to_session_then_intent() {
        let store = FakeStore::default();
        let mut order = card_order();
        order.attach_checkout_session("cs_42");
        let by_session = store.insert(order).await;
        let by_intent = store.insert(card_order()).await;
        store.intents.lock().await.insert("pi_77".into(), by_intent);

        let refs = PaymentRefs {
            order_id: Some(Uuid::new_v4()),
            checkout_session_id: Some("cs_42".into()),
            ..PaymentRefs::default()
        };
        assert_eq!(find_order(&store, &refs).await.unwrap().map(|o| o.id()), Some(by_session));

        let refs = PaymentRefs { payment_intent_id: Some("pi_77".into()), ..PaymentRefs::default() };
        assert_eq!(find_order(&store, &refs).await.unwrap().map(|o| o.id()), Some(by_intent));

        let refs = PaymentRefs { client_reference_id: Some(by_intent), ..PaymentRefs::default() };
        assert_eq!(find_order(&store, &refs).await.unwrap().map(|o| o.id()), Some(by_intent));
    }

    #[tokio::test]
    async fn test_unmatched_and_pending_events_are_acknowledged() {
        let store = FakeStore::default();
        let refs = PaymentRefs { checkout_session_id: Some("cs_unknown".into()), ..PaymentRefs::default() };
        let result = fulfill(&store, &event(PaymentOutcome::Succeeded, refs.clone()), Utc::now()).await.unwrap();
        assert!(matches!(result, Fulfillment::Unmatched));

        let result = fulfill(&store, &event(PaymentOutcome::Pending, refs), Utc::now()).await.unwrap();
        assert!(matches!(result, Fulfillment::Ignored));
    }

    #[tokio::test]
    async fn test_expired_session_cancels_unpaid_order_only() {
        let store = FakeStore::default();
        let unpaid = store.insert(card_order()).await;
        let refs = PaymentRefs { order_id: Some(unpaid), ..PaymentRefs::default() };
        fulfill(&store, &event(PaymentOutcome::Expired, refs), Utc::now()).await.unwrap();
        assert_eq!(store.get(unpaid).await.order_status(), OrderStatus::Cancelled);

        let paid = store.insert(card_order()).await;
        let refs = PaymentRefs { order_id: Some(paid), ..PaymentRefs::default() };
        fulfill(&store, &event(PaymentOutcome::Succeeded, refs.clone()), Utc::now()).await.unwrap();
        let result = fulfill(&store, &event(PaymentOutcome::Expired, refs), Utc::now()).await.unwrap();
        assert!(matches!(result, Fulfillment::Unchanged { .. }));
        assert_eq!(store.get(paid).await.order_status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_payment_on_cancelled_order_is_rejected() {
        let store = FakeStore::default();
        let id = store.insert(card_order()).await;
        store.apply(id, OrderAction::Cancel { reason: None }, Utc::now()).await.unwrap();

        let refs = PaymentRefs { order_id: Some(id), ..PaymentRefs::default() };
        let result = fulfill(&store, &event(PaymentOutcome::Succeeded, refs), Utc::now()).await.unwrap();
        assert!(matches!(result, Fulfillment::Rejected { .. }));
        assert_eq!(store.get(id).await.payment_status(), PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_unstarted_payment_cancels_and_restocks() {
        let store = FakeStore::default();
        let product = Uuid::new_v4();
        store.stock.lock().await.insert(product, 5);
        let id = store.insert(card_order()).await;
        store.reserve(id, product, 2).await;
        assert_eq!(store.stock_of(product).await, 3);

        let mut applied = cancel_unstarted(&store, id, Utc::now()).await.unwrap();
        assert!(matches!(applied.transition, Transition::Applied { restock: true, .. }));
        assert!(applied.order.take_events().iter().any(|e| e.subject() == "storefront.orders.cancelled"));

        let order = store.get(id).await;
        assert_eq!(order.order_status(), OrderStatus::Cancelled);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.cancel_reason(), Some(PAYMENT_NOT_STARTED));
        assert_eq!(store.stock_of(product).await, 5);

        let again = cancel_unstarted(&store, id, Utc::now()).await.unwrap();
        assert_eq!(again.transition, Transition::AlreadyApplied);
        assert_eq!(store.stock_of(product).await, 5);
    }

    #[tokio::test]
    async fn test_unstarted_payment_for_missing_order() {
        assert!(cancel_unstarted(&FakeStore::default(), Uuid::new_v4(), Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_session_returns_stock() {
        let store = FakeStore::default();
        let product = Uuid::new_v4();
        let id = store.insert(card_order()).await;
        store.reserve(id, product, 1).await;

        let refs = PaymentRefs { order_id: Some(id), ..PaymentRefs::default() };
        fulfill(&store, &event(PaymentOutcome::Expired, refs), Utc::now()).await.unwrap();
        assert_eq!(store.stock_of(product).await, 0);
    }
}

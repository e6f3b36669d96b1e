//! Order repository.
//!
//! Status changes are always written together with their tracking entry and,
//! when the transition asks for it, the stock that goes back on the shelf.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::catalog::CatalogRepository;
use super::{PageParams, RepositoryError};
use crate::domain::aggregates::{
    Order, OrderAction, OrderError, OrderItem, OrderLine, OrderStatus, PaymentStatus, ShippingStatus, TrackingNote,
    Transition,
};

const ORDER_NUMBER_ATTEMPTS: usize = 3;

const COLUMNS: &str = "id, order_number, user_id, payment_method, payment_status, order_status, shipping_status, \
                       subtotal, shipping_fee, total, currency, shipping_address, tracking_number, carrier, \
                       checkout_session_id, payment_intent_id, cancel_reason, delivered_at, created_at, updated_at";

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct TrackingEntry {
    pub id: Uuid,
    pub status: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Admin order listing filter.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub order_status: Option<OrderStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub shipping_status: Option<ShippingStatus>,
    /// Prefix of the order number.
    pub number: Option<String>,
}

impl OrderFilter {
    fn push_conditions<'a>(&'a self, qb: &mut QueryBuilder<'a, Postgres>) {
        qb.push(" WHERE TRUE");
        if let Some(status) = self.order_status {
            qb.push(" AND order_status = ").push_bind(status.as_str());
        }
        if let Some(status) = self.payment_status {
            qb.push(" AND payment_status = ").push_bind(status.as_str());
        }
        if let Some(status) = self.shipping_status {
            qb.push(" AND shipping_status = ").push_bind(status.as_str());
        }
        if let Some(number) = self.number.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            qb.push(" AND order_number LIKE ").push_bind(format!("{}%", number.to_uppercase()));
        }
    }
}

/// Failure of a locked read-modify-write on an order.
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Result of [`OrderRepository::apply`]. The order still holds its pending events.
#[derive(Debug)]
pub struct AppliedAction {
    pub order: Order,
    pub transition: Transition,
}

fn insert_order_sql() -> String {
    let placeholders = (1..=COLUMNS.split(',').count()).map(|i| format!("${i}")).collect::<Vec<_>>().join(", ");
    format!("INSERT INTO orders ({COLUMNS}) VALUES ({placeholders}) ON CONFLICT (order_number) DO NOTHING")
}

pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Writes the order, its items and the first tracking entry, taking the
    /// ordered quantities out of stock. Nothing is written if any line can't
    /// be reserved. A clashing order number is redrawn a few times.
    pub async fn create(&self, order: &mut Order, lines: &[OrderLine]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let mut inserted = false;
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            if Self::insert(&mut tx, order).await? {
                inserted = true;
                break;
            }
            order.renumber();
        }
        if !inserted {
            return Err(RepositoryError::Conflict("order number already exists".to_string()));
        }

        for line in lines {
            let quantity = i32::try_from(line.quantity.value())
                .map_err(|_| RepositoryError::DataCorruption("quantity out of range".to_string()))?;
            if !CatalogRepository::reserve_stock(&mut tx, line.product_id, quantity).await? {
                return Err(RepositoryError::Conflict(format!("not enough stock for {}", line.name)));
            }
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, name, size, color, quantity, unit_price, line_total)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
            )
            .bind(Uuid::now_v7())
            .bind(order.id())
            .bind(line.product_id)
            .bind(&line.name)
            .bind(line.size.as_deref())
            .bind(line.color.as_deref())
            .bind(quantity)
            .bind(line.unit_price)
            .bind(line.line_total())
            .execute(&mut *tx)
            .await?;
        }

        let placed = TrackingNote { status: "placed".to_string(), message: "Order placed".to_string() };
        Self::insert_tracking(&mut tx, order.id(), &placed).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Inserts the order row. Returns `false` when its order number is taken.
    async fn insert(conn: &mut PgConnection, order: &Order) -> Result<bool, RepositoryError> {
        let result = sqlx::query(&insert_order_sql())
            .bind(order.id())
            .bind(order.order_number())
            .bind(order.user_id())
            .bind(order.payment_method().as_str())
            .bind(order.payment_status().as_str())
            .bind(order.order_status().as_str())
            .bind(order.shipping_status().as_str())
            .bind(order.subtotal().amount())
            .bind(order.shipping_fee().amount())
            .bind(order.total().amount())
            .bind(order.currency())
            .bind(Json(order.shipping_address()))
            .bind(order.tracking_number())
            .bind(order.carrier())
            .bind(order.checkout_session_id())
            .bind(order.payment_intent_id())
            .bind(order.cancel_reason())
            .bind(order.delivered_at())
            .bind(order.created_at())
            .bind(order.updated_at())
            .execute(conn)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!("SELECT {COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(order)
    }

    /// Like [`get`](Self::get) but only finds orders that belong to `user_id`.
    pub async fn get_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!("SELECT {COLUMNS} FROM orders WHERE id = $1 AND user_id = $2"))
            .bind(id)
            .bind(user_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(order)
    }

    pub async fn list_for_user(&self, user_id: Uuid, page: &PageParams) -> Result<(Vec<Order>, i64), RepositoryError> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3"
        ))
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;
        Ok((orders, total))
    }

    pub async fn list(&self, filter: &OrderFilter, page: &PageParams) -> Result<(Vec<Order>, i64), RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM orders"));
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY created_at DESC LIMIT ").push_bind(page.limit());
        qb.push(" OFFSET ").push_bind(page.offset());
        let orders = qb.build_query_as::<Order>().fetch_all(self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        filter.push_conditions(&mut count);
        let (total,) = count.build_query_as::<(i64,)>().fetch_one(self.pool).await?;
        Ok((orders, total))
    }

    pub async fn items(&self, order_id: Uuid) -> Result<Vec<OrderItem>, RepositoryError> {
        let items = sqlx::query_as::<_, OrderItem>(
            "SELECT id, order_id, product_id, name, size, color, quantity, unit_price, line_total
               FROM order_items WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    pub async fn tracking(&self, order_id: Uuid) -> Result<Vec<TrackingEntry>, RepositoryError> {
        let entries = sqlx::query_as::<_, TrackingEntry>(
            "SELECT id, status, message, created_at FROM order_tracking WHERE order_id = $1 ORDER BY created_at, id",
        )
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(entries)
    }

    pub async fn find_by_checkout_session(&self, session_id: &str) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!("SELECT {COLUMNS} FROM orders WHERE checkout_session_id = $1"))
            .bind(session_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(order)
    }

    pub async fn find_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {COLUMNS} FROM orders WHERE payment_intent_id = $1 ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(payment_intent_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(order)
    }

    pub async fn attach_checkout_session(&self, order: &Order) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE orders SET checkout_session_id = $2, updated_at = $3 WHERE id = $1")
            .bind(order.id())
            .bind(order.checkout_session_id())
            .bind(order.updated_at())
            .execute(self.pool)
            .await
            .map_err(|e| RepositoryError::from_unique(e, "checkout session"))?;
        Ok(())
    }

    /// Locks the order, applies `action` and persists the outcome in one
    /// transaction. With `owner` set, orders of other users are reported as
    /// not found.
    pub async fn apply(&self, id: Uuid, owner: Option<Uuid>, action: OrderAction, now: DateTime<Utc>) -> Result<AppliedAction, ApplyError> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        let applied = Self::apply_locked(&mut tx, id, owner, action, now).await?;
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(applied)
    }

    pub(crate) async fn apply_locked(conn: &mut PgConnection, id: Uuid, owner: Option<Uuid>, action: OrderAction, now: DateTime<Utc>) -> Result<AppliedAction, ApplyError> {
        let mut order = Self::lock(&mut *conn, id)
            .await?
            .filter(|o| owner.map_or(true, |user| o.user_id() == user))
            .ok_or(RepositoryError::NotFound)?;
        let transition = order.apply(action, now)?;
        Self::write_transition(&mut *conn, &order, &transition).await?;
        Ok(AppliedAction { order, transition })
    }

    async fn lock(conn: &mut PgConnection, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        let order = sqlx::query_as::<_, Order>(&format!("SELECT {COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(order)
    }

    /// Saves the mutable columns of `order` after `transition`.
    pub(crate) async fn write_transition(conn: &mut PgConnection, order: &Order, transition: &Transition) -> Result<(), RepositoryError> {
        let Transition::Applied { note, restock } = transition else { return Ok(()) };

        sqlx::query(
            "UPDATE orders
                SET payment_status = $2, order_status = $3, shipping_status = $4, tracking_number = $5,
                    carrier = $6, payment_intent_id = $7, cancel_reason = $8, delivered_at = $9, updated_at = $10
              WHERE id = $1",
        )
        .bind(order.id())
        .bind(order.payment_status().as_str())
        .bind(order.order_status().as_str())
        .bind(order.shipping_status().as_str())
        .bind(order.tracking_number())
        .bind(order.carrier())
        .bind(order.payment_intent_id())
        .bind(order.cancel_reason())
        .bind(order.delivered_at())
        .bind(order.updated_at())
        .execute(&mut *conn)
        .await?;

        Self::insert_tracking(&mut *conn, order.id(), note).await?;

        if *restock {
            let items: Vec<(Uuid, i32)> = sqlx::query_as("SELECT product_id, quantity FROM order_items WHERE order_id = $1")
                .bind(order.id())
                .fetch_all(&mut *conn)
                .await?;
            for (product_id, quantity) in items {
                CatalogRepository::release_stock(&mut *conn, product_id, quantity).await?;
            }
        }
        Ok(())
    }

    async fn insert_tracking(conn: &mut PgConnection, order_id: Uuid, note: &TrackingNote) -> Result<(), RepositoryError> {
        sqlx::query("INSERT INTO order_tracking (id, order_id, status, message, created_at) VALUES ($1, $2, $3, $4, NOW())")
            .bind(Uuid::now_v7())
            .bind(order_id)
            .bind(&note.status)
            .bind(&note.message)
            .execute(conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute;

    #[test]
    fn test_order_insert_yields_on_number_clash() {
        let sql = insert_order_sql();
        assert!(sql.ends_with("ON CONFLICT (order_number) DO NOTHING"));
        assert!(sql.contains("$20)"));
        assert!(!sql.contains("$21"));
    }

    #[test]
    fn test_admin_filter_sql() {
        let filter = OrderFilter {
            order_status: Some(OrderStatus::ReturnRequested),
            shipping_status: Some(ShippingStatus::Delivered),
            number: Some("ord-12".into()),
            ..OrderFilter::default()
        };
        let mut qb = QueryBuilder::<Postgres>::new("SELECT id FROM orders");
        filter.push_conditions(&mut qb);
        assert_eq!(
            qb.build().sql(),
            "SELECT id FROM orders WHERE TRUE AND order_status = $1 AND shipping_status = $2 AND order_number LIKE $3"
        );
    }

    #[test]
    fn test_filter_deserializes_status_text() {
        let filter: OrderFilter = serde_json::from_str(r#"{"payment_status":"refunded"}"#).unwrap();
        assert_eq!(filter.payment_status, Some(PaymentStatus::Refunded));
        assert!(serde_json::from_str::<OrderFilter>(r#"{"order_status":"lost"}"#).is_err());
    }
}

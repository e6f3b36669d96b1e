//! Return and exchange request repository.
//!
//! Opening or resolving a request moves the order in the same transaction,
//! so a request row never exists without the matching order status.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::orders::{AppliedAction, ApplyError, OrderRepository};
use super::{PageParams, RepositoryError};
use crate::domain::aggregates::returns::{self, ExchangeInput, ReturnInput};
use crate::domain::aggregates::{OrderAction, OrderExchange, OrderReturn, RequestStatus};

const RETURN_COLUMNS: &str = "id, order_id, user_id, reason, details, status, admin_note, created_at, updated_at";
const EXCHANGE_COLUMNS: &str =
    "id, order_id, user_id, reason, desired_size, desired_color, status, admin_note, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error(transparent)]
    Apply(#[from] ApplyError),
    #[error(transparent)]
    Resolved(#[from] returns::AlreadyResolved),
}

impl From<RepositoryError> for RequestError {
    fn from(e: RepositoryError) -> Self { Self::Apply(ApplyError::Repository(e)) }
}

impl From<sqlx::Error> for RequestError {
    fn from(e: sqlx::Error) -> Self { RepositoryError::from(e).into() }
}

pub struct ReturnRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReturnRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn open_return(&self, order_id: Uuid, user_id: Uuid, input: ReturnInput, now: DateTime<Utc>) -> Result<(AppliedAction, OrderReturn), RequestError> {
        let mut tx = self.pool.begin().await?;
        let applied = OrderRepository::apply_locked(&mut tx, order_id, Some(user_id), OrderAction::RequestReturn, now).await?;
        let request = OrderReturn::open(order_id, user_id, input, now);
        sqlx::query(&format!("INSERT INTO order_returns ({RETURN_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"))
            .bind(request.id)
            .bind(request.order_id)
            .bind(request.user_id)
            .bind(&request.reason)
            .bind(request.details.as_deref())
            .bind(request.status.as_str())
            .bind(request.admin_note.as_deref())
            .bind(request.created_at)
            .bind(request.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((applied, request))
    }

    pub async fn open_exchange(&self, order_id: Uuid, user_id: Uuid, input: ExchangeInput, now: DateTime<Utc>) -> Result<(AppliedAction, OrderExchange), RequestError> {
        let mut tx = self.pool.begin().await?;
        let applied = OrderRepository::apply_locked(&mut tx, order_id, Some(user_id), OrderAction::RequestExchange, now).await?;
        let request = OrderExchange::open(order_id, user_id, input, now);
        sqlx::query(&format!(
            "INSERT INTO order_exchanges ({EXCHANGE_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(request.id)
        .bind(request.order_id)
        .bind(request.user_id)
        .bind(&request.reason)
        .bind(request.desired_size.as_deref())
        .bind(request.desired_color.as_deref())
        .bind(request.status.as_str())
        .bind(request.admin_note.as_deref())
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok((applied, request))
    }

    pub async fn returns_for_order(&self, order_id: Uuid) -> Result<Vec<OrderReturn>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderReturn>(&format!(
            "SELECT {RETURN_COLUMNS} FROM order_returns WHERE order_id = $1 ORDER BY created_at DESC"
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    pub async fn exchanges_for_order(&self, order_id: Uuid) -> Result<Vec<OrderExchange>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderExchange>(&format!(
            "SELECT {EXCHANGE_COLUMNS} FROM order_exchanges WHERE order_id = $1 ORDER BY created_at DESC"
        ))
        .bind(order_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Admin queue, oldest first. `status` defaults to open requests.
    pub async fn list_returns(&self, status: Option<RequestStatus>, page: &PageParams) -> Result<(Vec<OrderReturn>, i64), RepositoryError> {
        let status = status.unwrap_or(RequestStatus::Requested);
        let rows = sqlx::query_as::<_, OrderReturn>(&format!(
            "SELECT {RETURN_COLUMNS} FROM order_returns WHERE status = $1 ORDER BY created_at LIMIT $2 OFFSET $3"
        ))
        .bind(status.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM order_returns WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(self.pool)
            .await?;
        Ok((rows, total))
    }

    pub async fn list_exchanges(&self, status: Option<RequestStatus>, page: &PageParams) -> Result<(Vec<OrderExchange>, i64), RepositoryError> {
        let status = status.unwrap_or(RequestStatus::Requested);
        let rows = sqlx::query_as::<_, OrderExchange>(&format!(
            "SELECT {EXCHANGE_COLUMNS} FROM order_exchanges WHERE status = $1 ORDER BY created_at LIMIT $2 OFFSET $3"
        ))
        .bind(status.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM order_exchanges WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(self.pool)
            .await?;
        Ok((rows, total))
    }

    /// Approves or rejects a return; an approved return refunds and restocks the order.
    pub async fn resolve_return(&self, id: Uuid, approved: bool, admin_note: Option<&str>, now: DateTime<Utc>) -> Result<(AppliedAction, OrderReturn), RequestError> {
        let mut tx = self.pool.begin().await?;
        let mut request = sqlx::query_as::<_, OrderReturn>(&format!(
            "SELECT {RETURN_COLUMNS} FROM order_returns WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        request.status = returns::resolve(request.status, approved)?;
        request.admin_note = admin_note.map(str::to_string);
        request.updated_at = now;
        let applied = OrderRepository::apply_locked(&mut tx, request.order_id, None, OrderAction::ResolveReturn { approved }, now).await?;

        sqlx::query("UPDATE order_returns SET status = $2, admin_note = $3, updated_at = $4 WHERE id = $1")
            .bind(request.id)
            .bind(request.status.as_str())
            .bind(request.admin_note.as_deref())
            .bind(request.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((applied, request))
    }

    pub async fn resolve_exchange(&self, id: Uuid, approved: bool, admin_note: Option<&str>, now: DateTime<Utc>) -> Result<(AppliedAction, OrderExchange), RequestError> {
        let mut tx = self.pool.begin().await?;
        let mut request = sqlx::query_as::<_, OrderExchange>(&format!(
            "SELECT {EXCHANGE_COLUMNS} FROM order_exchanges WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RepositoryError::NotFound)?;

        request.status = returns::resolve(request.status, approved)?;
        request.admin_note = admin_note.map(str::to_string);
        request.updated_at = now;
        let applied = OrderRepository::apply_locked(&mut tx, request.order_id, None, OrderAction::ResolveExchange { approved }, now).await?;

        sqlx::query("UPDATE order_exchanges SET status = $2, admin_note = $3, updated_at = $4 WHERE id = $1")
            .bind(request.id)
            .bind(request.status.as_str())
            .bind(request.admin_note.as_deref())
            .bind(request.updated_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok((applied, request))
    }
}

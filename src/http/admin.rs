//! Back-office handlers. Every route requires `role = admin`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::account::OrderDetail;
use crate::auth::AdminUser;
use crate::db::catalog::CatalogFilter;
use crate::db::orders::OrderFilter;
use crate::db::submissions::Listing;
use crate::db::{CatalogRepository, OrderRepository, PageParams, Paginated, ReturnRepository, SubmissionRepository};
use crate::domain::aggregates::{
    CatalogProduct, CatalogProductInput, Order, OrderAction, OrderExchange, OrderReturn, ProductDetails, RequestStatus,
    SubmissionStatus, SubmittedProduct,
};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Product edit body. Absolute stock is refused so an edit based on a stale
/// read can't bring back units that checkouts have already taken.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    #[serde(flatten)]
    pub details: ProductDetails,
    #[serde(default)]
    pub stock: Option<i32>,
}

impl UpdateProductRequest {
    fn into_details(self) -> Result<ProductDetails> {
        if self.stock.is_some() {
            return Err(AppError::BadRequest("stock changes go through the stock adjustment endpoint".to_string()));
        }
        self.details.validate()?;
        Ok(self.details)
    }
}

#[derive(Debug, Deserialize)]
pub struct StockAdjustment {
    pub delta: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct Approval {
    pub submission: SubmittedProduct,
    pub product: CatalogProduct,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery<T> {
    pub status: Option<T>,
}

/// Body for `POST /orders/:id/:action`; which fields matter depends on the action.
#[derive(Debug, Default, Deserialize)]
pub struct OrderActionRequest {
    pub carrier: Option<String>,
    pub tracking_number: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub approved: bool,
    pub admin_note: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Maps a path segment to the order action admins may trigger.
pub(crate) fn admin_action(name: &str, body: OrderActionRequest) -> Option<OrderAction> {
    let action = match name {
        "ship" => OrderAction::Ship { carrier: non_empty(body.carrier), tracking_number: non_empty(body.tracking_number) },
        "out_for_delivery" | "out-for-delivery" => OrderAction::OutForDelivery,
        "deliver" => OrderAction::Deliver,
        "cancel" => OrderAction::Cancel { reason: non_empty(body.reason).or_else(|| Some("Cancelled by store".to_string())) },
        _ => return None,
    };
    Some(action)
}

#[instrument(skip(state, _admin))]
pub async fn list_products(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(mut filter): Query<CatalogFilter>,
    Query(page): Query<PageParams>,
) -> Result<Json<Paginated<CatalogProduct>>> {
    filter.include_inactive = true;
    let (products, total) = CatalogRepository::new(state.pool()).list(&filter, &page).await?;
    Ok(Json(Paginated::new(products, total, &page)))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn create_product(
    State(state): State<AppState>,
    admin: AdminUser,
    Json(body): Json<CatalogProductInput>,
) -> Result<(StatusCode, Json<CatalogProduct>)> {
    body.validate()?;
    let product = CatalogRepository::new(state.pool()).create(&body, &state.config().currency, None).await?;
    info!(product_id = %product.id, slug = %product.slug, "Product created");
    Ok((StatusCode::CREATED, Json(product)))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn update_product(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateProductRequest>,
) -> Result<Json<CatalogProduct>> {
    let details = body.into_details()?;
    Ok(Json(CatalogRepository::new(state.pool()).update(id, &details).await?))
}

/// Soft delete: the product disappears from the shop but old orders keep pointing at it.
#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn deactivate_product(State(state): State<AppState>, admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    CatalogRepository::new(state.pool()).set_active(id, false).await?;
    info!(product_id = %id, "Product deactivated");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn activate_product(State(state): State<AppState>, admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    CatalogRepository::new(state.pool()).set_active(id, true).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, admin), fields(admin_id = %admin.0.id))]
pub async fn adjust_stock(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<StockAdjustment>,
) -> Result<Json<CatalogProduct>> {
    Ok(Json(CatalogRepository::new(state.pool()).adjust_stock(id, body.delta).await?))
}

#[instrument(skip(state, _admin))]
pub async fn list_submissions(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<StatusQuery<SubmissionStatus>>,
    Query(page): Query<PageParams>,
) -> Result<Json<Paginated<SubmittedProduct>>> {
    let (rows, total) = SubmissionRepository::new(state.pool()).list(query.status, &page).await?;
    Ok(Json(Paginated::new(rows, total, &page)))
}

/// Publishes a submission under review as a catalog product.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn approve_submission(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    body: Option<Json<ApproveRequest>>,
) -> Result<(StatusCode, Json<Approval>)> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    if body.stock < 0 {
        return Err(AppError::BadRequest("stock cannot be negative".to_string()));
    }
    let listing = Listing { stock: body.stock, sizes: body.sizes, colors: body.colors, currency: state.config().currency.clone() };
    let (mut submission, product) = SubmissionRepository::new(state.pool()).approve(id, &listing, Utc::now()).await?;
    state.events().publish_all(submission.take_events()).await;
    info!(submission_id = %id, product_id = %product.id, "Submission approved");
    Ok((StatusCode::CREATED, Json(Approval { submission, product })))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn reject_submission(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<SubmittedProduct>> {
    let now = Utc::now();
    let mut submission = SubmissionRepository::new(state.pool()).modify(id, None, |s| s.reject(&body.reason, now)).await?;
    state.events().publish_all(submission.take_events()).await;
    info!(submission_id = %id, "Submission rejected");
    Ok(Json(submission))
}

#[instrument(skip(state, _admin))]
pub async fn list_orders(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(filter): Query<OrderFilter>,
    Query(page): Query<PageParams>,
) -> Result<Json<Paginated<Order>>> {
    let (orders, total) = OrderRepository::new(state.pool()).list(&filter, &page).await?;
    Ok(Json(Paginated::new(orders, total, &page)))
}

#[instrument(skip(state, _admin))]
pub async fn order_detail(State(state): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>> {
    let order = OrderRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("order".to_string()))?;
    Ok(Json(OrderDetail::load(&state, order).await?))
}

/// `ship`, `out_for_delivery`, `deliver` or `cancel`.
#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn order_action(
    State(state): State<AppState>,
    admin: AdminUser,
    Path((id, action)): Path<(Uuid, String)>,
    body: Option<Json<OrderActionRequest>>,
) -> Result<Json<Order>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let action = admin_action(&action, body).ok_or_else(|| AppError::NotFound(format!("order action {action}")))?;
    let name = action.name();
    let mut applied = OrderRepository::new(state.pool()).apply(id, None, action, Utc::now()).await?;
    state.events().publish_all(applied.order.take_events()).await;
    info!(order_id = %id, action = name, order_status = %applied.order.order_status(), "Order updated");
    Ok(Json(applied.order))
}

#[instrument(skip(state, _admin))]
pub async fn list_returns(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<StatusQuery<RequestStatus>>,
    Query(page): Query<PageParams>,
) -> Result<Json<Paginated<OrderReturn>>> {
    let (rows, total) = ReturnRepository::new(state.pool()).list_returns(query.status, &page).await?;
    Ok(Json(Paginated::new(rows, total, &page)))
}

#[instrument(skip(state, _admin))]
pub async fn list_exchanges(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(query): Query<StatusQuery<RequestStatus>>,
    Query(page): Query<PageParams>,
) -> Result<Json<Paginated<OrderExchange>>> {
    let (rows, total) = ReturnRepository::new(state.pool()).list_exchanges(query.status, &page).await?;
    Ok(Json(Paginated::new(rows, total, &page)))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn resolve_return(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<OrderReturn>> {
    let note = non_empty(body.admin_note);
    let (mut applied, request) =
        ReturnRepository::new(state.pool()).resolve_return(id, body.approved, note.as_deref(), Utc::now()).await?;
    state.events().publish_all(applied.order.take_events()).await;
    info!(return_id = %id, approved = body.approved, "Return resolved");
    Ok(Json(request))
}

#[instrument(skip(state, admin, body), fields(admin_id = %admin.0.id))]
pub async fn resolve_exchange(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<OrderExchange>> {
    let note = non_empty(body.admin_note);
    let (mut applied, request) =
        ReturnRepository::new(state.pool()).resolve_exchange(id, body.approved, note.as_deref(), Utc::now()).await?;
    state.events().publish_all(applied.order.take_events()).await;
    info!(exchange_id = %id, approved = body.approved, "Exchange resolved");
    Ok(Json(request))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_actions() {
        let body = OrderActionRequest { carrier: Some(" Delhivery ".into()), tracking_number: Some("".into()), reason: None };
        assert_eq!(
            admin_action("ship", body),
            Some(OrderAction::Ship { carrier: Some("Delhivery".into()), tracking_number: None })
        );
        assert_eq!(admin_action("out-for-delivery", OrderActionRequest::default()), Some(OrderAction::OutForDelivery));
        assert_eq!(
            admin_action("cancel", OrderActionRequest::default()),
            Some(OrderAction::Cancel { reason: Some("Cancelled by store".into()) })
        );
        assert_eq!(admin_action("mark_paid", OrderActionRequest::default()), None);
        assert_eq!(admin_action("request_return", OrderActionRequest::default()), None);
    }

    #[test]
    fn test_product_edit_refuses_absolute_stock() {
        let edit = serde_json::json!({"name": "Linen Kurta", "category": "kurtas", "price": "1299"});
        let body: UpdateProductRequest = serde_json::from_value(edit.clone()).unwrap();
        assert_eq!(body.into_details().unwrap().name, "Linen Kurta");

        let mut with_stock = edit;
        with_stock["stock"] = serde_json::json!(5);
        let body: UpdateProductRequest = serde_json::from_value(with_stock).unwrap();
        assert!(matches!(body.into_details(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_status_query_parses_text_enums() {
        let query: StatusQuery<RequestStatus> = serde_json::from_str(r#"{"status":"approved"}"#).unwrap();
        assert_eq!(query.status, Some(RequestStatus::Approved));
        let query: StatusQuery<SubmissionStatus> = serde_json::from_str("{}").unwrap();
        assert_eq!(query.status, None);
    }
}

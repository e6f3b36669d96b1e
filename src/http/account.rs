//! Account route handlers: profile, order history and post-purchase requests.
//!
//! These routes require authentication.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::db::orders::TrackingEntry;
use crate::db::{OrderRepository, PageParams, Paginated, ProfileRepository, ReturnRepository};
use crate::domain::aggregates::order::OrderEligibility;
use crate::domain::aggregates::returns::{ExchangeInput, ReturnInput};
use crate::domain::aggregates::{Order, OrderAction, OrderExchange, OrderItem, OrderReturn, Profile, ProfileUpdate};
use crate::error::{AppError, Result};
use crate::state::AppState;

/// Everything the order page shows.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub tracking: Vec<TrackingEntry>,
    pub eligibility: OrderEligibility,
    pub returns: Vec<OrderReturn>,
    pub exchanges: Vec<OrderExchange>,
}

impl OrderDetail {
    pub(crate) async fn load(state: &AppState, order: Order) -> Result<Self> {
        let orders = OrderRepository::new(state.pool());
        let requests = ReturnRepository::new(state.pool());
        let id = order.id();
        Ok(Self {
            eligibility: order.eligibility(Utc::now()),
            items: orders.items(id).await?,
            tracking: orders.tracking(id).await?,
            returns: requests.returns_for_order(id).await?,
            exchanges: requests.exchanges_for_order(id).await?,
            order,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn profile(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Profile>> {
    ProfileRepository::new(state.pool())
        .get(user.id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("profile".to_string()))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<ProfileUpdate>,
) -> Result<Json<Profile>> {
    body.validate()?;
    Ok(Json(ProfileRepository::new(state.pool()).update(user.id, &body).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn orders(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(page): Query<PageParams>,
) -> Result<Json<Paginated<Order>>> {
    let (orders, total) = OrderRepository::new(state.pool()).list_for_user(user.id, &page).await?;
    Ok(Json(Paginated::new(orders, total, &page)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn order_detail(State(state): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<OrderDetail>> {
    let order = OrderRepository::new(state.pool())
        .get_for_user(id, user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("order".to_string()))?;
    Ok(Json(OrderDetail::load(&state, order).await?))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn cancel_order(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<Order>> {
    let reason = body.and_then(|Json(b)| b.reason).map(|r| r.trim().to_string()).filter(|r| !r.is_empty());
    let action = OrderAction::Cancel { reason: Some(reason.unwrap_or_else(|| "Cancelled by customer".to_string())) };
    let mut applied = OrderRepository::new(state.pool()).apply(id, Some(user.id), action, Utc::now()).await?;
    state.events().publish_all(applied.order.take_events()).await;
    info!(order_id = %id, "Order cancelled by customer");
    Ok(Json(applied.order))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn request_return(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ReturnInput>,
) -> Result<(StatusCode, Json<OrderReturn>)> {
    body.validate()?;
    let (mut applied, request) = ReturnRepository::new(state.pool()).open_return(id, user.id, body, Utc::now()).await?;
    state.events().publish_all(applied.order.take_events()).await;
    info!(order_id = %id, return_id = %request.id, "Return requested");
    Ok((StatusCode::CREATED, Json(request)))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn request_exchange(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ExchangeInput>,
) -> Result<(StatusCode, Json<OrderExchange>)> {
    body.validate()?;
    let (mut applied, request) = ReturnRepository::new(state.pool()).open_exchange(id, user.id, body, Utc::now()).await?;
    state.events().publish_all(applied.order.take_events()).await;
    info!(order_id = %id, exchange_id = %request.id, "Exchange requested");
    Ok((StatusCode::CREATED, Json(request)))
}

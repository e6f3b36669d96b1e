//! Cart and wishlist handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::db::{CartRepository, CatalogRepository};
use crate::domain::aggregates::{Cart, CartError, CatalogProduct, ProductError, WishlistItem};
use crate::domain::value_objects::Quantity;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[serde(default = "one")]
    pub quantity: u32,
    pub size: Option<String>,
    pub color: Option<String>,
}

fn one() -> u32 { 1 }

#[derive(Debug, Deserialize)]
pub struct SetQuantityRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct WishlistRequest {
    pub product_id: Uuid,
}

/// Move-to-cart body; the options are needed when the product defines them.
#[derive(Debug, Default, Deserialize)]
pub struct MoveToCartRequest {
    pub size: Option<String>,
    pub color: Option<String>,
}

pub(crate) async fn load_cart(state: &AppState, user_id: Uuid) -> Result<Cart> {
    let lines = CartRepository::new(state.pool()).lines(user_id).await?;
    let config = state.config();
    Ok(Cart::new(user_id, lines, &config.currency, &config.shipping))
}

/// Spelling of `pick` as the product lists it (`"m"` becomes `"M"`).
fn canonical_option(options: &[String], pick: Option<&str>) -> Option<String> {
    let pick = pick.map(str::trim).filter(|p| !p.is_empty())?;
    Some(options.iter().find(|o| o.eq_ignore_ascii_case(pick)).cloned().unwrap_or_else(|| pick.to_string()))
}

/// Checks availability and options, then adds the line.
async fn add_line(
    state: &AppState,
    user_id: Uuid,
    product: &CatalogProduct,
    quantity: Quantity,
    size: Option<&str>,
    color: Option<&str>,
) -> Result<Uuid> {
    let size = canonical_option(&product.sizes, size);
    let color = canonical_option(&product.colors, color);
    product.check_options(size.as_deref(), color.as_deref()).map_err(CartError::from)?;
    product.ensure_purchasable(quantity).map_err(CartError::from)?;
    Ok(CartRepository::new(state.pool()).add(user_id, product.id, quantity, size.as_deref(), color.as_deref()).await?)
}

async fn active_product(state: &AppState, id: Uuid) -> Result<CatalogProduct> {
    CatalogRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|p| p.is_active)
        .ok_or_else(|| AppError::NotFound("product".to_string()))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Cart>> {
    Ok(Json(load_cart(&state, user.id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<AddToCartRequest>,
) -> Result<(StatusCode, Json<Cart>)> {
    let quantity = Quantity::new(body.quantity).map_err(CartError::from)?;
    let product = active_product(&state, body.product_id).await?;
    add_line(&state, user.id, &product, quantity, body.size.as_deref(), body.color.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(load_cart(&state, user.id).await?)))
}

/// Sets a line's quantity; zero removes the line.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn set_quantity(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(item_id): Path<Uuid>,
    Json(body): Json<SetQuantityRequest>,
) -> Result<Json<Cart>> {
    let carts = CartRepository::new(state.pool());
    if body.quantity == 0 {
        carts.remove(user.id, item_id).await.map_err(not_in_cart)?;
        return Ok(Json(load_cart(&state, user.id).await?));
    }

    let quantity = Quantity::new(body.quantity).map_err(CartError::from)?;
    let lines = carts.lines(user.id).await?;
    let line = lines.iter().find(|l| l.id == item_id).ok_or(CartError::ItemNotFound)?;
    if i64::from(line.stock) < i64::from(quantity.value()) {
        return Err(CartError::from(ProductError::InsufficientStock { name: line.name.clone(), available: line.stock.max(0) }).into());
    }
    carts.set_quantity(user.id, item_id, quantity).await.map_err(not_in_cart)?;
    Ok(Json(load_cart(&state, user.id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(State(state): State<AppState>, user: CurrentUser, Path(item_id): Path<Uuid>) -> Result<Json<Cart>> {
    CartRepository::new(state.pool()).remove(user.id, item_id).await.map_err(not_in_cart)?;
    Ok(Json(load_cart(&state, user.id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn clear(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Value>> {
    let removed = CartRepository::new(state.pool()).clear(user.id).await?;
    Ok(Json(json!({ "removed": removed })))
}

fn not_in_cart(e: crate::db::RepositoryError) -> AppError {
    match e {
        crate::db::RepositoryError::NotFound => CartError::ItemNotFound.into(),
        other => other.into(),
    }
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn wishlist(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<WishlistItem>>> {
    Ok(Json(CartRepository::new(state.pool()).wishlist(user.id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add_to_wishlist(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<WishlistRequest>,
) -> Result<(StatusCode, Json<Vec<WishlistItem>>)> {
    active_product(&state, body.product_id).await?;
    let carts = CartRepository::new(state.pool());
    carts.add_to_wishlist(user.id, body.product_id).await?;
    Ok((StatusCode::CREATED, Json(carts.wishlist(user.id).await?)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<StatusCode> {
    CartRepository::new(state.pool()).remove_from_wishlist(user.id, product_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Adds one unit to the cart and drops the product from the wishlist.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn move_to_cart(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(product_id): Path<Uuid>,
    body: Option<Json<MoveToCartRequest>>,
) -> Result<Json<Cart>> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let product = active_product(&state, product_id).await?;
    let quantity = Quantity::new(1).map_err(CartError::from)?;
    add_line(&state, user.id, &product, quantity, body.size.as_deref(), body.color.as_deref()).await?;

    match CartRepository::new(state.pool()).remove_from_wishlist(user.id, product_id).await {
        Ok(()) | Err(crate::db::RepositoryError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }
    info!(%product_id, "Moved wishlist item to cart");
    Ok(Json(load_cart(&state, user.id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_option() {
        let sizes = vec!["S".to_string(), "M".to_string()];
        assert_eq!(canonical_option(&sizes, Some(" m ")).as_deref(), Some("M"));
        assert_eq!(canonical_option(&sizes, Some("XL")).as_deref(), Some("XL"));
        assert_eq!(canonical_option(&sizes, Some("")), None);
        assert_eq!(canonical_option(&sizes, None), None);
    }

    #[test]
    fn test_add_request_defaults_to_one() {
        let body: AddToCartRequest =
            serde_json::from_str(r#"{"product_id":"6f1c2d4e-0000-4000-8000-000000000001"}"#).unwrap();
        assert_eq!(body.quantity, 1);
        assert!(body.size.is_none());
    }
}

//! Public catalog browsing.

use axum::extract::{Path, Query, State};
use axum::Json;
use tracing::instrument;
use uuid::Uuid;

use crate::db::catalog::CatalogFilter;
use crate::db::{CatalogRepository, PageParams, Paginated};
use crate::domain::aggregates::CatalogProduct;
use crate::error::{AppError, Result};
use crate::state::AppState;

#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(filter): Query<CatalogFilter>,
    Query(page): Query<PageParams>,
) -> Result<Json<Paginated<CatalogProduct>>> {
    let (products, total) = CatalogRepository::new(state.pool()).list(&filter, &page).await?;
    Ok(Json(Paginated::new(products, total, &page)))
}

#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<CatalogProduct>> {
    CatalogRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|p| p.is_active)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("product".to_string()))
}

#[instrument(skip(state))]
pub async fn show_by_slug(State(state): State<AppState>, Path(slug): Path<String>) -> Result<Json<CatalogProduct>> {
    CatalogRepository::new(state.pool())
        .get_by_slug(&slug)
        .await?
        .filter(|p| p.is_active)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("product".to_string()))
}

#[instrument(skip(state))]
pub async fn categories(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(CatalogRepository::new(state.pool()).categories().await?))
}

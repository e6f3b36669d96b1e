//! Customer product submissions and the designs applied to them.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::CurrentUser;
use crate::db::{DesignRepository, SubmissionRepository};
use crate::domain::aggregates::submission::SubmissionInput;
use crate::domain::aggregates::{Design, DesignKind, DesignPayload, SubmittedProduct};
use crate::error::{AppError, Result};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ApplyDesignRequest {
    pub design_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CreateDesignRequest {
    pub name: String,
    pub payload: DesignPayload,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDesignRequest {
    pub name: Option<String>,
    pub payload: Option<DesignPayload>,
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<SubmissionInput>,
) -> Result<(StatusCode, Json<SubmittedProduct>)> {
    body.validate()?;
    let mut submission = SubmittedProduct::submit(user.id, body, Utc::now());
    SubmissionRepository::new(state.pool()).create(&submission).await?;
    state.events().publish_all(submission.take_events()).await;
    info!(submission_id = %submission.id(), "Product submitted");
    Ok((StatusCode::CREATED, Json(submission)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<SubmittedProduct>>> {
    Ok(Json(SubmissionRepository::new(state.pool()).list_for_user(user.id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(State(state): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<SubmittedProduct>> {
    SubmissionRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|s| s.user_id() == user.id || user.is_admin())
        .map(Json)
        .ok_or_else(|| AppError::NotFound("submission".to_string()))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn apply_design(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ApplyDesignRequest>,
) -> Result<Json<SubmittedProduct>> {
    let mut submission =
        SubmissionRepository::new(state.pool()).apply_design(id, user.id, body.design_id, Utc::now()).await?;
    state.events().publish_all(submission.take_events()).await;
    Ok(Json(submission))
}

/// Sends a designed submission to the admin review queue.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn submit(State(state): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<SubmittedProduct>> {
    let now = Utc::now();
    let mut submission = SubmissionRepository::new(state.pool())
        .modify(id, Some(user.id), |s| s.send_for_review(now))
        .await?;
    state.events().publish_all(submission.take_events()).await;
    info!(submission_id = %id, "Submission sent for review");
    Ok(Json(submission))
}

#[instrument(skip(state))]
pub async fn templates(State(state): State<AppState>) -> Result<Json<Vec<Design>>> {
    Ok(Json(DesignRepository::new(state.pool()).templates().await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn designs(State(state): State<AppState>, user: CurrentUser) -> Result<Json<Vec<Design>>> {
    Ok(Json(DesignRepository::new(state.pool()).list_for_user(user.id).await?))
}

/// Templates are readable by anyone signed in; custom designs only by their owner.
async fn visible_design(state: &AppState, user: &CurrentUser, id: Uuid) -> Result<Design> {
    DesignRepository::new(state.pool())
        .get(id)
        .await?
        .filter(|d| d.kind == DesignKind::Template || d.is_owned_by(user.id))
        .ok_or_else(|| AppError::NotFound("design".to_string()))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn design(State(state): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<Json<Design>> {
    Ok(Json(visible_design(&state, &user, id).await?))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create_design(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<CreateDesignRequest>,
) -> Result<(StatusCode, Json<Design>)> {
    let design = Design::custom(user.id, &body.name, body.payload, Utc::now())?;
    DesignRepository::new(state.pool()).create(&design).await?;
    Ok((StatusCode::CREATED, Json(design)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn clone_template(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<Design>)> {
    let designs = DesignRepository::new(state.pool());
    let template = designs
        .get(id)
        .await?
        .filter(|d| d.kind == DesignKind::Template)
        .ok_or_else(|| AppError::NotFound("template".to_string()))?;
    let design = Design::from_template(&template, user.id, Utc::now());
    designs.create(&design).await?;
    Ok((StatusCode::CREATED, Json(design)))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn update_design(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateDesignRequest>,
) -> Result<Json<Design>> {
    let mut design = visible_design(&state, &user, id).await?;
    design.update(body.name.as_deref(), body.payload, Utc::now())?;
    DesignRepository::new(state.pool()).save(&design).await?;
    Ok(Json(design))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_design(State(state): State<AppState>, user: CurrentUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    let design = visible_design(&state, &user, id).await?;
    design.ensure_deletable()?;
    DesignRepository::new(state.pool()).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Image upload endpoint.

use axum::extract::multipart::Field;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{info, instrument};

use crate::auth::CurrentUser;
use crate::error::Result;
use crate::state::AppState;
use crate::storage::{object_key, ImageKind, StorageError};

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
    pub key: String,
    pub size: usize,
}

/// Reads a field chunk by chunk, giving up as soon as it exceeds `limit`.
async fn read_limited(field: &mut Field<'_>, limit: usize) -> std::result::Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(|e| StorageError::Multipart(e.to_string()))? {
        if bytes.len() + chunk.len() > limit {
            return Err(StorageError::TooLarge { limit });
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Accepts one `file` field (jpeg, png, webp or gif) and returns its public URL.
#[instrument(skip(state, user, multipart), fields(user_id = %user.id))]
pub async fn upload(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let limit = state.config().storage.max_upload_bytes;

    while let Some(mut field) = multipart.next_field().await.map_err(|e| StorageError::Multipart(e.to_string()))? {
        if field.name() != Some("file") {
            continue;
        }
        let kind = ImageKind::from_content_type(field.content_type().unwrap_or_default())?;
        let bytes = read_limited(&mut field, limit).await?;
        if bytes.is_empty() {
            return Err(StorageError::MissingFile.into());
        }
        if !kind.matches(&bytes) {
            return Err(StorageError::UnsupportedType(format!("content is not {}", kind.content_type())).into());
        }

        let key = object_key(user.id, kind);
        let size = bytes.len();
        let url = state.storage().put(&key, kind, bytes).await?;
        info!(%key, size, "Image uploaded");
        return Ok((StatusCode::CREATED, Json(UploadResponse { url, key, size })));
    }

    Err(StorageError::MissingFile.into())
}

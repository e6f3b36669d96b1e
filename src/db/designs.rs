//! Design repository.

use sqlx::types::Json;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::RepositoryError;
use crate::domain::aggregates::Design;

const COLUMNS: &str = "id, user_id, name, kind, payload, product_id, preview_url, created_at, updated_at";

pub struct DesignRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DesignRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn templates(&self) -> Result<Vec<Design>, RepositoryError> {
        let designs = sqlx::query_as::<_, Design>(&format!("SELECT {COLUMNS} FROM designs WHERE kind = 'template' ORDER BY name"))
            .fetch_all(self.pool)
            .await?;
        Ok(designs)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Design>, RepositoryError> {
        let designs = sqlx::query_as::<_, Design>(&format!(
            "SELECT {COLUMNS} FROM designs WHERE user_id = $1 ORDER BY updated_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(designs)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Design>, RepositoryError> {
        let design = sqlx::query_as::<_, Design>(&format!("SELECT {COLUMNS} FROM designs WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(design)
    }

    pub async fn create(&self, design: &Design) -> Result<(), RepositoryError> {
        sqlx::query(&format!("INSERT INTO designs ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"))
            .bind(design.id)
            .bind(design.user_id)
            .bind(&design.name)
            .bind(design.kind.as_str())
            .bind(Json(&design.payload.0))
            .bind(design.product_id)
            .bind(design.preview_url.as_deref())
            .bind(design.created_at)
            .bind(design.updated_at)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Saves edits to an unlinked design.
    pub async fn save(&self, design: &Design) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE designs SET name = $2, payload = $3, preview_url = $4, updated_at = $5 WHERE id = $1 AND product_id IS NULL",
        )
            .bind(design.id)
            .bind(&design.name)
            .bind(Json(&design.payload.0))
            .bind(design.preview_url.as_deref())
            .bind(design.updated_at)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 { return Err(RepositoryError::Conflict("design is linked to a product".to_string())); }
        Ok(())
    }

    /// Locks one of `user_id`'s designs for a link change.
    pub(crate) async fn lock_owned(conn: &mut PgConnection, id: Uuid, user_id: Uuid) -> Result<Design, RepositoryError> {
        sqlx::query_as::<_, Design>(&format!("SELECT {COLUMNS} FROM designs WHERE id = $1 AND user_id = $2 FOR UPDATE"))
            .bind(id)
            .bind(user_id)
            .fetch_optional(conn)
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    pub(crate) async fn link(conn: &mut PgConnection, design: &Design, submission_id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE designs SET product_id = $2, updated_at = $3
              WHERE id = $1 AND (product_id IS NULL OR product_id = $2)",
        )
        .bind(design.id)
        .bind(submission_id)
        .bind(design.updated_at)
        .execute(conn)
        .await?;
        if result.rows_affected() == 0 { return Err(RepositoryError::Conflict("design is linked to a product".to_string())); }
        Ok(())
    }

    /// Releases a design that `submission_id` no longer uses.
    pub(crate) async fn unlink(conn: &mut PgConnection, id: Uuid, submission_id: Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE designs SET product_id = NULL, updated_at = $3 WHERE id = $1 AND product_id = $2")
            .bind(id)
            .bind(submission_id)
            .bind(now)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Deletes an unlinked custom design.
    pub async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM designs WHERE id = $1 AND kind = 'custom' AND product_id IS NULL")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 { return Err(RepositoryError::NotFound); }
        Ok(())
    }
}

//! Submitted product repository.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::catalog::CatalogRepository;
use super::designs::DesignRepository;
use super::{PageParams, RepositoryError};
use crate::domain::aggregates::{CatalogProduct, DesignError, SubmissionError, SubmissionStatus, SubmittedProduct};

const COLUMNS: &str = "id, user_id, name, description, category, base_price, images, status, design_id, \
                       rejection_reason, catalog_product_id, created_at, updated_at";

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Design(#[from] DesignError),
}

impl From<sqlx::Error> for ReviewError {
    fn from(e: sqlx::Error) -> Self { Self::Repository(e.into()) }
}

/// Options an admin picks when approving a submission into the catalog.
#[derive(Debug, Clone)]
pub struct Listing {
    pub stock: i32,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub currency: String,
}

pub struct SubmissionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SubmissionRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, submission: &SubmittedProduct) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO submitted_products ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(submission.id())
        .bind(submission.user_id())
        .bind(submission.name())
        .bind(submission.description())
        .bind(submission.category())
        .bind(submission.base_price())
        .bind(submission.images())
        .bind(submission.status().as_str())
        .bind(submission.design_id())
        .bind(submission.rejection_reason())
        .bind(submission.catalog_product_id())
        .bind(submission.created_at())
        .bind(submission.updated_at())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<SubmittedProduct>, RepositoryError> {
        let submission = sqlx::query_as::<_, SubmittedProduct>(&format!("SELECT {COLUMNS} FROM submitted_products WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(submission)
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<SubmittedProduct>, RepositoryError> {
        let rows = sqlx::query_as::<_, SubmittedProduct>(&format!(
            "SELECT {COLUMNS} FROM submitted_products WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    /// Admin review queue. Defaults to submissions awaiting review.
    pub async fn list(&self, status: Option<SubmissionStatus>, page: &PageParams) -> Result<(Vec<SubmittedProduct>, i64), RepositoryError> {
        let status = status.unwrap_or(SubmissionStatus::UnderReview);
        let rows = sqlx::query_as::<_, SubmittedProduct>(&format!(
            "SELECT {COLUMNS} FROM submitted_products WHERE status = $1 ORDER BY updated_at LIMIT $2 OFFSET $3"
        ))
        .bind(status.as_str())
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM submitted_products WHERE status = $1")
            .bind(status.as_str())
            .fetch_one(self.pool)
            .await?;
        Ok((rows, total))
    }

    /// Locks the submission, runs `change` on it and saves the result.
    /// With `owner` set, other users' submissions are reported as not found.
    pub async fn modify<F>(&self, id: Uuid, owner: Option<Uuid>, change: F) -> Result<SubmittedProduct, ReviewError>
    where
        F: FnOnce(&mut SubmittedProduct) -> Result<(), SubmissionError>,
    {
        let mut tx = self.pool.begin().await?;
        let mut submission = Self::lock(&mut tx, id, owner).await?;
        change(&mut submission)?;
        Self::save(&mut tx, &submission).await?;
        tx.commit().await?;
        Ok(submission)
    }

    /// Attaches one of the owner's designs. A design it replaces is released
    /// so it can be edited or deleted again.
    pub async fn apply_design(&self, id: Uuid, user_id: Uuid, design_id: Uuid, now: DateTime<Utc>) -> Result<SubmittedProduct, ReviewError> {
        let mut tx = self.pool.begin().await?;
        let mut submission = Self::lock(&mut tx, id, Some(user_id)).await?;
        let replaced = submission.apply_design(design_id, now)?;

        let mut design = DesignRepository::lock_owned(&mut tx, design_id, user_id).await?;
        design.link_to(id, now)?;
        DesignRepository::link(&mut tx, &design, id).await?;
        if let Some(previous) = replaced {
            DesignRepository::unlink(&mut tx, previous, id, now).await?;
        }

        Self::save(&mut tx, &submission).await?;
        tx.commit().await?;
        Ok(submission)
    }

    /// Approves a submission under review, creating its catalog product in
    /// the same transaction.
    pub async fn approve(&self, id: Uuid, listing: &Listing, now: DateTime<Utc>) -> Result<(SubmittedProduct, CatalogProduct), ReviewError> {
        let mut tx = self.pool.begin().await?;
        let mut submission = Self::lock(&mut tx, id, None).await?;
        if submission.status() != SubmissionStatus::UnderReview {
            return Err(SubmissionError::IllegalTransition { action: "approve", status: submission.status() }.into());
        }
        let input = submission.catalog_input(listing.stock, listing.sizes.clone(), listing.colors.clone());
        let product = CatalogRepository::insert(&mut tx, &input, &listing.currency, Some(submission.id())).await?;
        submission.approve(product.id, now)?;
        Self::save(&mut tx, &submission).await?;
        tx.commit().await?;
        Ok((submission, product))
    }

    async fn lock(conn: &mut PgConnection, id: Uuid, owner: Option<Uuid>) -> Result<SubmittedProduct, RepositoryError> {
        sqlx::query_as::<_, SubmittedProduct>(&format!("SELECT {COLUMNS} FROM submitted_products WHERE id = $1 FOR UPDATE"))
            .bind(id)
            .fetch_optional(conn)
            .await?
            .filter(|s| owner.map_or(true, |user| s.user_id() == user))
            .ok_or(RepositoryError::NotFound)
    }

    async fn save(conn: &mut PgConnection, submission: &SubmittedProduct) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE submitted_products
                SET status = $2, design_id = $3, rejection_reason = $4, catalog_product_id = $5, updated_at = $6
              WHERE id = $1",
        )
        .bind(submission.id())
        .bind(submission.status().as_str())
        .bind(submission.design_id())
        .bind(submission.rejection_reason())
        .bind(submission.catalog_product_id())
        .bind(submission.updated_at())
        .execute(conn)
        .await?;
        Ok(())
    }
}

//! Profile repository.

use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use super::RepositoryError;
use crate::domain::aggregates::{Profile, ProfileUpdate};
use crate::domain::value_objects::Address;

const COLUMNS: &str = "id, email, full_name, phone, address, role, created_at, updated_at";

pub struct ProfileRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProfileRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Profile>, RepositoryError> {
        let profile = sqlx::query_as::<_, Profile>(&format!("SELECT {COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(profile)
    }

    /// Creates the profile on first sign-in. Later sign-ins refresh the email
    /// and fill a missing name but never touch the role.
    pub async fn upsert_from_identity(&self, id: Uuid, email: &str, full_name: Option<&str>) -> Result<Profile, RepositoryError> {
        let profile = sqlx::query_as::<_, Profile>(&format!(
            "INSERT INTO profiles (id, email, full_name, role, created_at, updated_at)
             VALUES ($1, $2, $3, 'customer', NOW(), NOW())
             ON CONFLICT (id) DO UPDATE
                SET email = EXCLUDED.email,
                    full_name = COALESCE(profiles.full_name, EXCLUDED.full_name),
                    updated_at = NOW()
             RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(email)
        .bind(full_name)
        .fetch_one(self.pool)
        .await?;
        Ok(profile)
    }

    pub async fn update(&self, id: Uuid, update: &ProfileUpdate) -> Result<Profile, RepositoryError> {
        sqlx::query_as::<_, Profile>(&format!(
            "UPDATE profiles
                SET full_name = COALESCE($2, full_name),
                    phone = COALESCE($3, phone),
                    address = COALESCE($4, address),
                    updated_at = NOW()
              WHERE id = $1
          RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(update.full_name.as_deref())
        .bind(update.phone.as_deref())
        .bind(update.address.clone().map(Json))
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    pub async fn save_address(&self, id: Uuid, address: &Address) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE profiles SET address = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(Json(address))
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 { return Err(RepositoryError::NotFound); }
        Ok(())
    }
}

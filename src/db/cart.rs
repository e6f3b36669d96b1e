//! Cart and wishlist repository.
//!
//! Size and color are stored as empty strings when absent so the
//! `(user, product, size, color)` uniqueness holds.

use sqlx::PgPool;
use uuid::Uuid;

use super::RepositoryError;
use crate::domain::aggregates::{CartLine, WishlistItem};
use crate::domain::value_objects::Quantity;

const CART_SELECT: &str = "SELECT ci.id, ci.product_id, p.name, p.slug, p.images[1] AS image,
                                  NULLIF(ci.size, '') AS size, NULLIF(ci.color, '') AS color,
                                  ci.quantity, p.price AS unit_price, p.stock, p.is_active,
                                  ci.created_at AS added_at
                             FROM cart_items ci
                             JOIN catalog_products p ON p.id = ci.product_id";

pub struct CartRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CartRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, RepositoryError> {
        let lines = sqlx::query_as::<_, CartLine>(&format!("{CART_SELECT} WHERE ci.user_id = $1 ORDER BY ci.created_at"))
            .bind(user_id)
            .fetch_all(self.pool)
            .await?;
        Ok(lines)
    }

    /// Adds to the matching line or creates it; merged quantities are capped
    /// at the per-line maximum.
    pub async fn add(&self, user_id: Uuid, product_id: Uuid, quantity: Quantity, size: Option<&str>, color: Option<&str>) -> Result<Uuid, RepositoryError> {
        let (id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO cart_items (id, user_id, product_id, quantity, size, color, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, NOW())
             ON CONFLICT (user_id, product_id, size, color)
             DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $7)
             RETURNING id",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(product_id)
        .bind(quantity_i32(quantity))
        .bind(size.unwrap_or_default())
        .bind(color.unwrap_or_default())
        .bind(i32::try_from(Quantity::MAX_PER_LINE).unwrap_or(i32::MAX))
        .fetch_one(self.pool)
        .await?;
        Ok(id)
    }

    pub async fn set_quantity(&self, user_id: Uuid, item_id: Uuid, quantity: Quantity) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .bind(quantity_i32(quantity))
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 { return Err(RepositoryError::NotFound); }
        Ok(())
    }

    pub async fn remove(&self, user_id: Uuid, item_id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 { return Err(RepositoryError::NotFound); }
        Ok(())
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>, RepositoryError> {
        let items = sqlx::query_as::<_, WishlistItem>(
            "SELECT w.id, w.product_id, p.name, p.slug, p.images[1] AS image, p.price,
                    (p.is_active AND p.stock > 0) AS in_stock, w.created_at AS added_at
               FROM wishlist_items w
               JOIN catalog_products p ON p.id = w.product_id
              WHERE w.user_id = $1
              ORDER BY w.created_at DESC",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(items)
    }

    /// Adding a product that is already on the wishlist is a no-op.
    pub async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO wishlist_items (id, user_id, product_id, created_at)
             VALUES ($1, $2, $3, NOW())
             ON CONFLICT (user_id, product_id) DO NOTHING",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(product_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 { return Err(RepositoryError::NotFound); }
        Ok(())
    }
}

fn quantity_i32(quantity: Quantity) -> i32 {
    i32::try_from(quantity.value()).unwrap_or(i32::MAX)
}

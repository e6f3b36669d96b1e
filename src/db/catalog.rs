//! Catalog product repository.

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{PageParams, RepositoryError};
use crate::domain::aggregates::product::{slugify, CatalogProduct, CatalogProductInput, ProductDetails};

const COLUMNS: &str = "id, name, slug, description, category, price, compare_at_price, currency, stock, \
                       images, sizes, colors, is_active, source_submission_id, created_at, updated_at";

const UPDATE_DETAILS: &str = "UPDATE catalog_products
    SET name = $2, description = $3, category = $4, price = $5, compare_at_price = $6,
        images = $7, sizes = $8, colors = $9, updated_at = NOW()
  WHERE id = $1";

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl CatalogSort {
    fn order_by(self) -> &'static str {
        match self {
            Self::Newest => "created_at DESC",
            Self::PriceAsc => "price ASC, created_at DESC",
            Self::PriceDesc => "price DESC, created_at DESC",
            Self::Name => "name ASC",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub size: Option<String>,
    pub color: Option<String>,
    #[serde(default)]
    pub sort: CatalogSort,
    /// Admin listings also show deactivated products.
    #[serde(skip)]
    pub include_inactive: bool,
}

impl CatalogFilter {
    fn push_conditions<'a>(&'a self, qb: &mut QueryBuilder<'a, Postgres>) {
        qb.push(" WHERE TRUE");
        if !self.include_inactive {
            qb.push(" AND is_active");
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.is_empty()) {
            qb.push(" AND category = ").push_bind(category);
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", escape_like(search));
            qb.push(" AND (name ILIKE ").push_bind(pattern.clone());
            qb.push(" OR description ILIKE ").push_bind(pattern).push(")");
        }
        if let Some(min) = self.min_price {
            qb.push(" AND price >= ").push_bind(min);
        }
        if let Some(max) = self.max_price {
            qb.push(" AND price <= ").push_bind(max);
        }
        if let Some(size) = self.size.as_deref().filter(|s| !s.is_empty()) {
            qb.push(" AND ").push_bind(size).push(" = ANY(sizes)");
        }
        if let Some(color) = self.color.as_deref().filter(|c| !c.is_empty()) {
            qb.push(" AND ").push_bind(color).push(" = ANY(colors)");
        }
    }
}

fn escape_like(input: &str) -> String {
    input.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

pub struct CatalogRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CatalogRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, filter: &CatalogFilter, page: &PageParams) -> Result<(Vec<CatalogProduct>, i64), RepositoryError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM catalog_products"));
        filter.push_conditions(&mut qb);
        qb.push(" ORDER BY ").push(filter.sort.order_by());
        qb.push(" LIMIT ").push_bind(page.limit());
        qb.push(" OFFSET ").push_bind(page.offset());
        let products = qb.build_query_as::<CatalogProduct>().fetch_all(self.pool).await?;

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM catalog_products");
        filter.push_conditions(&mut count);
        let (total,) = count.build_query_as::<(i64,)>().fetch_one(self.pool).await?;

        Ok((products, total))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CatalogProduct>, RepositoryError> {
        let product = sqlx::query_as::<_, CatalogProduct>(&format!("SELECT {COLUMNS} FROM catalog_products WHERE id = $1"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(product)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<CatalogProduct>, RepositoryError> {
        let product = sqlx::query_as::<_, CatalogProduct>(&format!(
            "SELECT {COLUMNS} FROM catalog_products WHERE slug = $1 AND is_active"
        ))
        .bind(slug)
        .fetch_optional(self.pool)
        .await?;
        Ok(product)
    }

    pub async fn categories(&self) -> Result<Vec<String>, RepositoryError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT DISTINCT category FROM catalog_products WHERE is_active ORDER BY category")
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Inserts a product. A clashing slug gets a short random suffix.
    pub async fn create(&self, input: &CatalogProductInput, currency: &str, source_submission_id: Option<Uuid>) -> Result<CatalogProduct, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        Self::insert(&mut conn, input, currency, source_submission_id).await
    }

    pub(crate) async fn insert(conn: &mut PgConnection, input: &CatalogProductInput, currency: &str, source_submission_id: Option<Uuid>) -> Result<CatalogProduct, RepositoryError> {
        let details = &input.details;
        let base = slugify(&details.name);
        let mut slug = base.clone();
        for _ in 0..3 {
            let result = sqlx::query_as::<_, CatalogProduct>(&format!(
                "INSERT INTO catalog_products
                    (id, name, slug, description, category, price, compare_at_price, currency, stock,
                     images, sizes, colors, is_active, source_submission_id, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, TRUE, $13, NOW(), NOW())
                 ON CONFLICT (slug) DO NOTHING
                 RETURNING {COLUMNS}"
            ))
            .bind(Uuid::now_v7())
            .bind(&details.name)
            .bind(&slug)
            .bind(&details.description)
            .bind(details.category.trim().to_lowercase())
            .bind(details.price)
            .bind(details.compare_at_price)
            .bind(currency)
            .bind(input.stock)
            .bind(&details.images)
            .bind(&details.sizes)
            .bind(&details.colors)
            .bind(source_submission_id)
            .fetch_optional(&mut *conn)
            .await?;
            if let Some(product) = result { return Ok(product); }
            slug = format!("{base}-{:06x}", rand::random::<u32>() & 0xff_ffff);
        }
        Err(RepositoryError::Conflict(format!("slug {base}")))
    }

    /// Rewrites the descriptive fields. Stock is left to [`Self::adjust_stock`].
    pub async fn update(&self, id: Uuid, details: &ProductDetails) -> Result<CatalogProduct, RepositoryError> {
        sqlx::query_as::<_, CatalogProduct>(&format!("{UPDATE_DETAILS} RETURNING {COLUMNS}"))
        .bind(id)
        .bind(&details.name)
        .bind(&details.description)
        .bind(details.category.trim().to_lowercase())
        .bind(details.price)
        .bind(details.compare_at_price)
        .bind(&details.images)
        .bind(&details.sizes)
        .bind(&details.colors)
        .fetch_optional(self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)
    }

    pub async fn set_active(&self, id: Uuid, active: bool) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE catalog_products SET is_active = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(active)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 { return Err(RepositoryError::NotFound); }
        Ok(())
    }

    /// Adds `delta` (possibly negative) to the stock, never going below zero.
    pub async fn adjust_stock(&self, id: Uuid, delta: i32) -> Result<CatalogProduct, RepositoryError> {
        sqlx::query_as::<_, CatalogProduct>(&format!(
            "UPDATE catalog_products SET stock = stock + $2, updated_at = NOW()
              WHERE id = $1 AND stock + $2 >= 0
          RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(delta)
        .fetch_optional(self.pool)
        .await?
        .ok_or_else(|| RepositoryError::Conflict("stock cannot go below zero".to_string()))
    }

    /// Takes `quantity` units out of stock. Returns `false` when not enough are left.
    pub(crate) async fn reserve_stock(conn: &mut PgConnection, id: Uuid, quantity: i32) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE catalog_products SET stock = stock - $2, updated_at = NOW()
              WHERE id = $1 AND is_active AND stock >= $2",
        )
        .bind(id)
        .bind(quantity)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub(crate) async fn release_stock(conn: &mut PgConnection, id: Uuid, quantity: i32) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE catalog_products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(quantity)
            .execute(conn)
            .await?;
        Ok(())
    }
}

//! Catalog Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::value_objects::Quantity;

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct CatalogProduct {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub category: String,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub currency: String,
    pub stock: i32,
    pub images: Vec<String>,
    pub sizes: Vec<String>,
    pub colors: Vec<String>,
    pub is_active: bool,
    pub source_submission_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CatalogProduct {
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }

    /// Checks a size/color pick against the options the product defines.
    /// Products without options accept no pick at all.
    pub fn check_options(&self, size: Option<&str>, color: Option<&str>) -> Result<(), ProductError> {
        check_option("size", &self.sizes, size)?;
        check_option("color", &self.colors, color)
    }

    pub fn ensure_purchasable(&self, quantity: Quantity) -> Result<(), ProductError> {
        if !self.is_active { return Err(ProductError::Unavailable(self.name.clone())); }
        if i64::from(self.stock) < i64::from(quantity.value()) {
            return Err(ProductError::InsufficientStock { name: self.name.clone(), available: self.stock.max(0) });
        }
        Ok(())
    }
}

fn check_option(kind: &'static str, options: &[String], pick: Option<&str>) -> Result<(), ProductError> {
    match pick {
        None if options.is_empty() => Ok(()),
        None => Err(ProductError::OptionRequired(kind)),
        Some(value) if options.iter().any(|o| o.eq_ignore_ascii_case(value)) => Ok(()),
        Some(value) => Err(ProductError::UnknownOption { kind, value: value.to_string() }),
    }
}

/// Lower-case, dash-separated slug built from the product name.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    slug.trim_end_matches('-').to_string()
}

/// Fields an admin edits on a catalog product. Stock is not among them: after
/// creation it only moves by relative adjustments, so an edit can't undo units
/// reserved by checkouts in the meantime.
#[derive(Clone, Debug, Deserialize, Validate)]
#[validate(schema(function = "validate_compare_at_price", skip_on_field_errors = true))]
pub struct ProductDetails {
    #[validate(length(min = 1, max = 160))]
    pub name: String,
    #[validate(length(max = 5000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 60))]
    pub category: String,
    #[validate(custom = "validate_price")]
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    #[validate(length(max = 12))]
    pub images: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
}

/// A new catalog product with its opening stock.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CatalogProductInput {
    #[serde(flatten)]
    #[validate]
    pub details: ProductDetails,
    #[validate(range(min = 0))]
    pub stock: i32,
}

pub fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_positive() && !price.is_zero() && price.scale() <= 2 {
        Ok(())
    } else {
        Err(ValidationError::new("price"))
    }
}

fn validate_compare_at_price(input: &ProductDetails) -> Result<(), ValidationError> {
    match input.compare_at_price {
        Some(compare) if compare <= input.price => Err(ValidationError::new("compare_at_price")),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProductError {
    #[error("{0} is no longer available")]
    Unavailable(String),
    #[error("only {available} left of {name}")]
    InsufficientStock { name: String, available: i32 },
    #[error("please choose a {0}")]
    OptionRequired(&'static str),
    #[error("{value} is not an available {kind}")]
    UnknownOption { kind: &'static str, value: String },
}

//! Cart and Wishlist

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::order::{OrderLine, ShippingPolicy};
use crate::domain::aggregates::product::ProductError;
use crate::domain::value_objects::{Money, Quantity, QuantityError};

/// A cart row joined with the catalog product it points at.
#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub stock: i32,
    pub is_active: bool,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn quantity(&self) -> Result<Quantity, QuantityError> {
        Quantity::new(u32::try_from(self.quantity).unwrap_or(0))
    }

    pub fn line_total(&self) -> Decimal { self.unit_price * Decimal::from(self.quantity.max(0)) }

    fn to_order_line(&self) -> Result<OrderLine, CartError> {
        let quantity = self.quantity()?;
        if !self.is_active { return Err(ProductError::Unavailable(self.name.clone()).into()); }
        if self.stock < self.quantity {
            return Err(ProductError::InsufficientStock { name: self.name.clone(), available: self.stock.max(0) }.into());
        }
        Ok(OrderLine {
            product_id: self.product_id, name: self.name.clone(), size: self.size.clone(),
            color: self.color.clone(), quantity, unit_price: self.unit_price,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Cart {
    user_id: Uuid,
    lines: Vec<CartLine>,
    subtotal: Money,
    shipping_fee: Money,
    total: Money,
    item_count: u32,
}

impl Cart {
    pub fn new(user_id: Uuid, lines: Vec<CartLine>, currency: &str, shipping: &ShippingPolicy) -> Self {
        let subtotal: Decimal = lines.iter().map(CartLine::line_total).sum();
        let shipping_fee = if lines.is_empty() { Decimal::ZERO } else { shipping.fee_for(subtotal) };
        let item_count = lines.iter().map(|l| u32::try_from(l.quantity).unwrap_or(0)).sum();
        Self {
            user_id, lines, subtotal: Money::new(subtotal, currency), shipping_fee: Money::new(shipping_fee, currency),
            total: Money::new(subtotal + shipping_fee, currency), item_count,
        }
    }

    pub fn user_id(&self) -> Uuid { self.user_id }
    pub fn lines(&self) -> &[CartLine] { &self.lines }
    pub fn subtotal(&self) -> &Money { &self.subtotal }
    pub fn shipping_fee(&self) -> &Money { &self.shipping_fee }
    pub fn total(&self) -> &Money { &self.total }
    pub fn item_count(&self) -> u32 { self.item_count }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    /// Turns the cart into priced order lines, refusing lines that can no
    /// longer be bought.
    pub fn checkout_lines(&self) -> Result<Vec<OrderLine>, CartError> {
        if self.is_empty() { return Err(CartError::Empty); }
        self.lines.iter().map(CartLine::to_order_line).collect()
    }
}

#[derive(Clone, Debug, Serialize, sqlx::FromRow)]
pub struct WishlistItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub slug: String,
    pub image: Option<String>,
    pub price: Decimal,
    pub in_stock: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CartError {
    #[error("your cart is empty")]
    Empty,
    #[error("cart item not found")]
    ItemNotFound,
    #[error(transparent)]
    Quantity(#[from] QuantityError),
    #[error(transparent)]
    Product(#[from] ProductError),
}

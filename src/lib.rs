//! Atelier storefront backend
//!
//! Online shop for a custom menswear brand.
//!
//! ## Features
//! - Product catalog with filtering, search and admin management
//! - Per-user cart and wishlist
//! - Checkout with cash on delivery or hosted card/UPI payment
//! - Order lifecycle driven by a single transition table, with tracking log,
//!   cancellations, returns and exchanges
//! - Customer product submissions, design editor payloads and admin moderation
//! - Image uploads to object storage
//! - Domain events published to NATS

pub mod auth;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod http;
pub mod messaging;
pub mod payments;
pub mod state;
pub mod storage;

pub use config::StorefrontConfig;
pub use error::{AppError, Result};
pub use state::AppState;

//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `PUBLIC_BASE_URL` - Public URL of the shop front (checkout redirects land here)
//! - `AUTH_BASE_URL` - Identity platform base URL
//! - `AUTH_ANON_KEY` - Identity platform public API key
//! - `PAYMENT_SECRET_KEY` - Payment platform secret API key
//! - `PAYMENT_WEBHOOK_SECRET` - Payment webhook signing secret
//!
//! ## Optional
//! - `HOST` / `PORT` - Bind address (default: 0.0.0.0:8083)
//! - `DATABASE_MAX_CONNECTIONS` - Pool size (default: 10)
//! - `CURRENCY` - Store currency (default: INR)
//! - `SHIPPING_FEE` / `FREE_SHIPPING_THRESHOLD` - Flat fee and waiver threshold (default: 99 / 999)
//! - `PAYMENT_API_BASE` - Payment API base URL (default: <https://api.stripe.com>)
//! - `STORAGE_BACKEND` - `platform` or `local` (default: platform)
//! - `STORAGE_BASE_URL`, `STORAGE_SERVICE_KEY`, `STORAGE_BUCKET` - Platform object storage
//! - `LOCAL_UPLOAD_DIR` - Directory for the local backend (default: ./uploads)
//! - `UPLOAD_MAX_BYTES` - Largest accepted upload (default: 5 MiB)
//! - `NATS_URL` - Publish domain events to NATS when set

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::SecretString;
use thiserror::Error;

use crate::domain::aggregates::ShippingPolicy;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` connection URL (contains password)
    pub database_url: SecretString,
    pub database_max_connections: u32,
    pub host: IpAddr,
    pub port: u16,
    /// Public URL of the shop front, without trailing slash
    pub public_base_url: String,
    pub currency: String,
    pub shipping: ShippingPolicy,
    pub auth: AuthConfig,
    pub payments: PaymentConfig,
    pub storage: StorageConfig,
    pub nats_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub base_url: String,
    pub anon_key: SecretString,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub api_base: String,
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone)]
pub enum StorageBackend {
    Platform { base_url: String, service_key: SecretString, bucket: String },
    Local { dir: PathBuf },
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let auth = AuthConfig {
            base_url: trim_slash(env.required("AUTH_BASE_URL")?),
            anon_key: env.required("AUTH_ANON_KEY")?.into(),
        };

        let backend = match env.or_default("STORAGE_BACKEND", "platform").as_str() {
            "platform" => StorageBackend::Platform {
                base_url: env.optional("STORAGE_BASE_URL").map_or_else(|| auth.base_url.clone(), trim_slash),
                service_key: env.required("STORAGE_SERVICE_KEY")?.into(),
                bucket: env.or_default("STORAGE_BUCKET", "product-images"),
            },
            "local" => StorageBackend::Local { dir: PathBuf::from(env.or_default("LOCAL_UPLOAD_DIR", "./uploads")) },
            other => return Err(ConfigError::InvalidEnvVar("STORAGE_BACKEND".to_string(), other.to_string())),
        };

        Ok(Self {
            database_url: env.required("DATABASE_URL")?.into(),
            database_max_connections: env.parsed("DATABASE_MAX_CONNECTIONS", "10")?,
            host: env.parsed("HOST", "0.0.0.0")?,
            port: env.parsed("PORT", "8083")?,
            public_base_url: trim_slash(env.required("PUBLIC_BASE_URL")?),
            currency: env.or_default("CURRENCY", "INR").to_uppercase(),
            shipping: ShippingPolicy {
                flat_fee: env.parsed::<Decimal>("SHIPPING_FEE", "99")?,
                free_threshold: env.parsed::<Decimal>("FREE_SHIPPING_THRESHOLD", "999")?,
            },
            auth,
            payments: PaymentConfig {
                api_base: trim_slash(env.or_default("PAYMENT_API_BASE", "https://api.stripe.com")),
                secret_key: env.required("PAYMENT_SECRET_KEY")?.into(),
                webhook_secret: env.required("PAYMENT_WEBHOOK_SECRET")?.into(),
            },
            storage: StorageConfig { backend, max_upload_bytes: env.parsed("UPLOAD_MAX_BYTES", "5242880")? },
            nats_url: env.optional("NATS_URL"),
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.or_default(key, default)
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

fn trim_slash(url: String) -> String { url.trim_end_matches('/').to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://shop:pw@localhost/shop"),
            ("PUBLIC_BASE_URL", "https://shop.example/"),
            ("AUTH_BASE_URL", "https://auth.example/"),
            ("AUTH_ANON_KEY", "anon"),
            ("PAYMENT_SECRET_KEY", "sk_test_1"),
            ("PAYMENT_WEBHOOK_SECRET", "whsec_1"),
            ("STORAGE_SERVICE_KEY", "service"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<StorefrontConfig, ConfigError> {
        StorefrontConfig::from_lookup(|k| vars.get(k).map(|v| (*v).to_string()))
    }

    #[test]
    fn test_defaults() {
        let config = load(&base()).unwrap();
        assert_eq!(config.port, 8083);
        assert_eq!(config.currency, "INR");
        assert_eq!(config.public_base_url, "https://shop.example");
        assert_eq!(config.shipping.flat_fee, Decimal::new(99, 0));
        assert_eq!(config.payments.api_base, "https://api.stripe.com");
        assert_eq!(config.payments.webhook_secret.expose_secret(), "whsec_1");
        assert_eq!(config.storage.max_upload_bytes, 5 * 1024 * 1024);
        match &config.storage.backend {
            StorageBackend::Platform { base_url, bucket, .. } => {
                assert_eq!(base_url, "https://auth.example");
                assert_eq!(bucket, "product-images");
            }
            StorageBackend::Local { .. } => panic!("expected platform storage"),
        }
    }

    #[test]
    fn test_missing_and_invalid() {
        let mut vars = base();
        vars.remove("PAYMENT_WEBHOOK_SECRET");
        assert_eq!(load(&vars).unwrap_err(), ConfigError::MissingEnvVar("PAYMENT_WEBHOOK_SECRET".into()));

        let mut vars = base();
        vars.insert("PORT", "eighty");
        assert!(matches!(load(&vars), Err(ConfigError::InvalidEnvVar(key, _)) if key == "PORT"));

        let mut vars = base();
        vars.insert("STORAGE_BACKEND", "s3");
        assert!(load(&vars).is_err());
    }

    #[test]
    fn test_local_storage_needs_no_service_key() {
        let mut vars = base();
        vars.remove("STORAGE_SERVICE_KEY");
        vars.insert("STORAGE_BACKEND", "local");
        let config = load(&vars).unwrap();
        assert!(matches!(config.storage.backend, StorageBackend::Local { .. }));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&base()).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk_test_1"));
        assert!(!debug.contains("pw@localhost"));
    }
}

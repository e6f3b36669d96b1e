//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;

use crate::auth::{CurrentUser, IdentityProvider, PlatformIdentity};
use crate::config::{StorageBackend, StorefrontConfig};
use crate::messaging::EventPublisher;
use crate::payments::{PaymentGateway, StripeGateway};
use crate::storage::{BlobStore, LocalStore, PlatformStore};

/// How long a resolved access token is trusted without asking the platform again.
const USER_CACHE_TTL: Duration = Duration::from_secs(60);

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`. External platforms sit behind trait objects
/// so tests can swap them out.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    identity: Arc<dyn IdentityProvider>,
    payments: Arc<dyn PaymentGateway>,
    storage: Arc<dyn BlobStore>,
    events: EventPublisher,
    user_cache: Cache<String, CurrentUser>,
}

/// External services the storefront talks to.
pub struct Services {
    pub identity: Arc<dyn IdentityProvider>,
    pub payments: Arc<dyn PaymentGateway>,
    pub storage: Arc<dyn BlobStore>,
    pub events: EventPublisher,
}

impl Services {
    /// Platform-backed services sharing one HTTP client.
    #[must_use]
    pub fn from_config(config: &StorefrontConfig, client: &reqwest::Client, events: EventPublisher) -> Self {
        let storage: Arc<dyn BlobStore> = match &config.storage.backend {
            StorageBackend::Platform { base_url, service_key, bucket } => {
                Arc::new(PlatformStore::new(client.clone(), base_url, service_key.clone(), bucket))
            }
            StorageBackend::Local { dir } => Arc::new(LocalStore::new(dir.clone())),
        };
        Self {
            identity: Arc::new(PlatformIdentity::new(client.clone(), &config.auth)),
            payments: Arc::new(StripeGateway::new(client.clone(), &config.payments)),
            storage,
            events,
        }
    }
}

impl AppState {
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool, services: Services) -> Self {
        let user_cache = Cache::builder().max_capacity(10_000).time_to_live(USER_CACHE_TTL).build();

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                identity: services.identity,
                payments: services.payments,
                storage: services.storage,
                events: services.events,
                user_cache,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    #[must_use]
    pub fn payments(&self) -> &dyn PaymentGateway {
        self.inner.payments.as_ref()
    }

    #[must_use]
    pub fn storage(&self) -> &dyn BlobStore {
        self.inner.storage.as_ref()
    }

    #[must_use]
    pub fn events(&self) -> &EventPublisher {
        &self.inner.events
    }

    /// Access token to user, see [`crate::auth::authenticate`].
    #[must_use]
    pub fn user_cache(&self) -> &Cache<String, CurrentUser> {
        &self.inner.user_cache
    }
}

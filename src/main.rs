//! Atelier storefront server

use std::time::Duration;

use anyhow::{Context, Result};
use atelier_storefront::config::StorageBackend;
use atelier_storefront::db::{create_pool, migrate};
use atelier_storefront::messaging::EventPublisher;
use atelier_storefront::state::{AppState, Services};
use atelier_storefront::storage::local::PUBLIC_PREFIX;
use atelier_storefront::{http, StorefrontConfig};
use tower_http::services::ServeDir;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let config = StorefrontConfig::from_env().context("loading configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_storefront=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let pool = create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("connecting to database")?;
    migrate(&pool).await.context("running migrations")?;

    let events = EventPublisher::connect(config.nats_url.as_deref()).await;
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .context("building HTTP client")?;
    let services = Services::from_config(&config, &client, events);

    let addr = config.socket_addr();
    let max_upload_bytes = config.storage.max_upload_bytes;
    let upload_dir = match &config.storage.backend {
        StorageBackend::Local { dir } => Some(dir.clone()),
        StorageBackend::Platform { .. } => None,
    };
    let state = AppState::new(config, pool, services);

    let mut app = http::routes(max_upload_bytes);
    if let Some(dir) = upload_dir {
        tokio::fs::create_dir_all(&dir).await.context("creating upload directory")?;
        app = app.nest_service(PUBLIC_PREFIX, ServeDir::new(dir));
    }
    let app = app
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    tracing::info!(%addr, "Atelier storefront listening");
    let listener = tokio::net::TcpListener::bind(addr).await.context("binding listener")?;
    axum::serve(listener, app).await?;
    Ok(())
}

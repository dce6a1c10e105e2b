use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod app;
mod config;
mod domain;
mod error;
mod http;
mod metrics;
mod store;
mod utils;

#[cfg(test)]
mod test_support;

use app::Services;
use config::AppConfig;
use http::AppState;
use store::{InMemoryStore, PgStore, StoreHealth};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with environment-based filtering
    // Default to INFO level, can be overridden with RUST_LOG env var
    // Example: RUST_LOG=debug cargo run
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pcbuild_store=debug"))
        )
        .init();

    tracing::info!("🚀 Starting PC build store");

    // === 1. Load configuration ===
    let config = Arc::new(AppConfig::load()?);
    tracing::info!(
        reservation = ?config.inventory.reservation,
        low_stock_threshold = config.inventory.low_stock_threshold,
        "⚙️ Configuration loaded"
    );

    // === 2. Initialize Prometheus metrics ===
    let metrics = Arc::new(metrics::Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    // === 3. Select the store backend and wire the components ===
    let (services, health): (Services, Arc<dyn StoreHealth>) = match &config.database.url {
        Some(_) => {
            tracing::info!("Connecting to PostgreSQL...");
            let store = Arc::new(PgStore::connect(&config.database).await?);
            (
                Services::new(store.clone(), &config, metrics.clone()),
                store as Arc<dyn StoreHealth>,
            )
        }
        None => {
            tracing::warn!("⚠️ No database URL configured, using the in-memory store (data is lost on exit)");
            let store = Arc::new(InMemoryStore::new());
            (
                Services::new(store.clone(), &config, metrics.clone()),
                store as Arc<dyn StoreHealth>,
            )
        }
    };

    let health_status = metrics::check_store(health.as_ref()).await;
    metrics.update_store_health(&health_status.status);
    if health_status.status.is_unhealthy() {
        anyhow::bail!("store {} is unreachable at startup", health.backend_name());
    }

    let state = Arc::new(AppState::new(Arc::new(services), metrics.clone(), &config));

    // === 4. Serve API and metrics until one of them stops ===
    let api = http::start_api_server(state, config.http.host.clone(), config.http.port);

    if config.metrics.enabled {
        let metrics_server = metrics::start_metrics_server(
            metrics.clone(),
            health,
            config.http.host.clone(),
            config.metrics.port,
        );
        futures_util::try_join!(api, metrics_server)?;
    } else {
        api.await?;
    }

    tracing::info!("👋 Shutdown complete");
    Ok(())
}

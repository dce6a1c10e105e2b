mod admin;
mod auth;
mod configurations;
mod error;
mod inventory;
mod orders;
mod products;

use actix_web::{web, App, HttpServer};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use crate::app::Services;
use crate::config::{AppConfig, PaginationConfig};
use crate::domain::page::Page;
use crate::error::CoreResult;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};

pub use auth::{AdminIdentity, Identity, MaybeIdentity};
pub use error::ApiError;

// ============================================================================
// HTTP Boundary
// ============================================================================
//
// Thin adapter over the core components:
// - identity comes from forwarded headers (see `auth`)
// - every handler reports one request metric labelled by operation/outcome
// - idempotent reads are retried on transient store errors; writes never are
//
// ============================================================================

pub struct AppState {
    pub services: Arc<Services>,
    pub metrics: Arc<Metrics>,
    pub retry: RetryConfig,
    pub pagination: PaginationConfig,
    pub low_stock_threshold: i32,
}

impl AppState {
    pub fn new(services: Arc<Services>, metrics: Arc<Metrics>, config: &AppConfig) -> Self {
        Self {
            services,
            metrics,
            retry: RetryConfig::from(&config.retry),
            pagination: config.pagination.clone(),
            low_stock_threshold: config.inventory.low_stock_threshold,
        }
    }

    pub fn page(&self, page: Option<u32>, per_page: Option<u32>) -> Page {
        Page::from_query(
            page,
            per_page,
            self.pagination.default_per_page,
            self.pagination.max_per_page,
        )
    }
}

/// Register every API route. Literal segments go before `{id}` captures.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        // Products
        .route("/products", web::get().to(products::list))
        .route("/products", web::post().to(products::create))
        .route("/products/search", web::get().to(products::search))
        .route("/products/{id}", web::get().to(products::get))
        .route("/products/{id}", web::put().to(products::update))
        .route("/products/{id}", web::delete().to(products::delete))
        // Inventory
        .route("/admin/inventory/low-stock", web::get().to(inventory::low_stock))
        .route("/admin/inventory/{id}/adjust", web::post().to(inventory::adjust))
        .route("/admin/inventory/{id}", web::put().to(inventory::set))
        // Configurations
        .route("/configs", web::post().to(configurations::build))
        .route("/configs/user/{user_id}", web::get().to(configurations::list_by_user))
        .route("/configs/{id}", web::get().to(configurations::get))
        .route("/configs/{id}", web::put().to(configurations::update))
        .route("/configs/{id}", web::delete().to(configurations::delete))
        // Orders
        .route("/orders", web::post().to(orders::create))
        .route("/orders/user/{user_id}", web::get().to(orders::list_by_user))
        .route("/orders/{id}", web::get().to(orders::get))
        .route("/orders/{id}", web::put().to(orders::update_status))
        .route("/orders/{id}/payment", web::put().to(orders::update_payment))
        // Admin
        .route("/admin/orders", web::get().to(admin::orders))
        .route("/admin/dashboard", web::get().to(admin::dashboard))
        .route("/admin/analytics", web::get().to(admin::analytics));
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(256 * 1024)
        .error_handler(|err, _req| ApiError::bad_request(format!("Invalid request body: {}", err)).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(format!("Invalid query: {}", err)).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(format!("Invalid path: {}", err)).into())
}

/// Start the public API server
pub async fn start_api_server(state: Arc<AppState>, host: String, port: u16) -> std::io::Result<()> {
    tracing::info!("🌐 Starting API server on http://{}:{}", host, port);

    let state = web::Data::from(state);
    HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind((host.as_str(), port))?
        .run()
        .await
}

// ============================================================================
// Handler helpers
// ============================================================================

/// Run one core call and record its outcome.
async fn instrument<T, F>(state: &AppState, operation: &'static str, call: F) -> Result<T, ApiError>
where
    F: Future<Output = CoreResult<T>>,
{
    let started = Instant::now();
    let result = call.await;
    let outcome = match &result {
        Ok(_) => "ok",
        Err(err) => err.kind(),
    };
    state
        .metrics
        .record_request(operation, outcome, started.elapsed().as_secs_f64());

    if let Err(err) = &result {
        tracing::debug!(operation = operation, kind = err.kind(), error = %err, "Request failed");
    }
    result.map_err(ApiError::from)
}

/// Idempotent read: transient store errors are retried with backoff.
async fn read<T, F, Fut>(state: &AppState, operation: &'static str, mut call: F) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let metrics = &state.metrics;
    instrument(state, operation, async {
        retry_on_transient(&state.retry, operation, |attempt| {
            if attempt > 1 {
                metrics.record_read_retry(operation);
            }
            call()
        })
        .await
        .into_result()
    })
    .await
}

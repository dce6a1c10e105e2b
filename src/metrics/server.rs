use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use super::health::check_store;
use super::Metrics;
use crate::store::StoreHealth;

struct MetricsState {
    metrics: Arc<Metrics>,
    store: Arc<dyn StoreHealth>,
}

/// Start the metrics HTTP server (`/metrics` and `/health`)
pub async fn start_metrics_server(
    metrics: Arc<Metrics>,
    store: Arc<dyn StoreHealth>,
    host: String,
    port: u16,
) -> std::io::Result<()> {
    tracing::info!("📊 Starting metrics server on http://{}:{}/metrics", host, port);

    let state = web::Data::new(MetricsState { metrics, store });
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/metrics", web::get().to(metrics_handler))
            .route("/health", web::get().to(health_handler))
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}

async fn metrics_handler(state: web::Data<MetricsState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %err, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(state: web::Data<MetricsState>) -> impl Responder {
    let store = check_store(state.store.as_ref()).await;
    state.metrics.update_store_health(&store.status);

    let body = serde_json::json!({
        "status": if store.status.is_unhealthy() { "unhealthy" } else { "healthy" },
        "service": "pcbuild-store",
        "components": [store.clone()],
    });
    if store.status.is_unhealthy() {
        HttpResponse::ServiceUnavailable().json(body)
    } else {
        HttpResponse::Ok().json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use actix_web::{test, App};

    fn state(store: Arc<InMemoryStore>) -> web::Data<MetricsState> {
        web::Data::new(MetricsState {
            metrics: Arc::new(Metrics::new().unwrap()),
            store,
        })
    }

    #[actix_web::test]
    async fn test_health_follows_store() {
        let store = Arc::new(InMemoryStore::new());
        let app = test::init_service(
            App::new()
                .app_data(state(store.clone()))
                .route("/health", web::get().to(health_handler)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), 200);

        store.set_unavailable(true);
        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert_eq!(resp.status(), 503);
    }

    #[actix_web::test]
    async fn test_metrics_endpoint_exposes_text_format() {
        let data = state(Arc::new(InMemoryStore::new()));
        data.metrics.record_request("list_products", "ok", 0.01);
        let app = test::init_service(
            App::new()
                .app_data(data)
                .route("/metrics", web::get().to(metrics_handler)),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(resp.status(), 200);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("api_requests_total"));
    }
}

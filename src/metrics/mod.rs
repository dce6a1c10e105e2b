// Private module declaration
mod health;
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

// Re-export for public API
pub use health::{check_store, ComponentHealth, HealthStatus};
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - API requests (throughput, latency, outcome per operation)
// - Orders created and status / payment transitions
// - Stock conflicts (ledger rejections and failed reservations)
// - Read retries and store health
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // API Metrics
    pub requests_total: IntCounterVec,
    pub request_duration: HistogramVec,

    // Order Metrics
    pub orders_created_total: IntCounterVec,
    pub order_status_transitions: IntCounterVec,
    pub payment_status_transitions: IntCounterVec,

    // Inventory Metrics
    pub stock_conflicts_total: IntCounter,

    // Store Metrics
    pub read_retries_total: IntCounterVec,
    pub store_health_status: IntGauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        // API Metrics
        let requests_total = IntCounterVec::new(
            Opts::new("api_requests_total", "Total API requests by operation and outcome"),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let request_duration = HistogramVec::new(
            HistogramOpts::new("api_request_duration_seconds", "API request duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(request_duration.clone()))?;

        // Order Metrics
        let orders_created_total = IntCounterVec::new(
            Opts::new("orders_created_total", "Total orders created"),
            &["reservation"],
        )?;
        registry.register(Box::new(orders_created_total.clone()))?;

        let order_status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Order status transitions applied"),
            &["from_status", "to_status"],
        )?;
        registry.register(Box::new(order_status_transitions.clone()))?;

        let payment_status_transitions = IntCounterVec::new(
            Opts::new("payment_status_transitions_total", "Payment status transitions applied"),
            &["from_status", "to_status"],
        )?;
        registry.register(Box::new(payment_status_transitions.clone()))?;

        // Inventory Metrics
        let stock_conflicts_total = IntCounter::new(
            "stock_conflicts_total",
            "Stock changes rejected because stock would go negative",
        )?;
        registry.register(Box::new(stock_conflicts_total.clone()))?;

        // Store Metrics
        let read_retries_total = IntCounterVec::new(
            Opts::new("read_retries_total", "Idempotent reads retried after a transient store error"),
            &["operation"],
        )?;
        registry.register(Box::new(read_retries_total.clone()))?;

        let store_health_status = IntGauge::new(
            "store_health_status",
            "Store health status (0=Unhealthy, 1=Degraded, 2=Healthy)",
        )?;
        registry.register(Box::new(store_health_status.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration,
            orders_created_total,
            order_status_transitions,
            payment_status_transitions,
            stock_conflicts_total,
            read_retries_total,
            store_health_status,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Helper to record one handled API request
    pub fn record_request(&self, operation: &str, outcome: &str, duration_secs: f64) {
        self.requests_total.with_label_values(&[operation, outcome]).inc();
        self.request_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    pub fn record_order_created(&self, reserved: bool) {
        let label = if reserved { "reserved" } else { "none" };
        self.orders_created_total.with_label_values(&[label]).inc();
    }

    pub fn record_status_transition(&self, from_status: &str, to_status: &str) {
        self.order_status_transitions.with_label_values(&[from_status, to_status]).inc();
    }

    pub fn record_payment_transition(&self, from_status: &str, to_status: &str) {
        self.payment_status_transitions.with_label_values(&[from_status, to_status]).inc();
    }

    pub fn record_read_retry(&self, operation: &str) {
        self.read_retries_total.with_label_values(&[operation]).inc();
    }

    pub fn update_store_health(&self, status: &HealthStatus) {
        self.store_health_status.set(status.as_gauge());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter_value(metrics: &Metrics, name: &str) -> Vec<f64> {
        metrics
            .registry
            .gather()
            .iter()
            .find(|m| m.name() == name)
            .map(|family| family.metric.iter().filter_map(|m| m.counter.value).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.stock_conflicts_total.inc();
        assert!(!metrics.registry.gather().is_empty());
    }

    #[test]
    fn test_record_request() {
        let metrics = Metrics::new().unwrap();
        metrics.record_request("create_order", "ok", 0.02);
        metrics.record_request("create_order", "conflict", 0.01);

        assert_eq!(counter_value(&metrics, "api_requests_total").len(), 2);
    }

    #[test]
    fn test_record_transitions() {
        let metrics = Metrics::new().unwrap();
        metrics.record_status_transition("pending", "shipped");
        metrics.record_status_transition("pending", "shipped");
        metrics.record_order_created(false);

        assert_eq!(counter_value(&metrics, "order_status_transitions_total"), vec![2.0]);
        assert_eq!(counter_value(&metrics, "orders_created_total"), vec![1.0]);
    }

    #[test]
    fn test_store_health_gauge() {
        let metrics = Metrics::new().unwrap();
        metrics.update_store_health(&HealthStatus::Unhealthy("down".to_string()));
        assert_eq!(metrics.store_health_status.get(), 0);
        metrics.update_store_health(&HealthStatus::Healthy);
        assert_eq!(metrics.store_health_status.get(), 2);
    }
}

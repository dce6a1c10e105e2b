use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::analytics::AnalyticsAggregator;
use crate::domain::catalog::CatalogStore;
use crate::domain::configuration::ConfigurationBuilder;
use crate::domain::inventory::InventoryLedger;
use crate::domain::order::OrderProcessor;
use crate::metrics::Metrics;
use crate::store::Store;

// ============================================================================
// Service Wiring
// ============================================================================
//
// Built once at startup from one store backend and the immutable config.
// Components only see the repository traits they need.
//
//   CatalogStore ─┬─ ConfigurationBuilder
//                 ├─ InventoryLedger ── OrderProcessor
//                 └─ AnalyticsAggregator (read-only)
//
// ============================================================================

pub struct Services {
    pub catalog: CatalogStore,
    pub configurations: ConfigurationBuilder,
    pub ledger: Arc<InventoryLedger>,
    pub orders: OrderProcessor,
    pub analytics: AnalyticsAggregator,
}

impl Services {
    pub fn new<S: Store + 'static>(store: Arc<S>, config: &AppConfig, metrics: Arc<Metrics>) -> Self {
        let ledger = Arc::new(
            InventoryLedger::new(store.clone(), config.inventory.reservation).with_metrics(metrics.clone()),
        );

        Self {
            catalog: CatalogStore::new(store.clone(), config.pagination.max_per_page),
            configurations: ConfigurationBuilder::new(store.clone(), store.clone()),
            orders: OrderProcessor::new(store.clone(), store.clone(), ledger.clone()).with_metrics(metrics),
            analytics: AnalyticsAggregator::new(store, &config.analytics, config.inventory.low_stock_threshold),
            ledger,
        }
    }
}

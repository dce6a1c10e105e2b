use std::sync::Arc;
use uuid::Uuid;

use crate::config::ReservationPolicy;
use crate::domain::catalog::{validate_stock, Product};
use crate::domain::order::{Order, OrderStatus};
use crate::error::{CoreError, CoreResult};
use crate::metrics::Metrics;
use crate::store::{StockChange, StockRepository};

// ============================================================================
// Inventory Ledger
// ============================================================================

pub struct InventoryLedger {
    stock: Arc<dyn StockRepository>,
    reservation: ReservationPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl InventoryLedger {
    pub fn new(stock: Arc<dyn StockRepository>, reservation: ReservationPolicy) -> Self {
        Self {
            stock,
            reservation,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn reservation_policy(&self) -> ReservationPolicy {
        self.reservation
    }

    /// Whether order creation holds stock.
    pub fn reserves_on_create(&self) -> bool {
        self.reservation_policy() == ReservationPolicy::Reserve
    }

    /// Whether moving `order` to `next` hands its reserved units back.
    /// Decided by the order's own flag, so orders placed under another
    /// policy are released correctly.
    pub fn releases_on(&self, order: &Order, next: OrderStatus) -> bool {
        order.stock_reserved && order.status != next && next == OrderStatus::Cancelled
    }

    /// Add `delta` (possibly negative) and return the new stock level.
    pub async fn adjust(&self, product_id: Uuid, delta: i32) -> CoreResult<i32> {
        match self.stock.apply_stock_delta(product_id, delta).await? {
            StockChange::Applied { stock } => {
                tracing::info!(product_id = %product_id, delta = delta, stock = stock, "📦 Stock adjusted");
                Ok(stock)
            }
            StockChange::Insufficient { available } => {
                if let Some(metrics) = &self.metrics {
                    metrics.stock_conflicts_total.inc();
                }
                tracing::warn!(
                    product_id = %product_id,
                    delta = delta,
                    available = available,
                    "⚠️ Stock adjustment rejected"
                );
                Err(CoreError::conflict(format!(
                    "Adjusting stock of product {} by {} would leave {} units",
                    product_id,
                    delta,
                    available as i64 + delta as i64
                )))
            }
            StockChange::Missing => Err(CoreError::not_found("Product", product_id)),
        }
    }

    /// Administrative correction to an absolute count.
    pub async fn set_absolute(&self, product_id: Uuid, value: i32) -> CoreResult<Product> {
        validate_stock(value)?;
        let product = self
            .stock
            .set_stock(product_id, value)
            .await?
            .ok_or_else(|| CoreError::not_found("Product", product_id))?;

        tracing::info!(product_id = %product_id, stock = value, "📝 Stock set");
        Ok(product)
    }

    /// Products with `stock < threshold`, lowest first.
    pub async fn list_below_threshold(&self, threshold: i32) -> CoreResult<Vec<Product>> {
        if threshold < 0 {
            return Err(CoreError::validation(format!(
                "Threshold cannot be negative: {}",
                threshold
            )));
        }
        self.stock.products_below(threshold).await
    }
}

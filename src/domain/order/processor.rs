use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::value_objects::{
    items_total, Order, OrderDetails, OrderFilter, OrderItem, OrderLine, OrderStatus, PaymentMethod, PaymentStatus,
    ShippingAddress, Transition,
};
use crate::domain::inventory::InventoryLedger;
use crate::domain::page::{Page, Paged};
use crate::error::{CoreError, CoreResult};
use crate::metrics::Metrics;
use crate::store::{CasOutcome, NewOrderRecord, OrderRepository, OrderWrite, ProductRepository, StatusChange};

// ============================================================================
// Order Processor
// ============================================================================
//
// create:         lines → resolve products → snapshot prices → one write
//                 (order + items, plus stock reservation under `reserve`)
// update_status:  load → check transition → compare-and-set on status
//
// A lost compare-and-set reloads and re-checks, so two writers can never
// both apply against the same starting status.
//
// ============================================================================

const MAX_CAS_ATTEMPTS: u32 = 3;
const MAX_LINE_QUANTITY: i32 = 10_000;
const MAX_TRACKING_LEN: usize = 64;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    #[serde(default)]
    pub user_id: Option<Uuid>,
    pub items: Vec<OrderLine>,
    pub shipping: ShippingAddress,
    pub payment_method: PaymentMethod,
}

pub struct OrderProcessor {
    products: Arc<dyn ProductRepository>,
    orders: Arc<dyn OrderRepository>,
    ledger: Arc<InventoryLedger>,
    metrics: Option<Arc<Metrics>>,
}

impl OrderProcessor {
    pub fn new(
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
        ledger: Arc<InventoryLedger>,
    ) -> Self {
        Self {
            products,
            orders,
            ledger,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn create(&self, request: OrderRequest) -> CoreResult<OrderDetails> {
        request.shipping.validate()?;
        let lines = merge_lines(&request.items)?;

        let ids: Vec<Uuid> = lines.iter().map(|line| line.product_id).collect();
        let products: HashMap<Uuid, _> = self
            .products
            .find_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let order_id = Uuid::new_v4();
        let items = lines
            .iter()
            .map(|line| {
                let product = products
                    .get(&line.product_id)
                    .ok_or_else(|| CoreError::not_found("Product", line.product_id))?;
                Ok(OrderItem {
                    id: Uuid::new_v4(),
                    order_id,
                    product_id: product.id,
                    product_name: product.name.clone(),
                    quantity: line.quantity,
                    price: product.price,
                })
            })
            .collect::<CoreResult<Vec<_>>>()?;

        let reserve = self.ledger.reserves_on_create();
        let now = Utc::now();
        let order = Order {
            id: order_id,
            user_id: request.user_id,
            shipping: request.shipping,
            payment_method: request.payment_method,
            total_amount: items_total(&items),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            tracking_number: None,
            stock_reserved: reserve,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let total = order.total_amount;
        let record = NewOrderRecord { order, items };

        match self.orders.insert_order(&record, reserve).await? {
            OrderWrite::Created => {}
            OrderWrite::MissingProduct(product_id) => {
                return Err(CoreError::not_found("Product", product_id));
            }
            OrderWrite::InsufficientStock {
                product_id,
                requested,
                available,
            } => {
                if let Some(metrics) = &self.metrics {
                    metrics.stock_conflicts_total.inc();
                }
                tracing::warn!(
                    product_id = %product_id,
                    requested = requested,
                    available = available,
                    "⚠️ Order rejected, insufficient stock to reserve"
                );
                return Err(CoreError::InsufficientStock {
                    product_id,
                    requested,
                    available,
                });
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_order_created(reserve);
        }
        tracing::info!(
            order_id = %order_id,
            user_id = ?request.user_id,
            lines = record.items.len(),
            total = %total,
            reserved = reserve,
            "🛒 Order created"
        );

        self.get(order_id).await
    }

    pub async fn update_status(
        &self,
        order_id: Uuid,
        next: OrderStatus,
        tracking_number: Option<String>,
    ) -> CoreResult<Order> {
        let tracking_number = normalize_tracking(tracking_number)?;

        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let order = self.find(order_id).await?;
            let unchanged = order.status.transition_to(next)? == Transition::Unchanged;
            // A repeated status still records a new tracking number.
            if unchanged && tracking_number.as_ref().map_or(true, |t| order.tracking_number.as_ref() == Some(t)) {
                tracing::debug!(order_id = %order_id, status = %next, "Status already applied");
                return Ok(order);
            }

            let change = StatusChange {
                order_id,
                expected: order.status,
                next,
                tracking_number: tracking_number.clone(),
                restock: !unchanged && self.ledger.releases_on(&order, next),
            };

            let outcome = match self.orders.transition_status(&change).await {
                Err(err) if err.is_conflict() => {
                    if let Some(metrics) = &self.metrics {
                        metrics.stock_conflicts_total.inc();
                    }
                    tracing::warn!(order_id = %order_id, to = %next, error = %err, "⚠️ Status change refused");
                    return Err(err);
                }
                outcome => outcome?,
            };

            match outcome {
                CasOutcome::Applied(updated) if unchanged => {
                    tracing::info!(
                        order_id = %order_id,
                        status = %next,
                        tracking_number = ?updated.tracking_number,
                        version = updated.version,
                        "🏷️ Tracking number updated"
                    );
                    return Ok(updated);
                }
                CasOutcome::Applied(updated) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_status_transition(order.status.as_str(), next.as_str());
                    }
                    tracing::info!(
                        order_id = %order_id,
                        from = %order.status,
                        to = %next,
                        restocked = change.restock,
                        version = updated.version,
                        "🚚 Order status changed"
                    );
                    return Ok(updated);
                }
                CasOutcome::Stale => {
                    tracing::debug!(order_id = %order_id, attempt = attempt, "Status changed underneath, reloading");
                }
                CasOutcome::Missing => return Err(CoreError::not_found("Order", order_id)),
            }
        }

        tracing::warn!(order_id = %order_id, attempts = MAX_CAS_ATTEMPTS, "⚠️ Status update lost every race");
        Err(CoreError::conflict(format!(
            "Order {} was modified concurrently, retry the request",
            order_id
        )))
    }

    pub async fn update_payment_status(&self, order_id: Uuid, next: PaymentStatus) -> CoreResult<Order> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let order = self.find(order_id).await?;
            if order.payment_status.transition_to(next)? == Transition::Unchanged {
                return Ok(order);
            }

            match self
                .orders
                .transition_payment(order_id, order.payment_status, next)
                .await?
            {
                CasOutcome::Applied(updated) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_payment_transition(order.payment_status.as_str(), next.as_str());
                    }
                    tracing::info!(
                        order_id = %order_id,
                        from = order.payment_status.as_str(),
                        to = next.as_str(),
                        "💳 Payment status changed"
                    );
                    return Ok(updated);
                }
                CasOutcome::Stale => {
                    tracing::debug!(order_id = %order_id, attempt = attempt, "Payment status changed underneath, reloading");
                }
                CasOutcome::Missing => return Err(CoreError::not_found("Order", order_id)),
            }
        }

        Err(CoreError::conflict(format!(
            "Order {} was modified concurrently, retry the request",
            order_id
        )))
    }

    pub async fn get(&self, order_id: Uuid) -> CoreResult<OrderDetails> {
        self.orders
            .order_details(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order_id))
    }

    /// Newest first, with items and product summaries.
    pub async fn get_for_user(&self, user_id: Uuid) -> CoreResult<Vec<OrderDetails>> {
        self.orders.orders_for_user(user_id).await
    }

    pub async fn get_all(&self, filter: OrderFilter, page: Page) -> CoreResult<Paged<OrderDetails>> {
        let filter = OrderFilter {
            status: filter.status,
            search: filter
                .search
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        };
        self.orders.list_orders(&filter, page).await
    }

    async fn find(&self, order_id: Uuid) -> CoreResult<Order> {
        self.orders
            .find_order(order_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Order", order_id))
    }
}

/// Validate quantities and fold repeated products into one line, keeping
/// first-seen order.
fn merge_lines(lines: &[OrderLine]) -> CoreResult<Vec<OrderLine>> {
    if lines.is_empty() {
        return Err(CoreError::validation("Order must contain at least one item"));
    }

    let mut merged: Vec<OrderLine> = Vec::with_capacity(lines.len());
    for line in lines {
        if line.quantity < 1 || line.quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::validation(format!(
                "Quantity for product {} must be between 1 and {}",
                line.product_id, MAX_LINE_QUANTITY
            )));
        }
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => {
                existing.quantity += line.quantity;
                if existing.quantity > MAX_LINE_QUANTITY {
                    return Err(CoreError::validation(format!(
                        "Quantity for product {} must be between 1 and {}",
                        line.product_id, MAX_LINE_QUANTITY
                    )));
                }
            }
            None => merged.push(*line),
        }
    }
    Ok(merged)
}

fn normalize_tracking(tracking: Option<String>) -> CoreResult<Option<String>> {
    let Some(tracking) = tracking else {
        return Ok(None);
    };
    let tracking = tracking.trim();
    if tracking.is_empty() {
        return Ok(None);
    }
    if tracking.len() > MAX_TRACKING_LEN {
        return Err(CoreError::validation(format!(
            "Tracking number exceeds {} characters",
            MAX_TRACKING_LEN
        )));
    }
    Ok(Some(tracking.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReservationPolicy;
    use crate::domain::catalog::{CatalogStore, Category, ProductPatch};
    use crate::store::{InMemoryStore, StockRepository};
    use crate::test_support::{seed_product, seed_user, shipping};
    use rust_decimal::Decimal;

    fn processor(store: &Arc<InMemoryStore>, policy: ReservationPolicy) -> OrderProcessor {
        let ledger = Arc::new(InventoryLedger::new(store.clone(), policy));
        OrderProcessor::new(store.clone(), store.clone(), ledger)
    }

    fn request(user_id: Option<Uuid>, items: Vec<(Uuid, i32)>) -> OrderRequest {
        OrderRequest {
            user_id,
            items: items
                .into_iter()
                .map(|(product_id, quantity)| OrderLine { product_id, quantity })
                .collect(),
            shipping: shipping(),
            payment_method: PaymentMethod::Card,
        }
    }

    async fn pending_order(store: &Arc<InMemoryStore>, processor: &OrderProcessor) -> Order {
        let p = seed_product(store, Category::Cooling, "Fan", Decimal::new(1500, 2), 20).await;
        processor.create(request(None, vec![(p.id, 1)])).await.unwrap().order
    }

    #[tokio::test]
    async fn test_total_is_sum_of_snapshot_lines() {
        let store = Arc::new(InMemoryStore::new());
        let p1 = seed_product(&store, Category::Cooling, "Fan", Decimal::new(1000, 2), 5).await;
        let p2 = seed_product(&store, Category::Cooling, "Paste", Decimal::new(2500, 2), 5).await;
        let processor = processor(&store, ReservationPolicy::None);

        let created = processor
            .create(request(Some(Uuid::new_v4()), vec![(p1.id, 2), (p2.id, 1)]))
            .await
            .unwrap();

        assert_eq!(created.order.total_amount, Decimal::new(4500, 2));
        assert_eq!(created.order.status, OrderStatus::Pending);
        assert_eq!(created.order.payment_status, PaymentStatus::Pending);
        assert_eq!(created.items.len(), 2);
        let line_sum: Decimal = created.items.iter().map(|i| i.item.line_total()).sum();
        assert_eq!(line_sum, created.order.total_amount);
    }

    #[tokio::test]
    async fn test_price_snapshot_survives_catalog_change() {
        let store = Arc::new(InMemoryStore::new());
        let p = seed_product(&store, Category::Gpu, "RTX 4060", Decimal::new(29900, 2), 5).await;
        let processor = processor(&store, ReservationPolicy::None);
        let catalog = CatalogStore::new(store.clone(), 10);

        let created = processor.create(request(None, vec![(p.id, 1)])).await.unwrap();
        catalog
            .update(
                p.id,
                ProductPatch {
                    price: Some(Decimal::new(24900, 2)),
                    name: Some("RTX 4060 (renamed)".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let fetched = processor.get(created.order.id).await.unwrap();
        assert_eq!(fetched.order.total_amount, Decimal::new(29900, 2));
        assert_eq!(fetched.items[0].item.price, Decimal::new(29900, 2));
        assert_eq!(fetched.items[0].item.product_name, "RTX 4060");
    }

    #[tokio::test]
    async fn test_duplicate_lines_are_merged() {
        let store = Arc::new(InMemoryStore::new());
        let p = seed_product(&store, Category::Ram, "DDR5", Decimal::new(5000, 2), 10).await;
        let processor = processor(&store, ReservationPolicy::None);

        let created = processor.create(request(None, vec![(p.id, 1), (p.id, 2)])).await.unwrap();
        assert_eq!(created.items.len(), 1);
        assert_eq!(created.items[0].item.quantity, 3);
        assert_eq!(created.order.total_amount, Decimal::new(15000, 2));
    }

    #[tokio::test]
    async fn test_invalid_lines_are_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let p = seed_product(&store, Category::Ram, "DDR5", Decimal::new(5000, 2), 10).await;
        let processor = processor(&store, ReservationPolicy::None);

        let err = processor.create(request(None, vec![])).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = processor.create(request(None, vec![(p.id, 0)])).await.unwrap_err();
        assert_eq!(err.kind(), "validation");

        let mut bad_address = request(None, vec![(p.id, 1)]);
        bad_address.shipping.city = " ".to_string();
        assert_eq!(processor.create(bad_address).await.unwrap_err().kind(), "validation");
    }

    #[tokio::test]
    async fn test_missing_product_persists_nothing() {
        let store = Arc::new(InMemoryStore::new());
        let p = seed_product(&store, Category::Ram, "DDR5", Decimal::new(5000, 2), 10).await;
        let processor = processor(&store, ReservationPolicy::None);
        let user = Uuid::new_v4();

        let err = processor
            .create(request(Some(user), vec![(p.id, 1), (Uuid::new_v4(), 1)]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "not_found");
        assert!(processor.get_for_user(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_reservation_leaves_stock_alone() {
        let store = Arc::new(InMemoryStore::new());
        let p = seed_product(&store, Category::Psu, "SF750", Decimal::new(16000, 2), 1).await;
        let processor = processor(&store, ReservationPolicy::None);

        // Orders are requests for goods: quantity may exceed stock.
        let created = processor.create(request(None, vec![(p.id, 5)])).await.unwrap();
        assert!(!created.order.stock_reserved);
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 1);
    }

    #[tokio::test]
    async fn test_reservation_decrements_and_cancel_restores() {
        let store = Arc::new(InMemoryStore::new());
        let p = seed_product(&store, Category::Psu, "SF750", Decimal::new(16000, 2), 5).await;
        let processor = processor(&store, ReservationPolicy::Reserve);

        let created = processor.create(request(None, vec![(p.id, 3)])).await.unwrap();
        assert!(created.order.stock_reserved);
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 2);

        processor
            .update_status(created.order.id, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    async fn test_reservation_rejects_whole_order_on_shortfall() {
        let store = Arc::new(InMemoryStore::new());
        let plenty = seed_product(&store, Category::Case, "Torrent", Decimal::new(20000, 2), 10).await;
        let scarce = seed_product(&store, Category::Gpu, "RTX 4090", Decimal::new(159900, 2), 1).await;
        let processor = processor(&store, ReservationPolicy::Reserve);
        let user = Uuid::new_v4();

        let err = processor
            .create(request(Some(user), vec![(plenty.id, 2), (scarce.id, 2)]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            CoreError::InsufficientStock { product_id, requested: 2, available: 1 } if product_id == scarce.id
        ));
        assert_eq!(store.find_product(plenty.id).await.unwrap().unwrap().stock, 10);
        assert!(processor.get_for_user(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelling_unreserved_order_never_restocks() {
        let store = Arc::new(InMemoryStore::new());
        let p = seed_product(&store, Category::Cpu, "i9", Decimal::new(58900, 2), 4).await;

        // Created before reservation was switched on.
        let created = processor(&store, ReservationPolicy::None)
            .create(request(None, vec![(p.id, 2)]))
            .await
            .unwrap();

        processor(&store, ReservationPolicy::Reserve)
            .update_status(created.order.id, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_pending_to_shipped_with_tracking() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(&store, ReservationPolicy::None);
        let order = pending_order(&store, &processor).await;

        let shipped = processor
            .update_status(order.id, OrderStatus::Shipped, Some(" 1Z999AA1 ".to_string()))
            .await
            .unwrap();

        assert_eq!(shipped.status, OrderStatus::Shipped);
        assert_eq!(shipped.tracking_number.as_deref(), Some("1Z999AA1"));
        assert_eq!(shipped.version, order.version + 1);
    }

    #[tokio::test]
    async fn test_delivered_to_pending_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(&store, ReservationPolicy::None);
        let order = pending_order(&store, &processor).await;
        processor.update_status(order.id, OrderStatus::Delivered, None).await.unwrap();

        let err = processor
            .update_status(order.id, OrderStatus::Pending, None)
            .await
            .unwrap_err();

        assert!(matches!(err, CoreError::InvalidTransition { from: "delivered", to: "pending" }));
        assert_eq!(processor.get(order.id).await.unwrap().order.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_reissuing_same_status_is_noop() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(&store, ReservationPolicy::None);
        let order = pending_order(&store, &processor).await;

        let first = processor.update_status(order.id, OrderStatus::Processing, None).await.unwrap();
        let second = processor.update_status(order.id, OrderStatus::Processing, None).await.unwrap();

        assert_eq!(second.status, OrderStatus::Processing);
        assert_eq!(second.version, first.version);
    }

    #[tokio::test]
    async fn test_reissued_status_records_new_tracking_number() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(&store, ReservationPolicy::None);
        let order = pending_order(&store, &processor).await;

        let shipped = processor.update_status(order.id, OrderStatus::Shipped, None).await.unwrap();
        assert!(shipped.tracking_number.is_none());

        let tracked = processor
            .update_status(order.id, OrderStatus::Shipped, Some("1Z999".to_string()))
            .await
            .unwrap();
        assert_eq!(tracked.status, OrderStatus::Shipped);
        assert_eq!(tracked.tracking_number.as_deref(), Some("1Z999"));
        assert_eq!(tracked.version, shipped.version + 1);

        // Same status and same tracking number is a no-op again.
        let again = processor
            .update_status(order.id, OrderStatus::Shipped, Some("1Z999".to_string()))
            .await
            .unwrap();
        assert_eq!(again.version, tracked.version);

        let corrected = processor
            .update_status(order.id, OrderStatus::Shipped, Some("1Z000".to_string()))
            .await
            .unwrap();
        assert_eq!(corrected.tracking_number.as_deref(), Some("1Z000"));
        assert_eq!(
            processor.get(order.id).await.unwrap().order.tracking_number.as_deref(),
            Some("1Z000")
        );
    }

    #[tokio::test]
    async fn test_restock_overflow_is_refused_and_order_untouched() {
        let store = Arc::new(InMemoryStore::new());
        let p = seed_product(&store, Category::Storage, "SN850X", Decimal::new(12900, 2), 5).await;
        let processor = processor(&store, ReservationPolicy::Reserve);
        let ledger = InventoryLedger::new(store.clone(), ReservationPolicy::Reserve);

        let created = processor.create(request(None, vec![(p.id, 2)])).await.unwrap();
        ledger.set_absolute(p.id, i32::MAX).await.unwrap();

        let err = processor
            .update_status(created.order.id, OrderStatus::Cancelled, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");

        let order = processor.get(created.order.id).await.unwrap().order;
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.version, created.order.version);
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, i32::MAX);

        // Once stock is corrected the cancellation goes through.
        ledger.set_absolute(p.id, 10).await.unwrap();
        processor
            .update_status(created.order.id, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        assert_eq!(store.find_product(p.id).await.unwrap().unwrap().stock, 12);
    }

    #[tokio::test]
    async fn test_every_illegal_pair_leaves_status_unchanged() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(&store, ReservationPolicy::None);

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                if from == to || from.can_transition_to(to) {
                    continue;
                }
                let order = pending_order(&store, &processor).await;
                processor.update_status(order.id, from, None).await.unwrap();

                let err = processor.update_status(order.id, to, None).await.unwrap_err();
                assert_eq!(err.kind(), "invalid_transition", "{} -> {}", from, to);
                assert_eq!(processor.get(order.id).await.unwrap().order.status, from);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_status_writers_apply_once() {
        let store = Arc::new(InMemoryStore::new());
        let processor = Arc::new(processor(&store, ReservationPolicy::None));
        let order = pending_order(&store, &processor).await;
        processor.update_status(order.id, OrderStatus::Processing, None).await.unwrap();

        // Both moves are legal from processing, neither is legal after the other.
        let ship = {
            let processor = processor.clone();
            tokio::spawn(async move { processor.update_status(order.id, OrderStatus::Shipped, None).await })
        };
        let cancel = {
            let processor = processor.clone();
            tokio::spawn(async move { processor.update_status(order.id, OrderStatus::Cancelled, None).await })
        };

        let ship = ship.await.unwrap();
        let cancel = cancel.await.unwrap();
        assert!(ship.is_ok() != cancel.is_ok());

        let (winner, loser) = if ship.is_ok() { (ship, cancel) } else { (cancel, ship) };
        assert_eq!(loser.unwrap_err().kind(), "invalid_transition");
        let winner = winner.unwrap();
        assert_eq!(processor.get(order.id).await.unwrap().order.status, winner.status);
        assert_eq!(winner.version, 2);
    }

    #[tokio::test]
    async fn test_payment_transitions() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(&store, ReservationPolicy::None);
        let order = pending_order(&store, &processor).await;

        let failed = processor.update_payment_status(order.id, PaymentStatus::Failed).await.unwrap();
        assert_eq!(failed.payment_status, PaymentStatus::Failed);

        let completed = processor
            .update_payment_status(order.id, PaymentStatus::Completed)
            .await
            .unwrap();
        assert_eq!(completed.payment_status, PaymentStatus::Completed);

        let err = processor
            .update_payment_status(order.id, PaymentStatus::Pending)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_transition");

        let err = processor
            .update_payment_status(Uuid::new_v4(), PaymentStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_get_all_filters_by_status_and_owner() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(&store, ReservationPolicy::None);
        let grace = seed_user(&store, "Grace Hopper", "grace@navy.mil", Utc::now()).await;
        let alan = seed_user(&store, "Alan Turing", "alan@bletchley.uk", Utc::now()).await;
        let p = seed_product(&store, Category::Storage, "SN850X", Decimal::new(12000, 2), 10).await;

        let grace_order = processor.create(request(Some(grace.id), vec![(p.id, 1)])).await.unwrap();
        processor.create(request(Some(alan.id), vec![(p.id, 1)])).await.unwrap();
        processor.create(request(None, vec![(p.id, 1)])).await.unwrap();
        processor
            .update_status(grace_order.order.id, OrderStatus::Processing, None)
            .await
            .unwrap();

        let all = processor.get_all(OrderFilter::default(), Page::new(1, 10)).await.unwrap();
        assert_eq!(all.total, 3);

        let by_owner = processor
            .get_all(
                OrderFilter {
                    status: None,
                    search: Some("HOPPER".to_string()),
                },
                Page::new(1, 10),
            )
            .await
            .unwrap();
        assert_eq!(by_owner.total, 1);
        assert_eq!(by_owner.items[0].owner.as_ref().map(|u| u.id), Some(grace.id));

        let pending = processor
            .get_all(
                OrderFilter {
                    status: Some(OrderStatus::Pending),
                    search: None,
                },
                Page::new(1, 10),
            )
            .await
            .unwrap();
        assert_eq!(pending.total, 2);
    }

    #[tokio::test]
    async fn test_user_orders_newest_first_with_product_summaries() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(&store, ReservationPolicy::None);
        let p = seed_product(&store, Category::Motherboard, "B650", Decimal::new(18000, 2), 10).await;
        let user = Uuid::new_v4();

        let first = processor.create(request(Some(user), vec![(p.id, 1)])).await.unwrap();
        let second = processor.create(request(Some(user), vec![(p.id, 2)])).await.unwrap();

        let orders = processor.get_for_user(user).await.unwrap();
        let ids: Vec<Uuid> = orders.iter().map(|o| o.order.id).collect();
        assert_eq!(ids, vec![second.order.id, first.order.id]);
        assert_eq!(orders[0].items[0].product.as_ref().map(|s| s.id), Some(p.id));
    }

    #[tokio::test]
    async fn test_referenced_by_open_order_blocks_delete_until_cancelled() {
        let store = Arc::new(InMemoryStore::new());
        let processor = processor(&store, ReservationPolicy::None);
        let catalog = CatalogStore::new(store.clone(), 10);
        let p = seed_product(&store, Category::Cooling, "AIO 360", Decimal::new(14000, 2), 3).await;

        let created = processor.create(request(None, vec![(p.id, 1)])).await.unwrap();
        assert_eq!(catalog.delete(p.id).await.unwrap_err().kind(), "conflict");

        processor
            .update_status(created.order.id, OrderStatus::Cancelled, None)
            .await
            .unwrap();
        catalog.delete(p.id).await.unwrap();

        // The cancelled order keeps its snapshot line.
        let fetched = processor.get(created.order.id).await.unwrap();
        assert_eq!(fetched.items[0].item.product_name, "AIO 360");
        assert!(fetched.items[0].product.is_none());
    }

    #[tokio::test]
    async fn test_ledger_and_reservation_share_stock() {
        let store = Arc::new(InMemoryStore::new());
        let p = seed_product(&store, Category::Ram, "DDR5", Decimal::new(5000, 2), 2).await;
        let processor = processor(&store, ReservationPolicy::Reserve);

        processor.create(request(None, vec![(p.id, 2)])).await.unwrap();
        assert!(store.products_below(1).await.unwrap().iter().any(|x| x.id == p.id));
    }
}

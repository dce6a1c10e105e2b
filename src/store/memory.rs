use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AnalyticsRepository, CasOutcome, ConfigurationRepository, DeleteOutcome, NewOrderRecord, OrderRepository,
    OrderWrite, PatchOutcome, ProductRepository, StatusChange, StockChange, StockRepository, StoreHealth,
};
use crate::domain::analytics::{CategoryStat, DailyBucket, StatusCount, StoreTotals, TopProduct, UserActivity};
use crate::domain::catalog::{Category, Product, ProductFilter, ProductPatch};
use crate::domain::configuration::Configuration;
use crate::domain::order::{
    Order, OrderDetails, OrderFilter, OrderItem, OrderItemDetails, OrderStatus, PaymentStatus,
};
use crate::domain::page::{Page, Paged};
use crate::domain::user::UserSummary;
use crate::error::{CoreError, CoreResult};

// ============================================================================
// In-Memory Store
// ============================================================================
//
// Every repository call takes the single state lock for its whole duration,
// which gives each call the same all-or-nothing behaviour as a transaction.
//
// ============================================================================

struct Row<T> {
    seq: u64,
    value: T,
}

/// Why [`State::shift_stock`] wrote nothing.
#[derive(Debug, PartialEq, Eq)]
enum StockRefusal {
    Missing(Uuid),
    OutOfRange { product_id: Uuid, available: i32 },
}

#[derive(Default)]
struct State {
    next_seq: u64,
    products: HashMap<Uuid, Row<Product>>,
    configurations: HashMap<Uuid, Row<Configuration>>,
    orders: HashMap<Uuid, Row<Order>>,
    items: HashMap<Uuid, Vec<OrderItem>>,
    users: HashMap<Uuid, UserSummary>,
}

impl State {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// The only place relative stock changes are written. Applies every
    /// `(product, delta)` or none of them; each result must stay within
    /// `0..=i32::MAX`. Product ids must be distinct.
    fn shift_stock(&mut self, moves: &[(Uuid, i32)]) -> Result<Vec<i32>, StockRefusal> {
        let mut next = Vec::with_capacity(moves.len());
        for &(product_id, delta) in moves {
            let row = self
                .products
                .get(&product_id)
                .ok_or(StockRefusal::Missing(product_id))?;
            let stock = row
                .value
                .stock
                .checked_add(delta)
                .filter(|stock| *stock >= 0)
                .ok_or(StockRefusal::OutOfRange {
                    product_id,
                    available: row.value.stock,
                })?;
            next.push(stock);
        }

        let now = Utc::now();
        for (&(product_id, _), &stock) in moves.iter().zip(&next) {
            if let Some(row) = self.products.get_mut(&product_id) {
                row.value.stock = stock;
                row.value.updated_at = now;
            }
        }
        Ok(next)
    }

    fn newest_first<T: Clone>(rows: impl Iterator<Item = (DateTime<Utc>, u64, T)>) -> Vec<T> {
        let mut rows: Vec<_> = rows.collect();
        rows.sort_by(|a, b| (b.0, b.1).cmp(&(a.0, a.1)));
        rows.into_iter().map(|(_, _, value)| value).collect()
    }

    fn details(&self, order: &Order) -> OrderDetails {
        let items = self
            .items
            .get(&order.id)
            .map(|items| {
                items
                    .iter()
                    .map(|item| OrderItemDetails {
                        item: item.clone(),
                        product: self.products.get(&item.product_id).map(|row| row.value.summary()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        OrderDetails {
            order: order.clone(),
            items,
            owner: order.user_id.and_then(|id| self.users.get(&id).cloned()),
        }
    }

    fn orders_newest_first(&self) -> Vec<Order> {
        Self::newest_first(
            self.orders
                .values()
                .map(|row| (row.value.created_at, row.seq, row.value.clone())),
        )
    }

    fn live_orders_since(&self, since: DateTime<Utc>) -> impl Iterator<Item = &Order> {
        self.orders
            .values()
            .map(|row| &row.value)
            .filter(move |order| order.created_at >= since)
    }
}

pub struct InMemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Register a user record (normally written by the auth service).
    pub async fn insert_user(&self, user: UserSummary) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Simulate a persistence outage; every call fails while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self, operation: &'static str) -> CoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::store(operation, "in-memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> CoreResult<()> {
        self.check("insert_product")?;
        let mut state = self.state.write().await;
        if state.products.contains_key(&product.id) {
            return Err(CoreError::conflict(format!("Product {} already exists", product.id)));
        }
        let seq = state.seq();
        state.products.insert(product.id, Row { seq, value: product.clone() });
        Ok(())
    }

    async fn find_product(&self, id: Uuid) -> CoreResult<Option<Product>> {
        self.check("find_product")?;
        let state = self.state.read().await;
        Ok(state.products.get(&id).map(|row| row.value.clone()))
    }

    async fn find_products(&self, ids: &[Uuid]) -> CoreResult<Vec<Product>> {
        self.check("find_products")?;
        let state = self.state.read().await;
        let unique: HashSet<&Uuid> = ids.iter().collect();
        Ok(unique
            .into_iter()
            .filter_map(|id| state.products.get(id).map(|row| row.value.clone()))
            .collect())
    }

    async fn patch_product(&self, id: Uuid, patch: &ProductPatch) -> CoreResult<PatchOutcome> {
        self.check("patch_product")?;
        let mut state = self.state.write().await;
        let Some(current) = state.products.get(&id).map(|row| row.value.category) else {
            return Ok(PatchOutcome::Missing);
        };

        if patch.category.is_some_and(|category| category != current) {
            let configurations = state
                .configurations
                .values()
                .filter(|row| row.value.slots.references(id))
                .count() as i64;
            if configurations > 0 {
                return Ok(PatchOutcome::CategoryLocked { configurations });
            }
        }

        let Some(row) = state.products.get_mut(&id) else {
            return Ok(PatchOutcome::Missing);
        };
        patch.clone().apply(&mut row.value);
        row.value.updated_at = Utc::now();
        Ok(PatchOutcome::Updated(row.value.clone()))
    }

    async fn delete_product(&self, id: Uuid) -> CoreResult<DeleteOutcome> {
        self.check("delete_product")?;
        let mut state = self.state.write().await;
        if !state.products.contains_key(&id) {
            return Ok(DeleteOutcome::Missing);
        }

        let orders = state
            .orders
            .values()
            .filter(|row| row.value.status != OrderStatus::Cancelled)
            .filter(|row| {
                state
                    .items
                    .get(&row.value.id)
                    .is_some_and(|items| items.iter().any(|item| item.product_id == id))
            })
            .count() as i64;
        let configurations = state
            .configurations
            .values()
            .filter(|row| row.value.slots.references(id))
            .count() as i64;

        if orders > 0 || configurations > 0 {
            return Ok(DeleteOutcome::Referenced { orders, configurations });
        }

        state.products.remove(&id);
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_products(&self, filter: &ProductFilter, page: Page) -> CoreResult<Paged<Product>> {
        self.check("list_products")?;
        let state = self.state.read().await;
        let matching = State::newest_first(
            state
                .products
                .values()
                .filter(|row| filter.matches(&row.value))
                .map(|row| (row.value.created_at, row.seq, row.value.clone())),
        );
        Ok(Paged::from_ordered(matching, page))
    }

    async fn search_products(&self, term: &str, limit: u32) -> CoreResult<Vec<Product>> {
        self.check("search_products")?;
        let state = self.state.read().await;
        let mut found: Vec<Product> = state
            .products
            .values()
            .filter(|row| row.value.matches(term))
            .map(|row| row.value.clone())
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found.truncate(limit as usize);
        Ok(found)
    }
}

#[async_trait]
impl StockRepository for InMemoryStore {
    async fn apply_stock_delta(&self, id: Uuid, delta: i32) -> CoreResult<StockChange> {
        self.check("apply_stock_delta")?;
        let mut state = self.state.write().await;
        match state.shift_stock(&[(id, delta)]) {
            Ok(stock) => Ok(StockChange::Applied { stock: stock[0] }),
            Err(StockRefusal::Missing(_)) => Ok(StockChange::Missing),
            Err(StockRefusal::OutOfRange { available, .. }) => Ok(StockChange::Insufficient { available }),
        }
    }

    async fn set_stock(&self, id: Uuid, value: i32) -> CoreResult<Option<Product>> {
        self.check("set_stock")?;
        if value < 0 {
            return Err(CoreError::validation(format!("Stock cannot be negative: {}", value)));
        }
        let mut state = self.state.write().await;
        Ok(state.products.get_mut(&id).map(|row| {
            row.value.stock = value;
            row.value.updated_at = Utc::now();
            row.value.clone()
        }))
    }

    async fn products_below(&self, threshold: i32) -> CoreResult<Vec<Product>> {
        self.check("products_below")?;
        let state = self.state.read().await;
        let mut low: Vec<Product> = state
            .products
            .values()
            .filter(|row| row.value.stock < threshold)
            .map(|row| row.value.clone())
            .collect();
        low.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
        Ok(low)
    }
}

#[async_trait]
impl ConfigurationRepository for InMemoryStore {
    async fn insert_configuration(&self, configuration: &Configuration) -> CoreResult<()> {
        self.check("insert_configuration")?;
        let mut state = self.state.write().await;
        if let Some(missing) = configuration
            .slots
            .product_ids()
            .into_iter()
            .find(|id| !state.products.contains_key(id))
        {
            return Err(CoreError::conflict(format!("Product {} was removed from the catalog", missing)));
        }
        let seq = state.seq();
        state
            .configurations
            .insert(configuration.id, Row { seq, value: configuration.clone() });
        Ok(())
    }

    async fn replace_configuration(&self, configuration: &Configuration) -> CoreResult<bool> {
        self.check("replace_configuration")?;
        let mut state = self.state.write().await;
        if let Some(missing) = configuration
            .slots
            .product_ids()
            .into_iter()
            .find(|id| !state.products.contains_key(id))
        {
            return Err(CoreError::conflict(format!("Product {} was removed from the catalog", missing)));
        }
        let Some(row) = state.configurations.get_mut(&configuration.id) else {
            return Ok(false);
        };
        row.value.name = configuration.name.clone();
        row.value.slots = configuration.slots;
        row.value.total_price = configuration.total_price;
        row.value.updated_at = configuration.updated_at;
        Ok(true)
    }

    async fn find_configuration(&self, id: Uuid) -> CoreResult<Option<Configuration>> {
        self.check("find_configuration")?;
        let state = self.state.read().await;
        Ok(state.configurations.get(&id).map(|row| row.value.clone()))
    }

    async fn configurations_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Configuration>> {
        self.check("configurations_for_user")?;
        let state = self.state.read().await;
        Ok(State::newest_first(
            state
                .configurations
                .values()
                .filter(|row| row.value.user_id == user_id)
                .map(|row| (row.value.created_at, row.seq, row.value.clone())),
        ))
    }

    async fn delete_configuration(&self, id: Uuid) -> CoreResult<bool> {
        self.check("delete_configuration")?;
        let mut state = self.state.write().await;
        Ok(state.configurations.remove(&id).is_some())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, record: &NewOrderRecord, reserve_stock: bool) -> CoreResult<OrderWrite> {
        self.check("insert_order")?;
        let mut state = self.state.write().await;

        let mut requested: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in &record.items {
            let quantity = requested.entry(item.product_id).or_default();
            *quantity = quantity.saturating_add(item.quantity);
        }

        if let Some(&missing) = requested.keys().find(|id| !state.products.contains_key(*id)) {
            return Ok(OrderWrite::MissingProduct(missing));
        }

        if reserve_stock {
            let moves: Vec<(Uuid, i32)> = requested.iter().map(|(&id, &quantity)| (id, -quantity)).collect();
            match state.shift_stock(&moves) {
                Ok(_) => {}
                Err(StockRefusal::Missing(product_id)) => return Ok(OrderWrite::MissingProduct(product_id)),
                Err(StockRefusal::OutOfRange { product_id, available }) => {
                    return Ok(OrderWrite::InsufficientStock {
                        product_id,
                        requested: requested.get(&product_id).copied().unwrap_or_default(),
                        available,
                    })
                }
            }
        }

        let seq = state.seq();
        state.orders.insert(record.order.id, Row { seq, value: record.order.clone() });
        state.items.insert(record.order.id, record.items.clone());
        Ok(OrderWrite::Created)
    }

    async fn find_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        self.check("find_order")?;
        let state = self.state.read().await;
        Ok(state.orders.get(&id).map(|row| row.value.clone()))
    }

    async fn order_details(&self, id: Uuid) -> CoreResult<Option<OrderDetails>> {
        self.check("order_details")?;
        let state = self.state.read().await;
        Ok(state.orders.get(&id).map(|row| state.details(&row.value)))
    }

    async fn orders_for_user(&self, user_id: Uuid) -> CoreResult<Vec<OrderDetails>> {
        self.check("orders_for_user")?;
        let state = self.state.read().await;
        Ok(state
            .orders_newest_first()
            .iter()
            .filter(|order| order.user_id == Some(user_id))
            .map(|order| state.details(order))
            .collect())
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> CoreResult<Paged<OrderDetails>> {
        self.check("list_orders")?;
        let state = self.state.read().await;
        let matching: Vec<OrderDetails> = state
            .orders_newest_first()
            .iter()
            .filter(|order| filter.status.map_or(true, |status| order.status == status))
            .map(|order| state.details(order))
            .filter(|details| match filter.search.as_deref() {
                None => true,
                Some(term) => details.owner.as_ref().is_some_and(|owner| owner.matches(term)),
            })
            .collect();
        Ok(Paged::from_ordered(matching, page))
    }

    async fn transition_status(&self, change: &StatusChange) -> CoreResult<CasOutcome<Order>> {
        self.check("transition_status")?;
        let mut state = self.state.write().await;
        let Some(row) = state.orders.get(&change.order_id) else {
            return Ok(CasOutcome::Missing);
        };
        if row.value.status != change.expected {
            return Ok(CasOutcome::Stale);
        }

        if change.restock {
            let mut returned: BTreeMap<Uuid, i32> = BTreeMap::new();
            for item in state.items.get(&change.order_id).into_iter().flatten() {
                if state.products.contains_key(&item.product_id) {
                    let quantity = returned.entry(item.product_id).or_default();
                    *quantity = quantity.saturating_add(item.quantity);
                }
            }
            let moves: Vec<(Uuid, i32)> = returned.into_iter().collect();
            if let Err(refusal) = state.shift_stock(&moves) {
                return Err(CoreError::conflict(match refusal {
                    StockRefusal::OutOfRange { product_id, available } => format!(
                        "Returning reserved units to product {} would overflow its stock of {}",
                        product_id, available
                    ),
                    StockRefusal::Missing(product_id) => {
                        format!("Product {} vanished while returning reserved units", product_id)
                    }
                }));
            }
        }

        let now = Utc::now();

        let Some(row) = state.orders.get_mut(&change.order_id) else {
            return Ok(CasOutcome::Missing);
        };
        row.value.status = change.next;
        if let Some(tracking) = &change.tracking_number {
            row.value.tracking_number = Some(tracking.clone());
        }
        row.value.version += 1;
        row.value.updated_at = now;
        Ok(CasOutcome::Applied(row.value.clone()))
    }

    async fn transition_payment(
        &self,
        order_id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> CoreResult<CasOutcome<Order>> {
        self.check("transition_payment")?;
        let mut state = self.state.write().await;
        let Some(row) = state.orders.get_mut(&order_id) else {
            return Ok(CasOutcome::Missing);
        };
        if row.value.payment_status != expected {
            return Ok(CasOutcome::Stale);
        }
        row.value.payment_status = next;
        row.value.version += 1;
        row.value.updated_at = Utc::now();
        Ok(CasOutcome::Applied(row.value.clone()))
    }
}

#[async_trait]
impl AnalyticsRepository for InMemoryStore {
    async fn totals(&self, low_stock_threshold: i32) -> CoreResult<StoreTotals> {
        self.check("totals")?;
        let state = self.state.read().await;
        let orders = state.orders.values().map(|row| &row.value);
        Ok(StoreTotals {
            products: state.products.len() as i64,
            orders: state.orders.len() as i64,
            users: state.users.len() as i64,
            revenue: orders
                .clone()
                .filter(|order| order.payment_status == PaymentStatus::Completed)
                .map(|order| order.total_amount)
                .sum(),
            pending_orders: orders.filter(|order| order.status == OrderStatus::Pending).count() as i64,
            low_stock: state
                .products
                .values()
                .filter(|row| row.value.stock < low_stock_threshold)
                .count() as i64,
        })
    }

    async fn daily_sales(&self, since: DateTime<Utc>, completed_only: bool) -> CoreResult<Vec<DailyBucket>> {
        self.check("daily_sales")?;
        let state = self.state.read().await;
        let mut buckets: BTreeMap<NaiveDate, (Decimal, i64)> = BTreeMap::new();
        for order in state.live_orders_since(since) {
            if completed_only && order.payment_status != PaymentStatus::Completed {
                continue;
            }
            let bucket = buckets.entry(order.created_at.date_naive()).or_default();
            bucket.0 += order.total_amount;
            bucket.1 += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|(date, (total, orders))| DailyBucket { date, total, orders })
            .collect())
    }

    async fn status_counts(&self, since: DateTime<Utc>) -> CoreResult<Vec<StatusCount>> {
        self.check("status_counts")?;
        let state = self.state.read().await;
        let mut counts: HashMap<OrderStatus, i64> = HashMap::new();
        for order in state.live_orders_since(since) {
            *counts.entry(order.status).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }

    async fn top_products(&self, since: DateTime<Utc>, limit: u32) -> CoreResult<Vec<TopProduct>> {
        self.check("top_products")?;
        let state = self.state.read().await;
        let mut sold: HashMap<Uuid, TopProduct> = HashMap::new();
        for order in state.live_orders_since(since) {
            if order.status == OrderStatus::Cancelled {
                continue;
            }
            for item in state.items.get(&order.id).into_iter().flatten() {
                let entry = sold.entry(item.product_id).or_insert_with(|| TopProduct {
                    product_id: item.product_id,
                    name: item.product_name.clone(),
                    quantity_sold: 0,
                    revenue: Decimal::ZERO,
                });
                entry.quantity_sold += item.quantity as i64;
                entry.revenue += item.line_total();
            }
        }
        let mut ranked: Vec<TopProduct> = sold.into_values().collect();
        ranked.sort_by(|a, b| {
            b.quantity_sold
                .cmp(&a.quantity_sold)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        ranked.truncate(limit as usize);
        Ok(ranked)
    }

    async fn category_stats(&self) -> CoreResult<Vec<CategoryStat>> {
        self.check("category_stats")?;
        let state = self.state.read().await;
        let mut grouped: BTreeMap<Category, (i64, Decimal)> = BTreeMap::new();
        for row in state.products.values() {
            let entry = grouped.entry(row.value.category).or_default();
            entry.0 += 1;
            entry.1 += row.value.price;
        }
        Ok(grouped
            .into_iter()
            .map(|(category, (count, sum))| CategoryStat {
                category,
                count,
                average_price: (sum / Decimal::from(count))
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
            })
            .collect())
    }

    async fn user_activity(&self, since: DateTime<Utc>) -> CoreResult<UserActivity> {
        self.check("user_activity")?;
        let state = self.state.read().await;
        let mut first_order: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        let mut active: HashSet<Uuid> = HashSet::new();
        for row in state.orders.values() {
            let Some(user_id) = row.value.user_id else {
                continue;
            };
            let first = first_order.entry(user_id).or_insert(row.value.created_at);
            *first = (*first).min(row.value.created_at);
            if row.value.created_at >= since {
                active.insert(user_id);
            }
        }

        let mut activity = UserActivity::default();
        for user_id in active {
            if first_order.get(&user_id).is_some_and(|first| *first >= since) {
                activity.new_users += 1;
            } else {
                activity.returning_users += 1;
            }
        }
        Ok(activity)
    }

    async fn recent_orders(&self, limit: u32) -> CoreResult<Vec<OrderDetails>> {
        self.check("recent_orders")?;
        let state = self.state.read().await;
        Ok(state
            .orders_newest_first()
            .iter()
            .take(limit as usize)
            .map(|order| state.details(order))
            .collect())
    }
}

#[async_trait]
impl StoreHealth for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> CoreResult<()> {
        self.check("ping")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::new_product;

    fn product(stock: i32) -> Product {
        let input = new_product(Category::Ram, "DDR5 32GB", Decimal::new(11900, 2), stock);
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            category: input.category,
            name: input.name,
            brand: input.brand,
            model: input.model,
            price: input.price,
            attributes: input.attributes,
            compatibility_tags: input.compatibility_tags,
            stock: input.stock,
            created_at: now,
            updated_at: now,
        }
    }

    fn state_with(products: &[&Product]) -> State {
        let mut state = State::default();
        for product in products {
            let seq = state.seq();
            state.products.insert(
                product.id,
                Row {
                    seq,
                    value: (*product).clone(),
                },
            );
        }
        state
    }

    #[test]
    fn test_shift_stock_is_all_or_nothing() {
        let plenty = product(10);
        let scarce = product(1);
        let mut state = state_with(&[&plenty, &scarce]);

        let refused = state.shift_stock(&[(plenty.id, -4), (scarce.id, -2)]).unwrap_err();
        assert_eq!(
            refused,
            StockRefusal::OutOfRange {
                product_id: scarce.id,
                available: 1
            }
        );
        assert_eq!(state.products[&plenty.id].value.stock, 10);

        assert_eq!(state.shift_stock(&[(plenty.id, -4), (scarce.id, -1)]).unwrap(), vec![6, 0]);
        assert_eq!(state.products[&scarce.id].value.stock, 0);
    }

    #[test]
    fn test_shift_stock_refuses_overflow() {
        let full = product(i32::MAX);
        let mut state = state_with(&[&full]);

        let refused = state.shift_stock(&[(full.id, 1)]).unwrap_err();
        assert_eq!(
            refused,
            StockRefusal::OutOfRange {
                product_id: full.id,
                available: i32::MAX
            }
        );
        assert_eq!(state.products[&full.id].value.stock, i32::MAX);
        assert_eq!(
            state.shift_stock(&[(Uuid::nil(), 1)]).unwrap_err(),
            StockRefusal::Missing(Uuid::nil())
        );
    }

    #[tokio::test]
    async fn test_set_stock_rejects_negative_values() {
        let store = InMemoryStore::new();
        let err = store.set_stock(Uuid::new_v4(), -1).await.unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}

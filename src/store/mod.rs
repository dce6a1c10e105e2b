use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::analytics::{CategoryStat, DailyBucket, StatusCount, StoreTotals, TopProduct, UserActivity};
use crate::domain::catalog::{Product, ProductFilter, ProductPatch};
use crate::domain::configuration::Configuration;
use crate::domain::order::{Order, OrderDetails, OrderFilter, OrderItem, OrderStatus, PaymentStatus};
use crate::domain::page::{Page, Paged};
use crate::error::CoreResult;

// ============================================================================
// Store Layer - Repository Interfaces
// ============================================================================
//
// One trait per entity. Each method is a single atomic unit against the
// backing store; components compose them but never reach around them.
//
// Backends:
// - postgres  - PgStore (sqlx), production
// - memory    - InMemoryStore, development and tests
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Missing,
    /// Still referenced; nothing was removed.
    Referenced { orders: i64, configurations: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PatchOutcome {
    Updated(Product),
    Missing,
    /// Category change refused while saved configurations hold the product.
    CategoryLocked { configurations: i64 },
}

/// Result of one conditional stock update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    Applied { stock: i32 },
    Insufficient { available: i32 },
    Missing,
}

/// Order row plus its items, written as one transaction.
#[derive(Debug, Clone)]
pub struct NewOrderRecord {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderWrite {
    Created,
    MissingProduct(Uuid),
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },
}

/// Compare-and-set of an order's status.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub order_id: Uuid,
    pub expected: OrderStatus,
    pub next: OrderStatus,
    pub tracking_number: Option<String>,
    /// Return reserved units to stock in the same transaction. A restock
    /// that would overflow a product's stock fails with a conflict and
    /// leaves the order untouched.
    pub restock: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome<T> {
    Applied(T),
    /// The expected value no longer holds.
    Stale,
    Missing,
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn insert_product(&self, product: &Product) -> CoreResult<()>;

    async fn find_product(&self, id: Uuid) -> CoreResult<Option<Product>>;

    /// Products for the given ids; missing ids are simply absent.
    async fn find_products(&self, ids: &[Uuid]) -> CoreResult<Vec<Product>>;

    /// Apply the present fields of a normalized patch to the current row in
    /// one unit. Stock is never written here.
    async fn patch_product(&self, id: Uuid, patch: &ProductPatch) -> CoreResult<PatchOutcome>;

    /// Reference check and delete in one unit.
    async fn delete_product(&self, id: Uuid) -> CoreResult<DeleteOutcome>;

    /// Newest first.
    async fn list_products(&self, filter: &ProductFilter, page: Page) -> CoreResult<Paged<Product>>;

    async fn search_products(&self, term: &str, limit: u32) -> CoreResult<Vec<Product>>;
}

#[async_trait]
pub trait StockRepository: Send + Sync {
    /// `stock += delta` only if the result stays within `0..=i32::MAX`.
    /// Every relative stock write in a backend goes through the same check.
    async fn apply_stock_delta(&self, id: Uuid, delta: i32) -> CoreResult<StockChange>;

    async fn set_stock(&self, id: Uuid, value: i32) -> CoreResult<Option<Product>>;

    /// `stock < threshold`, lowest stock first.
    async fn products_below(&self, threshold: i32) -> CoreResult<Vec<Product>>;
}

#[async_trait]
pub trait ConfigurationRepository: Send + Sync {
    async fn insert_configuration(&self, configuration: &Configuration) -> CoreResult<()>;

    /// Full replace of name, slots and total. `false` if the row is gone.
    async fn replace_configuration(&self, configuration: &Configuration) -> CoreResult<bool>;

    async fn find_configuration(&self, id: Uuid) -> CoreResult<Option<Configuration>>;

    /// Newest first.
    async fn configurations_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Configuration>>;

    async fn delete_configuration(&self, id: Uuid) -> CoreResult<bool>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Order + items (+ stock reservation when asked) as one transaction.
    async fn insert_order(&self, record: &NewOrderRecord, reserve_stock: bool) -> CoreResult<OrderWrite>;

    async fn find_order(&self, id: Uuid) -> CoreResult<Option<Order>>;

    async fn order_details(&self, id: Uuid) -> CoreResult<Option<OrderDetails>>;

    /// Newest first.
    async fn orders_for_user(&self, user_id: Uuid) -> CoreResult<Vec<OrderDetails>>;

    /// Newest first.
    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> CoreResult<Paged<OrderDetails>>;

    async fn transition_status(&self, change: &StatusChange) -> CoreResult<CasOutcome<Order>>;

    async fn transition_payment(
        &self,
        order_id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> CoreResult<CasOutcome<Order>>;
}

/// Grouped read queries. Aggregation happens inside the store.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn totals(&self, low_stock_threshold: i32) -> CoreResult<StoreTotals>;

    /// Per-date sums of order totals since `since`, dates without orders omitted.
    async fn daily_sales(&self, since: DateTime<Utc>, completed_only: bool) -> CoreResult<Vec<DailyBucket>>;

    async fn status_counts(&self, since: DateTime<Utc>) -> CoreResult<Vec<StatusCount>>;

    /// By quantity sold, cancelled orders excluded.
    async fn top_products(&self, since: DateTime<Utc>, limit: u32) -> CoreResult<Vec<TopProduct>>;

    async fn category_stats(&self) -> CoreResult<Vec<CategoryStat>>;

    async fn user_activity(&self, since: DateTime<Utc>) -> CoreResult<UserActivity>;

    async fn recent_orders(&self, limit: u32) -> CoreResult<Vec<OrderDetails>>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn ping(&self) -> CoreResult<()>;
}

/// Everything a single backend provides.
pub trait Store:
    ProductRepository + StockRepository + ConfigurationRepository + OrderRepository + AnalyticsRepository + StoreHealth
{
}

impl<T> Store for T where
    T: ProductRepository
        + StockRepository
        + ConfigurationRepository
        + OrderRepository
        + AnalyticsRepository
        + StoreHealth
{
}

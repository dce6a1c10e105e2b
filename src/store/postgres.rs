use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Executor, FromRow, Postgres};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

use super::{
    AnalyticsRepository, CasOutcome, ConfigurationRepository, DeleteOutcome, NewOrderRecord, OrderRepository,
    OrderWrite, PatchOutcome, ProductRepository, StatusChange, StockChange, StockRepository, StoreHealth,
};
use crate::config::DatabaseConfig;
use crate::domain::analytics::{CategoryStat, DailyBucket, StatusCount, StoreTotals, TopProduct, UserActivity};
use crate::domain::catalog::{Product, ProductAttributes, ProductFilter, ProductPatch, ProductSummary};
use crate::domain::configuration::{Configuration, SlotMap};
use crate::domain::order::{
    Order, OrderDetails, OrderFilter, OrderItem, OrderItemDetails, OrderStatus, PaymentStatus, ShippingAddress,
};
use crate::domain::page::{Page, Paged};
use crate::domain::user::UserSummary;
use crate::error::{CoreError, CoreResult};

// ============================================================================
// PostgreSQL Store
// ============================================================================
//
// - Stock changes are one conditional UPDATE (`stock + delta` within 0..=i32::MAX)
// - Order + items (+ reservation) share one transaction
// - Status changes are compare-and-set on the current status
// - Analytics are GROUP BY queries; rows are never loaded for counting
//
// ============================================================================

const PRODUCT_COLUMNS: &str =
    "id, category, name, brand, model, price, attributes, compatibility_tags, stock, created_at, updated_at";

const CONFIGURATION_COLUMNS: &str = "id, user_id, name, cpu_id, motherboard_id, ram_id, storage_id, gpu_id, \
     psu_id, case_id, total_price, created_at, updated_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("database url is not configured"))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await?;

        if config.run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Database migrations applied");
        }

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub(crate) fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach items, product summaries and owners to a page of orders.
    async fn attach_details(&self, orders: Vec<Order>) -> CoreResult<Vec<OrderDetails>> {
        if orders.is_empty() {
            return Ok(Vec::new());
        }

        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let user_ids: Vec<Uuid> = orders.iter().filter_map(|o| o.user_id).collect();

        let item_rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT oi.id, oi.order_id, oi.product_id, oi.product_name, oi.quantity, oi.price,
                    p.category AS p_category, p.name AS p_name, p.brand AS p_brand, p.price AS p_price
             FROM order_items oi
             LEFT JOIN products p ON p.id = oi.product_id
             WHERE oi.order_id = ANY($1)
             ORDER BY oi.order_id, oi.position",
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(db("load_order_items"))?;

        let owners: Vec<UserRow> = if user_ids.is_empty() {
            Vec::new()
        } else {
            sqlx::query_as("SELECT id, name, email, created_at FROM users WHERE id = ANY($1)")
                .bind(&user_ids)
                .fetch_all(&self.pool)
                .await
                .map_err(db("load_order_owners"))?
        };
        let owners: HashMap<Uuid, UserSummary> = owners
            .into_iter()
            .map(|row| (row.id, UserSummary::from(row)))
            .collect();

        let mut items: HashMap<Uuid, Vec<OrderItemDetails>> = HashMap::new();
        for row in item_rows {
            let order_id = row.order_id;
            items.entry(order_id).or_default().push(row.into_details()?);
        }

        Ok(orders
            .into_iter()
            .map(|order| OrderDetails {
                items: items.remove(&order.id).unwrap_or_default(),
                owner: order.user_id.and_then(|id| owners.get(&id).cloned()),
                order,
            })
            .collect())
    }
}

// ============================================================================
// Error mapping
// ============================================================================

/// Constraint violations are conflicts; anything else is an outage.
fn map_db_error(operation: &'static str, err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        match db_err.code().as_deref() {
            Some("23503") => {
                tracing::warn!(operation = operation, error = %db_err, "Foreign key violation");
                return CoreError::conflict("A referenced record was changed or removed concurrently");
            }
            Some("23505") => return CoreError::conflict("Record already exists"),
            Some("23514") => {
                tracing::warn!(operation = operation, error = %db_err, "Check constraint violation");
                return CoreError::conflict("Write would violate a stored invariant");
            }
            _ => {}
        }
    }
    CoreError::store(operation, err)
}

fn db(operation: &'static str) -> impl FnOnce(sqlx::Error) -> CoreError {
    move |err| map_db_error(operation, err)
}

fn corrupt(operation: &'static str, err: CoreError) -> CoreError {
    CoreError::store(operation, format!("undecodable row: {}", err))
}

fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// The one statement that moves stock; shared by the ledger, order
/// reservations and cancellation restocks. `None` when the product is gone
/// or the result would leave `0..=i32::MAX`.
async fn conditional_stock_update<'e, E>(executor: E, id: Uuid, delta: i32) -> Result<Option<i32>, sqlx::Error>
where
    E: Executor<'e, Database = Postgres>,
{
    // Widened so an overflowing sum is refused instead of raising an error.
    sqlx::query_scalar(
        "UPDATE products SET stock = stock + $2, updated_at = now()
         WHERE id = $1 AND stock::bigint + $2 BETWEEN 0 AND 2147483647
         RETURNING stock",
    )
    .bind(id)
    .bind(delta)
    .fetch_optional(executor)
    .await
}

// ============================================================================
// Row types
// ============================================================================

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    category: String,
    name: String,
    brand: String,
    model: String,
    price: Decimal,
    attributes: Json<ProductAttributes>,
    compatibility_tags: Vec<String>,
    stock: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = CoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Product {
            id: row.id,
            category: row.category.parse().map_err(|e| corrupt("decode_product", e))?,
            name: row.name,
            brand: row.brand,
            model: row.model,
            price: row.price,
            attributes: row.attributes.0,
            compatibility_tags: row.compatibility_tags,
            stock: row.stock,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn products_from(rows: Vec<ProductRow>) -> CoreResult<Vec<Product>> {
    rows.into_iter().map(Product::try_from).collect()
}

#[derive(FromRow)]
struct ConfigurationRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    cpu_id: Option<Uuid>,
    motherboard_id: Option<Uuid>,
    ram_id: Option<Uuid>,
    storage_id: Option<Uuid>,
    gpu_id: Option<Uuid>,
    psu_id: Option<Uuid>,
    case_id: Option<Uuid>,
    total_price: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ConfigurationRow> for Configuration {
    fn from(row: ConfigurationRow) -> Self {
        Configuration {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            slots: SlotMap {
                cpu: row.cpu_id,
                motherboard: row.motherboard_id,
                ram: row.ram_id,
                storage: row.storage_id,
                gpu: row.gpu_id,
                psu: row.psu_id,
                case: row.case_id,
            },
            total_price: row.total_price,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Option<Uuid>,
    shipping_full_name: String,
    shipping_street: String,
    shipping_city: String,
    shipping_state: String,
    shipping_postal_code: String,
    shipping_country: String,
    shipping_phone: Option<String>,
    payment_method: String,
    total_amount: Decimal,
    status: String,
    payment_status: String,
    tracking_number: Option<String>,
    stock_reserved: bool,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = CoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: row.id,
            user_id: row.user_id,
            shipping: ShippingAddress {
                full_name: row.shipping_full_name,
                street: row.shipping_street,
                city: row.shipping_city,
                state: row.shipping_state,
                postal_code: row.shipping_postal_code,
                country: row.shipping_country,
                phone: row.shipping_phone,
            },
            payment_method: row.payment_method.parse().map_err(|e| corrupt("decode_order", e))?,
            total_amount: row.total_amount,
            status: row.status.parse().map_err(|e| corrupt("decode_order", e))?,
            payment_status: row.payment_status.parse().map_err(|e| corrupt("decode_order", e))?,
            tracking_number: row.tracking_number,
            stock_reserved: row.stock_reserved,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn orders_from(rows: Vec<OrderRow>) -> CoreResult<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

#[derive(FromRow)]
struct ItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    price: Decimal,
    p_category: Option<String>,
    p_name: Option<String>,
    p_brand: Option<String>,
    p_price: Option<Decimal>,
}

impl ItemRow {
    fn into_details(self) -> CoreResult<OrderItemDetails> {
        let product = match (self.p_category, self.p_name, self.p_brand, self.p_price) {
            (Some(category), Some(name), Some(brand), Some(price)) => Some(ProductSummary {
                id: self.product_id,
                category: category.parse().map_err(|e| corrupt("decode_order_item", e))?,
                name,
                brand,
                price,
            }),
            _ => None,
        };

        Ok(OrderItemDetails {
            item: OrderItem {
                id: self.id,
                order_id: self.order_id,
                product_id: self.product_id,
                product_name: self.product_name,
                quantity: self.quantity,
                price: self.price,
            },
            product,
        })
    }
}

#[derive(FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for UserSummary {
    fn from(row: UserRow) -> Self {
        UserSummary {
            id: row.id,
            name: row.name,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct TotalsRow {
    products: i64,
    orders: i64,
    users: i64,
    revenue: Decimal,
    pending_orders: i64,
    low_stock: i64,
}

#[derive(FromRow)]
struct BucketRow {
    date: NaiveDate,
    total: Decimal,
    orders: i64,
}

#[derive(FromRow)]
struct TopProductRow {
    product_id: Uuid,
    name: String,
    quantity_sold: i64,
    revenue: Decimal,
}

#[derive(FromRow)]
struct CategoryRow {
    category: String,
    count: i64,
    average_price: Decimal,
}

// ============================================================================
// Repository implementations
// ============================================================================

#[async_trait]
impl ProductRepository for PgStore {
    async fn insert_product(&self, product: &Product) -> CoreResult<()> {
        let sql = format!(
            "INSERT INTO products ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            PRODUCT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(product.id)
            .bind(product.category.as_str())
            .bind(&product.name)
            .bind(&product.brand)
            .bind(&product.model)
            .bind(product.price)
            .bind(Json(&product.attributes))
            .bind(&product.compatibility_tags)
            .bind(product.stock)
            .bind(product.created_at)
            .bind(product.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db("insert_product"))?;
        Ok(())
    }

    async fn find_product(&self, id: Uuid) -> CoreResult<Option<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("find_product"))?;
        row.map(Product::try_from).transpose()
    }

    async fn find_products(&self, ids: &[Uuid]) -> CoreResult<Vec<Product>> {
        let sql = format!("SELECT {} FROM products WHERE id = ANY($1)", PRODUCT_COLUMNS);
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(db("find_products"))?;
        products_from(rows)
    }

    async fn patch_product(&self, id: Uuid, patch: &ProductPatch) -> CoreResult<PatchOutcome> {
        let mut tx = self.pool.begin().await.map_err(db("patch_product"))?;

        // Configuration inserts take KEY SHARE on the product, so the count
        // below cannot miss a configuration committed after this lock.
        let current: Option<String> = sqlx::query_scalar("SELECT category FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db("patch_product"))?;
        let Some(current) = current else {
            tx.rollback().await.map_err(db("patch_product"))?;
            return Ok(PatchOutcome::Missing);
        };

        if let Some(category) = patch.category.filter(|c| c.as_str() != current) {
            let configurations: i64 = sqlx::query_scalar(
                "SELECT count(*) FROM configurations
                 WHERE $1 IN (cpu_id, motherboard_id, ram_id, storage_id, gpu_id, psu_id, case_id)",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(db("patch_product"))?;
            if configurations > 0 {
                tx.rollback().await.map_err(db("patch_product"))?;
                tracing::debug!(product_id = %id, category = %category, "Category change blocked");
                return Ok(PatchOutcome::CategoryLocked { configurations });
            }
        }

        let sql = format!(
            "UPDATE products
             SET category = COALESCE($2::text, category),
                 name = COALESCE($3::text, name),
                 brand = COALESCE($4::text, brand),
                 model = COALESCE($5::text, model),
                 price = COALESCE($6::numeric, price),
                 attributes = COALESCE($7::jsonb, attributes),
                 compatibility_tags = COALESCE($8::text[], compatibility_tags),
                 updated_at = now()
             WHERE id = $1
             RETURNING {}",
            PRODUCT_COLUMNS
        );
        let row: ProductRow = sqlx::query_as(&sql)
            .bind(id)
            .bind(patch.category.map(|c| c.as_str()))
            .bind(patch.name.as_deref())
            .bind(patch.brand.as_deref())
            .bind(patch.model.as_deref())
            .bind(patch.price)
            .bind(patch.attributes.as_ref().map(Json))
            .bind(patch.compatibility_tags.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(db("patch_product"))?;
        tx.commit().await.map_err(db("patch_product"))?;
        Ok(PatchOutcome::Updated(Product::try_from(row)?))
    }

    async fn delete_product(&self, id: Uuid) -> CoreResult<DeleteOutcome> {
        let mut tx = self.pool.begin().await.map_err(db("delete_product"))?;

        // Row lock serializes against order inserts, which lock products FOR SHARE.
        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db("delete_product"))?;
        if locked.is_none() {
            return Ok(DeleteOutcome::Missing);
        }

        let (orders, configurations): (i64, i64) = sqlx::query_as(
            "SELECT
                (SELECT count(DISTINCT o.id)
                 FROM orders o JOIN order_items oi ON oi.order_id = o.id
                 WHERE oi.product_id = $1 AND o.status <> 'cancelled'),
                (SELECT count(*) FROM configurations
                 WHERE $1 IN (cpu_id, motherboard_id, ram_id, storage_id, gpu_id, psu_id, case_id))",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db("delete_product"))?;

        if orders > 0 || configurations > 0 {
            tx.rollback().await.map_err(db("delete_product"))?;
            return Ok(DeleteOutcome::Referenced { orders, configurations });
        }

        sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db("delete_product"))?;
        tx.commit().await.map_err(db("delete_product"))?;
        Ok(DeleteOutcome::Deleted)
    }

    async fn list_products(&self, filter: &ProductFilter, page: Page) -> CoreResult<Paged<Product>> {
        let category = filter.category.map(|c| c.as_str());
        let pattern = filter.search.as_deref().map(like_pattern);
        let predicate = "($1::text IS NULL OR category = $1)
             AND ($2::text IS NULL OR name ILIKE $2 OR brand ILIKE $2 OR model ILIKE $2)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT count(*) FROM products WHERE {}", predicate))
            .bind(category)
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(db("count_products"))?;

        let sql = format!(
            "SELECT {} FROM products WHERE {} ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
            PRODUCT_COLUMNS, predicate
        );
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(category)
            .bind(pattern.as_deref())
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db("list_products"))?;

        Ok(Paged::new(products_from(rows)?, total as u64, page))
    }

    async fn search_products(&self, term: &str, limit: u32) -> CoreResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products
             WHERE name ILIKE $1 OR brand ILIKE $1 OR model ILIKE $1
             ORDER BY name LIMIT $2",
            PRODUCT_COLUMNS
        );
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(like_pattern(term))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db("search_products"))?;
        products_from(rows)
    }
}

#[async_trait]
impl StockRepository for PgStore {
    async fn apply_stock_delta(&self, id: Uuid, delta: i32) -> CoreResult<StockChange> {
        if let Some(stock) = conditional_stock_update(&self.pool, id, delta)
            .await
            .map_err(db("apply_stock_delta"))?
        {
            return Ok(StockChange::Applied { stock });
        }

        let available: Option<i32> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("apply_stock_delta"))?;
        Ok(match available {
            Some(available) => StockChange::Insufficient { available },
            None => StockChange::Missing,
        })
    }

    async fn set_stock(&self, id: Uuid, value: i32) -> CoreResult<Option<Product>> {
        let sql = format!(
            "UPDATE products SET stock = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            PRODUCT_COLUMNS
        );
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("set_stock"))?;
        row.map(Product::try_from).transpose()
    }

    async fn products_below(&self, threshold: i32) -> CoreResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE stock < $1 ORDER BY stock ASC, name ASC",
            PRODUCT_COLUMNS
        );
        let rows: Vec<ProductRow> = sqlx::query_as(&sql)
            .bind(threshold)
            .fetch_all(&self.pool)
            .await
            .map_err(db("products_below"))?;
        products_from(rows)
    }
}

#[async_trait]
impl ConfigurationRepository for PgStore {
    async fn insert_configuration(&self, configuration: &Configuration) -> CoreResult<()> {
        let slots = &configuration.slots;
        let sql = format!(
            "INSERT INTO configurations ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            CONFIGURATION_COLUMNS
        );
        sqlx::query(&sql)
            .bind(configuration.id)
            .bind(configuration.user_id)
            .bind(&configuration.name)
            .bind(slots.cpu)
            .bind(slots.motherboard)
            .bind(slots.ram)
            .bind(slots.storage)
            .bind(slots.gpu)
            .bind(slots.psu)
            .bind(slots.case)
            .bind(configuration.total_price)
            .bind(configuration.created_at)
            .bind(configuration.updated_at)
            .execute(&self.pool)
            .await
            .map_err(db("insert_configuration"))?;
        Ok(())
    }

    async fn replace_configuration(&self, configuration: &Configuration) -> CoreResult<bool> {
        let slots = &configuration.slots;
        let result = sqlx::query(
            "UPDATE configurations
             SET name = $2, cpu_id = $3, motherboard_id = $4, ram_id = $5, storage_id = $6,
                 gpu_id = $7, psu_id = $8, case_id = $9, total_price = $10, updated_at = $11
             WHERE id = $1",
        )
        .bind(configuration.id)
        .bind(&configuration.name)
        .bind(slots.cpu)
        .bind(slots.motherboard)
        .bind(slots.ram)
        .bind(slots.storage)
        .bind(slots.gpu)
        .bind(slots.psu)
        .bind(slots.case)
        .bind(configuration.total_price)
        .bind(configuration.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db("replace_configuration"))?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_configuration(&self, id: Uuid) -> CoreResult<Option<Configuration>> {
        let sql = format!("SELECT {} FROM configurations WHERE id = $1", CONFIGURATION_COLUMNS);
        let row: Option<ConfigurationRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("find_configuration"))?;
        Ok(row.map(Configuration::from))
    }

    async fn configurations_for_user(&self, user_id: Uuid) -> CoreResult<Vec<Configuration>> {
        let sql = format!(
            "SELECT {} FROM configurations WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            CONFIGURATION_COLUMNS
        );
        let rows: Vec<ConfigurationRow> = sqlx::query_as(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(db("configurations_for_user"))?;
        Ok(rows.into_iter().map(Configuration::from).collect())
    }

    async fn delete_configuration(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM configurations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(db("delete_configuration"))?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl OrderRepository for PgStore {
    async fn insert_order(&self, record: &NewOrderRecord, reserve_stock: bool) -> CoreResult<OrderWrite> {
        let mut requested: BTreeMap<Uuid, i32> = BTreeMap::new();
        for item in &record.items {
            let quantity = requested.entry(item.product_id).or_default();
            *quantity = quantity.saturating_add(item.quantity);
        }
        let product_ids: Vec<Uuid> = requested.keys().copied().collect();

        let mut tx = self.pool.begin().await.map_err(db("insert_order"))?;

        // Locks are taken in id order. Reserving takes them exclusively up front
        // so two reservations never both hold a share lock and then upgrade.
        let lock_sql = if reserve_stock {
            "SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE"
        } else {
            "SELECT id FROM products WHERE id = ANY($1) ORDER BY id FOR SHARE"
        };
        let locked: Vec<Uuid> = sqlx::query_scalar(lock_sql)
            .bind(&product_ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(db("insert_order"))?;
        if let Some(missing) = product_ids.iter().find(|id| !locked.contains(id)) {
            tx.rollback().await.map_err(db("insert_order"))?;
            return Ok(OrderWrite::MissingProduct(*missing));
        }

        if reserve_stock {
            for (&product_id, &quantity) in &requested {
                let reserved = conditional_stock_update(&mut *tx, product_id, -quantity)
                    .await
                    .map_err(db("reserve_stock"))?;
                if reserved.is_none() {
                    let available: i32 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
                        .bind(product_id)
                        .fetch_one(&mut *tx)
                        .await
                        .map_err(db("reserve_stock"))?;
                    tx.rollback().await.map_err(db("insert_order"))?;
                    return Ok(OrderWrite::InsufficientStock {
                        product_id,
                        requested: quantity,
                        available,
                    });
                }
            }
        }

        let order = &record.order;
        sqlx::query(
            "INSERT INTO orders (
                id, user_id, shipping_full_name, shipping_street, shipping_city, shipping_state,
                shipping_postal_code, shipping_country, shipping_phone, payment_method, total_amount,
                status, payment_status, tracking_number, stock_reserved, version, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(&order.shipping.full_name)
        .bind(&order.shipping.street)
        .bind(&order.shipping.city)
        .bind(&order.shipping.state)
        .bind(&order.shipping.postal_code)
        .bind(&order.shipping.country)
        .bind(&order.shipping.phone)
        .bind(order.payment_method.as_str())
        .bind(order.total_amount)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.tracking_number)
        .bind(order.stock_reserved)
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db("insert_order"))?;

        for (position, item) in record.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, position, product_id, product_name, quantity, price)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await
            .map_err(db("insert_order_item"))?;
        }

        tx.commit().await.map_err(db("insert_order"))?;
        Ok(OrderWrite::Created)
    }

    async fn find_order(&self, id: Uuid) -> CoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db("find_order"))?;
        row.map(Order::try_from).transpose()
    }

    async fn order_details(&self, id: Uuid) -> CoreResult<Option<OrderDetails>> {
        let Some(order) = self.find_order(id).await? else {
            return Ok(None);
        };
        Ok(self.attach_details(vec![order]).await?.pop())
    }

    async fn orders_for_user(&self, user_id: Uuid) -> CoreResult<Vec<OrderDetails>> {
        let rows: Vec<OrderRow> =
            sqlx::query_as("SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db("orders_for_user"))?;
        self.attach_details(orders_from(rows)?).await
    }

    async fn list_orders(&self, filter: &OrderFilter, page: Page) -> CoreResult<Paged<OrderDetails>> {
        let status = filter.status.map(|s| s.as_str());
        let pattern = filter.search.as_deref().map(like_pattern);
        let from = "FROM orders o LEFT JOIN users u ON u.id = o.user_id
             WHERE ($1::text IS NULL OR o.status = $1)
               AND ($2::text IS NULL OR u.name ILIKE $2 OR u.email ILIKE $2)";

        let total: i64 = sqlx::query_scalar(&format!("SELECT count(*) {}", from))
            .bind(status)
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(db("count_orders"))?;

        let sql = format!(
            "SELECT o.* {} ORDER BY o.created_at DESC, o.id DESC LIMIT $3 OFFSET $4",
            from
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(status)
            .bind(pattern.as_deref())
            .bind(page.limit() as i64)
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db("list_orders"))?;

        let details = self.attach_details(orders_from(rows)?).await?;
        Ok(Paged::new(details, total as u64, page))
    }

    async fn transition_status(&self, change: &StatusChange) -> CoreResult<CasOutcome<Order>> {
        let mut tx = self.pool.begin().await.map_err(db("transition_status"))?;

        let row: Option<OrderRow> = sqlx::query_as(
            "UPDATE orders
             SET status = $3, tracking_number = COALESCE($4, tracking_number),
                 version = version + 1, updated_at = now()
             WHERE id = $1 AND status = $2
             RETURNING *",
        )
        .bind(change.order_id)
        .bind(change.expected.as_str())
        .bind(change.next.as_str())
        .bind(&change.tracking_number)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db("transition_status"))?;

        let Some(row) = row else {
            let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
                .bind(change.order_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db("transition_status"))?;
            tx.rollback().await.map_err(db("transition_status"))?;
            return Ok(if exists.is_some() { CasOutcome::Stale } else { CasOutcome::Missing });
        };

        if change.restock {
            // Same lock order as reservations: product id ascending.
            let returned: Vec<(Uuid, i64)> = sqlx::query_as(
                "SELECT oi.product_id, sum(oi.quantity)::bigint
                 FROM order_items oi JOIN products p ON p.id = oi.product_id
                 WHERE oi.order_id = $1
                 GROUP BY oi.product_id
                 ORDER BY oi.product_id",
            )
            .bind(change.order_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(db("restock_order"))?;

            for (product_id, quantity) in returned {
                let applied = match i32::try_from(quantity) {
                    Ok(delta) => conditional_stock_update(&mut *tx, product_id, delta)
                        .await
                        .map_err(db("restock_order"))?,
                    Err(_) => None,
                };
                if applied.is_none() {
                    tx.rollback().await.map_err(db("restock_order"))?;
                    return Err(CoreError::conflict(format!(
                        "Returning {} reserved unit(s) to product {} would overflow its stock",
                        quantity, product_id
                    )));
                }
            }
        }

        tx.commit().await.map_err(db("transition_status"))?;
        Ok(CasOutcome::Applied(Order::try_from(row)?))
    }

    async fn transition_payment(
        &self,
        order_id: Uuid,
        expected: PaymentStatus,
        next: PaymentStatus,
    ) -> CoreResult<CasOutcome<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(
            "UPDATE orders
             SET payment_status = $3, version = version + 1, updated_at = now()
             WHERE id = $1 AND payment_status = $2
             RETURNING *",
        )
        .bind(order_id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db("transition_payment"))?;

        if let Some(row) = row {
            return Ok(CasOutcome::Applied(Order::try_from(row)?));
        }
        Ok(match self.find_order(order_id).await? {
            Some(_) => CasOutcome::Stale,
            None => CasOutcome::Missing,
        })
    }
}

#[async_trait]
impl AnalyticsRepository for PgStore {
    async fn totals(&self, low_stock_threshold: i32) -> CoreResult<StoreTotals> {
        let row: TotalsRow = sqlx::query_as(
            "SELECT
                (SELECT count(*) FROM products) AS products,
                (SELECT count(*) FROM orders) AS orders,
                (SELECT count(*) FROM users) AS users,
                (SELECT COALESCE(sum(total_amount), 0) FROM orders WHERE payment_status = 'completed') AS revenue,
                (SELECT count(*) FROM orders WHERE status = 'pending') AS pending_orders,
                (SELECT count(*) FROM products WHERE stock < $1) AS low_stock",
        )
        .bind(low_stock_threshold)
        .fetch_one(&self.pool)
        .await
        .map_err(db("totals"))?;

        Ok(StoreTotals {
            products: row.products,
            orders: row.orders,
            users: row.users,
            revenue: row.revenue,
            pending_orders: row.pending_orders,
            low_stock: row.low_stock,
        })
    }

    async fn daily_sales(&self, since: DateTime<Utc>, completed_only: bool) -> CoreResult<Vec<DailyBucket>> {
        let rows: Vec<BucketRow> = sqlx::query_as(
            "SELECT (created_at AT TIME ZONE 'UTC')::date AS date,
                    sum(total_amount) AS total,
                    count(*) AS orders
             FROM orders
             WHERE created_at >= $1 AND (NOT $2 OR payment_status = 'completed')
             GROUP BY 1
             ORDER BY 1",
        )
        .bind(since)
        .bind(completed_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db("daily_sales"))?;

        Ok(rows
            .into_iter()
            .map(|row| DailyBucket {
                date: row.date,
                total: row.total,
                orders: row.orders,
            })
            .collect())
    }

    async fn status_counts(&self, since: DateTime<Utc>) -> CoreResult<Vec<StatusCount>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, count(*) FROM orders WHERE created_at >= $1 GROUP BY status",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(db("status_counts"))?;

        rows.into_iter()
            .map(|(status, count)| {
                let status: OrderStatus = status.parse().map_err(|e| corrupt("status_counts", e))?;
                Ok(StatusCount { status, count })
            })
            .collect()
    }

    async fn top_products(&self, since: DateTime<Utc>, limit: u32) -> CoreResult<Vec<TopProduct>> {
        let rows: Vec<TopProductRow> = sqlx::query_as(
            "SELECT oi.product_id,
                    max(oi.product_name) AS name,
                    sum(oi.quantity)::bigint AS quantity_sold,
                    sum(oi.price * oi.quantity) AS revenue
             FROM order_items oi
             JOIN orders o ON o.id = oi.order_id
             WHERE o.created_at >= $1 AND o.status <> 'cancelled'
             GROUP BY oi.product_id
             ORDER BY quantity_sold DESC, oi.product_id
             LIMIT $2",
        )
        .bind(since)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db("top_products"))?;

        Ok(rows
            .into_iter()
            .map(|row| TopProduct {
                product_id: row.product_id,
                name: row.name,
                quantity_sold: row.quantity_sold,
                revenue: row.revenue,
            })
            .collect())
    }

    async fn category_stats(&self) -> CoreResult<Vec<CategoryStat>> {
        let rows: Vec<CategoryRow> = sqlx::query_as(
            "SELECT category, count(*) AS count, round(avg(price), 2) AS average_price
             FROM products
             GROUP BY category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db("category_stats"))?;

        rows.into_iter()
            .map(|row| {
                Ok(CategoryStat {
                    category: row.category.parse().map_err(|e| corrupt("category_stats", e))?,
                    count: row.count,
                    average_price: row.average_price,
                })
            })
            .collect()
    }

    async fn user_activity(&self, since: DateTime<Utc>) -> CoreResult<UserActivity> {
        let (new_users, returning_users): (i64, i64) = sqlx::query_as(
            "WITH first_orders AS (
                 SELECT user_id, min(created_at) AS first_at
                 FROM orders WHERE user_id IS NOT NULL
                 GROUP BY user_id
             ),
             active AS (
                 SELECT DISTINCT user_id
                 FROM orders WHERE user_id IS NOT NULL AND created_at >= $1
             )
             SELECT count(*) FILTER (WHERE f.first_at >= $1),
                    count(*) FILTER (WHERE f.first_at < $1)
             FROM active a JOIN first_orders f ON f.user_id = a.user_id",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db("user_activity"))?;

        Ok(UserActivity {
            new_users,
            returning_users,
        })
    }

    async fn recent_orders(&self, limit: u32) -> CoreResult<Vec<OrderDetails>> {
        let rows: Vec<OrderRow> =
            sqlx::query_as("SELECT * FROM orders ORDER BY created_at DESC, id DESC LIMIT $1")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await
                .map_err(db("recent_orders"))?;
        self.attach_details(orders_from(rows)?).await
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> CoreResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db("ping"))?;
        Ok(())
    }
}

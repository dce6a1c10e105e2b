// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// One subdirectory per component, each with its value objects and the
// service that owns the component's rules:
// - catalog:        products (CatalogStore)
// - configuration:  saved PC builds (ConfigurationBuilder)
// - inventory:      stock levels (InventoryLedger)
// - order:          checkout and lifecycle (OrderProcessor)
// - analytics:      read-only reporting (AnalyticsAggregator)
//
// Persistence is reached only through the repository traits in `store`.
//
// ============================================================================

pub mod analytics;
pub mod catalog;
pub mod configuration;
pub mod inventory;
pub mod order;
pub mod page;
pub mod user;

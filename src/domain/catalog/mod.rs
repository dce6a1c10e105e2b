// ============================================================================
// Catalog Domain
// ============================================================================
//
// Product records and every catalog field except stock, which is owned by
// the inventory ledger.
//
// ============================================================================

pub mod store;
pub mod value_objects;

pub use store::CatalogStore;
pub use value_objects::*;

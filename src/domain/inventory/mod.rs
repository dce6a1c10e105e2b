// ============================================================================
// Inventory Domain
// ============================================================================
//
// The only writer of `Product.stock`. Every mutation is a single conditional
// store operation so stock can never go negative, concurrent callers included.
//
// ============================================================================

pub mod ledger;

pub use ledger::InventoryLedger;

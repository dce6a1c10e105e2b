// ============================================================================
// Configuration Domain
// ============================================================================
//
// Named PC builds: one optional product per slot, priced as a snapshot at
// save time. Configurations are wish-lists and never hold stock.
//
// ============================================================================

pub mod builder;
pub mod value_objects;

pub use builder::ConfigurationBuilder;
pub use value_objects::*;

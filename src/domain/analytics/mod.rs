// ============================================================================
// Analytics Domain
// ============================================================================
//
// Read-only rollups. Grouping happens in the store; this layer only fills
// gaps (empty days, absent statuses) and orders the output.
//
// ============================================================================

pub mod aggregator;
pub mod value_objects;

pub use aggregator::AnalyticsAggregator;
pub use value_objects::*;

// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (OrderStatus, PaymentStatus, OrderItem, ...)
// - Status state machines (fulfilment and payment)
// - OrderProcessor (creation, transitions, queries)
//
// ============================================================================

pub mod processor;
pub mod value_objects;

pub use processor::{OrderProcessor, OrderRequest};
pub use value_objects::*;

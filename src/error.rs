use uuid::Uuid;

use crate::utils::IsTransient;

// ============================================================================
// Core Error Taxonomy
// ============================================================================
//
// Every core operation returns `CoreResult<T>`. Expected conditions are
// typed variants; only `StoreUnavailable` represents an unexpected fault.
//
// ============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("{0}")]
    Conflict(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Store unavailable during {operation}")]
    StoreUnavailable { operation: &'static str, detail: String },
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        CoreError::NotFound { entity, id }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        CoreError::Conflict(message.into())
    }

    /// Wrap a persistence failure. The driver detail is logged here and kept
    /// off the `Display` output so it never reaches a caller.
    pub fn store(operation: &'static str, err: impl std::fmt::Display) -> Self {
        let detail = err.to_string();
        tracing::error!(operation = operation, error = %detail, "Store operation failed");
        CoreError::StoreUnavailable { operation, detail }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "validation",
            CoreError::NotFound { .. } => "not_found",
            CoreError::Conflict(_) => "conflict",
            CoreError::InsufficientStock { .. } => "insufficient_stock",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::StoreUnavailable { .. } => "store_unavailable",
        }
    }

    /// Message safe to show to a caller.
    pub fn public_message(&self) -> String {
        match self {
            CoreError::StoreUnavailable { .. } => {
                "The service is temporarily unavailable".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            CoreError::Conflict(_)
                | CoreError::InsufficientStock { .. }
                | CoreError::InvalidTransition { .. }
        )
    }
}

impl IsTransient for CoreError {
    fn is_transient(&self) -> bool {
        matches!(self, CoreError::StoreUnavailable { .. })
    }
}

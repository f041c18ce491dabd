use thiserror::Error;

use crate::{CartId, ProductId, Version};

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The cart does not exist (never created, deleted, or already checked out).
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// Any other row that was looked up by key and is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The cart changed between being read and being checked out.
    #[error("Concurrency conflict for cart {cart_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        cart_id: CartId,
        expected: Version,
        actual: Version,
    },

    /// A delete was refused because other rows still reference the target.
    #[error("{entity} {id} cannot be deleted: {reason}")]
    Protected {
        entity: &'static str,
        id: String,
        reason: &'static str,
    },

    /// A cart line would exceed the storable quantity.
    ///
    /// `requested` is the quantity passed to the failing call: the increment
    /// for an add, the new quantity for a set.
    #[error("Requested quantity {requested} for product {product_id} exceeds the limit")]
    QuantityLimitExceeded { product_id: ProductId, requested: u64 },

    /// A stored value could not be mapped back into the model.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn protected(entity: &'static str, id: impl ToString, reason: &'static str) -> Self {
        StoreError::Protected {
            entity,
            id: id.to_string(),
            reason,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

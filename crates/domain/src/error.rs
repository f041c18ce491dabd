//! Domain error types.

use store::{CartId, StoreError};
use thiserror::Error;

use crate::policy::Action;

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The cart is missing: never created, deleted, or already checked out.
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    /// Any other entity looked up by key is absent.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input was rejected before touching the store.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Checkout was attempted on a cart without items.
    #[error("Cart {0} has no items")]
    EmptyCart(CartId),

    /// The cart changed or was checked out concurrently.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A delete was refused because other records still reference the target.
    #[error("{entity} {id} cannot be deleted: {reason}")]
    Protected {
        entity: &'static str,
        id: String,
        reason: &'static str,
    },

    /// The caller supplied no identity.
    #[error("Authentication credentials were not provided")]
    Unauthenticated,

    /// The caller is identified but lacks the capability.
    #[error("Permission denied: {0}")]
    PermissionDenied(Action),

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True for both missing carts and other missing entities.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::CartNotFound(_) | DomainError::NotFound { .. }
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::CartNotFound(_) => "cart_not_found",
            DomainError::NotFound { .. } => "not_found",
            DomainError::Validation(_) => "validation",
            DomainError::EmptyCart(_) => "empty_cart",
            DomainError::Conflict(_) => "conflict",
            DomainError::Protected { .. } => "protected",
            DomainError::Unauthenticated => "unauthenticated",
            DomainError::PermissionDenied(_) => "permission_denied",
            DomainError::Store(_) => "store",
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CartNotFound(id) => DomainError::CartNotFound(id),
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StoreError::ConcurrencyConflict {
                cart_id,
                expected,
                actual,
            } => DomainError::Conflict(format!(
                "cart {cart_id} changed during checkout (read version {expected}, now {actual})"
            )),
            StoreError::Protected { entity, id, reason } => {
                DomainError::Protected { entity, id, reason }
            }
            StoreError::QuantityLimitExceeded {
                product_id,
                requested,
            } => DomainError::Validation(format!(
                "quantity for product {product_id} would exceed {} (requested {requested})",
                store::MAX_ITEM_QUANTITY
            )),
            other => DomainError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use store::{ProductId, Version};

    use super::*;

    #[test]
    fn store_conflict_becomes_domain_conflict() {
        let err: DomainError = StoreError::ConcurrencyConflict {
            cart_id: CartId::new(),
            expected: Version::new(1),
            actual: Version::new(2),
        }
        .into();
        assert!(matches!(err, DomainError::Conflict(_)));
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn quantity_limit_becomes_validation() {
        let err: DomainError = StoreError::QuantityLimitExceeded {
            product_id: ProductId::new(1),
            requested: 5,
        }
        .into();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(err.to_string().contains("requested 5)"));
    }

    #[test]
    fn missing_cart_and_entity_are_both_not_found() {
        assert!(DomainError::CartNotFound(CartId::new()).is_not_found());
        assert!(DomainError::not_found("Order", 7).is_not_found());
        assert!(!DomainError::EmptyCart(CartId::new()).is_not_found());
    }
}

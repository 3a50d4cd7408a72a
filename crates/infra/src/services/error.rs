use thiserror::Error;

use stockbook_core::DomainError;

use crate::store::StoreError;

/// Error returned by every service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Rejected input or a disallowed transition. Nothing was written.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    /// An `OUT` movement asked for more than is on hand. Nothing was written.
    #[error("insufficient stock: {current_stock} on hand")]
    InsufficientStock { current_stock: i64 },

    /// A concurrent writer got there first. Nothing was written.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) => ServiceError::Validation(msg),
            DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::NotFound(what) => ServiceError::NotFound(what),
            DomainError::InsufficientStock { current } => ServiceError::InsufficientStock {
                current_stock: current,
            },
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => ServiceError::Conflict(msg),
            StoreError::DuplicateCode(code) => {
                ServiceError::Conflict(format!("purchase order code {code} already in use"))
            }
            StoreError::NotFound(what) => ServiceError::NotFound(what),
            other @ StoreError::Backend(_) => ServiceError::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shortfall_keeps_the_current_stock() {
        let err = ServiceError::from(DomainError::insufficient_stock(5));
        assert!(matches!(err, ServiceError::InsufficientStock { current_stock: 5 }));
        assert_eq!(err.to_string(), "insufficient stock: 5 on hand");
    }

    #[test]
    fn store_conflicts_surface_as_conflicts() {
        assert!(matches!(
            ServiceError::from(StoreError::Conflict("stale".into())),
            ServiceError::Conflict(_)
        ));
        assert!(matches!(
            ServiceError::from(StoreError::Backend("down".into())),
            ServiceError::Store(_)
        ));
    }
}

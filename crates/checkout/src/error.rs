//! Service error types.

use domain::{DomainError, ErrorKind};
use store::StoreError;
use thiserror::Error;

/// Errors returned by the storefront services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A business rule rejected the request.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The store failed for a reason that is not a business rule.
    #[error(transparent)]
    Store(StoreError),

    /// Every attempt hit a transient failure.
    #[error("Gave up after {attempts} attempts: {source}")]
    RetriesExhausted { attempts: u32, source: StoreError },
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Domain(e) => ServiceError::Domain(e),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    /// The error kind clients can act on, or `None` for an internal failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ServiceError::Domain(e) => Some(e.kind()),
            ServiceError::Store(
                StoreError::ConcurrencyConflict { .. } | StoreError::UniqueViolation { .. },
            ) => Some(ErrorKind::Conflict),
            ServiceError::RetriesExhausted { .. } => Some(ErrorKind::Conflict),
            ServiceError::Store(_) => None,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Store(e) if e.is_transient())
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

use domain::DomainError;
use thiserror::Error;

/// Errors that can occur when interacting with a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A guarded write found the record changed since it was read.
    /// Safe to retry from a fresh read.
    #[error("Concurrency conflict on {entity} {id}: {detail}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        detail: String,
    },

    /// A unique constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A business rule failed when re-checked inside the transaction.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[source] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Postgres SQLSTATEs worth retrying: serialization failure, deadlock, lock timeout.
const TRANSIENT_SQLSTATES: [&str; 3] = ["40001", "40P01", "55P03"];

impl StoreError {
    pub fn conflict(entity: &'static str, id: impl ToString, detail: impl Into<String>) -> Self {
        StoreError::ConcurrencyConflict {
            entity,
            id: id.to_string(),
            detail: detail.into(),
        }
    }

    /// True for infrastructure noise that a retry from a fresh read may clear.
    /// Business-rule failures are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::ConcurrencyConflict { .. } => true,
            StoreError::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .is_some_and(|code| TRANSIENT_SQLSTATES.contains(&code.as_ref())),
            StoreError::Database(sqlx::Error::PoolTimedOut) => true,
            _ => false,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err
            && db_err.is_unique_violation()
        {
            return StoreError::UniqueViolation {
                constraint: db_err.constraint().unwrap_or("unknown").to_string(),
            };
        }
        StoreError::Database(err)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

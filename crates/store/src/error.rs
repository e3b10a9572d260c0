use thiserror::Error;

/// Errors that can occur when interacting with the saga stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A row with the same idempotency key already exists.
    ///
    /// For saga initiation this is the retry signal: the caller re-reads by
    /// key and returns the original result.
    #[error("duplicate idempotency key")]
    DuplicateIdempotencyKey,

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be decoded into its domain type.
    #[error("decode error: {0}")]
    Decode(String),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<domain::UnknownStatus> for StoreError {
    fn from(err: domain::UnknownStatus) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

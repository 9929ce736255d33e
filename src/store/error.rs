//! Error types for document store operations.

use thiserror::Error;

use crate::profile::UserId;

/// Error type for profile store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Storage operation failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Database error from `SQLite`.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A document body could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A write targeted a document that does not exist.
    #[error("Document not found: {0}")]
    DocumentNotFound(UserId),

    /// A create targeted a document that already exists.
    #[error("Document already exists: {0}")]
    AlreadyExists(UserId),

    /// A batch precondition did not hold when the batch was staged.
    #[error("Batch condition not met: {0}")]
    ConditionFailed(String),

    /// The backend rejected the operation (conflict, quota, outage).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

//! Crate-level error type.

use thiserror::Error;

use crate::profile::ProfileError;
use crate::store::StoreError;
use crate::trigger::TriggerError;

/// Error type for operations exposed at the crate root.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid profile data or id.
    #[error(transparent)]
    Profile(#[from] ProfileError),

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Trigger setup failed.
    #[error(transparent)]
    Trigger(#[from] TriggerError),

    /// The request is not allowed.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Background runtime failure.
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for crate-level operations.
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

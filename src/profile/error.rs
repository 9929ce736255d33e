//! Error types for profile data.
//!
//! This module defines errors raised while validating identifiers and
//! building writes against profile documents.

use thiserror::Error;

/// Error type for profile operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// The identifier is not a valid document id.
    #[error("Invalid user id: {0}")]
    InvalidId(String),

    /// The field may only be written by the friendship maintainer.
    #[error("Field is read-only for clients: {0}")]
    ReadOnlyField(&'static str),
}

/// Result type alias for profile operations.
pub type Result<T> = std::result::Result<T, ProfileError>;

//! Error types for trigger delivery.

use thiserror::Error;

/// Errors raised while setting up trigger delivery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TriggerError {
    /// A configuration value is out of range or unparsable.
    #[error("Invalid configuration for {key}: {reason}")]
    InvalidConfig {
        /// The setting that failed.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type for trigger operations.
pub type TriggerResult<T> = Result<T, TriggerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_display() {
        let err = TriggerError::InvalidConfig {
            key: "MEMORIES_FAN_OUT_CONCURRENCY".to_string(),
            reason: "must be at least 1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration for MEMORIES_FAN_OUT_CONCURRENCY: must be at least 1"
        );
    }
}

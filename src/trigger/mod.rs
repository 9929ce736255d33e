//! Trigger delivery for profile updates.
//!
//! Subscribes to a store's change feed and invokes the friendship
//! maintainer once per updated document.
//!
//! # Delivery
//!
//! - at least once: a replayed event is harmless because every write is idempotent
//! - no ordering between events for different documents
//! - bounded concurrency and a per-invocation time budget ([`TriggerConfig`])
//! - no retries: failures are logged and counted in [`RuntimeStats`]

mod config;
mod error;
mod runtime;

pub use config::{
    TriggerConfig, ENV_FAN_OUT_CONCURRENCY, ENV_INVOCATION_TIMEOUT_SECS,
    ENV_MAX_CONCURRENT_INVOCATIONS,
};
pub use error::{TriggerError, TriggerResult};
pub use runtime::{RuntimeStats, TriggerRuntime};

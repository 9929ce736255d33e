//! Trigger runtime configuration.
//!
//! Settings can be built in code or loaded from the environment:
//!
//! | Variable | Setting | Default |
//! |----------|---------|---------|
//! | `MEMORIES_MAX_CONCURRENT_INVOCATIONS` | concurrent invocations | 64 |
//! | `MEMORIES_INVOCATION_TIMEOUT_SECS` | per-invocation budget | 60 |
//! | `MEMORIES_FAN_OUT_CONCURRENCY` | branches per invocation | 8 |

use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::info;

use super::error::{TriggerError, TriggerResult};
use crate::friendship::DEFAULT_FAN_OUT;

/// Environment variable for [`TriggerConfig::max_concurrent_invocations`].
pub const ENV_MAX_CONCURRENT_INVOCATIONS: &str = "MEMORIES_MAX_CONCURRENT_INVOCATIONS";

/// Environment variable for [`TriggerConfig::invocation_timeout`], in seconds.
pub const ENV_INVOCATION_TIMEOUT_SECS: &str = "MEMORIES_INVOCATION_TIMEOUT_SECS";

/// Environment variable for [`TriggerConfig::fan_out_concurrency`].
pub const ENV_FAN_OUT_CONCURRENCY: &str = "MEMORIES_FAN_OUT_CONCURRENCY";

const DEFAULT_MAX_CONCURRENT_INVOCATIONS: usize = 64;
const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for delivering change events to the maintainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerConfig {
    /// Maximum invocations running at once.
    pub max_concurrent_invocations: usize,
    /// Execution budget of a single invocation.
    pub invocation_timeout: Duration,
    /// Maximum per-id branches running at once inside one invocation.
    pub fan_out_concurrency: usize,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_invocations: DEFAULT_MAX_CONCURRENT_INVOCATIONS,
            invocation_timeout: DEFAULT_INVOCATION_TIMEOUT,
            fan_out_concurrency: DEFAULT_FAN_OUT,
        }
    }
}

impl TriggerConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of concurrent invocations.
    #[must_use]
    pub const fn with_max_concurrent_invocations(mut self, max: usize) -> Self {
        self.max_concurrent_invocations = max;
        self
    }

    /// Sets the per-invocation execution budget.
    #[must_use]
    pub const fn with_invocation_timeout(mut self, timeout: Duration) -> Self {
        self.invocation_timeout = timeout;
        self
    }

    /// Sets the per-invocation branch concurrency.
    #[must_use]
    pub const fn with_fan_out_concurrency(mut self, fan_out: usize) -> Self {
        self.fan_out_concurrency = fan_out;
        self
    }

    /// Loads settings from the process environment.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::InvalidConfig`] if a variable is set but
    /// unparsable, or if the resulting configuration is invalid.
    pub fn from_env() -> TriggerResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads settings through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> TriggerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            max_concurrent_invocations: load(
                &lookup,
                ENV_MAX_CONCURRENT_INVOCATIONS,
                defaults.max_concurrent_invocations,
            )?,
            invocation_timeout: Duration::from_secs(load(
                &lookup,
                ENV_INVOCATION_TIMEOUT_SECS,
                defaults.invocation_timeout.as_secs(),
            )?),
            fan_out_concurrency: load(
                &lookup,
                ENV_FAN_OUT_CONCURRENCY,
                defaults.fan_out_concurrency,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::InvalidConfig`] naming the first bad setting.
    pub fn validate(&self) -> TriggerResult<()> {
        if self.max_concurrent_invocations == 0 {
            return Err(invalid(ENV_MAX_CONCURRENT_INVOCATIONS, "must be at least 1"));
        }
        if self.invocation_timeout.is_zero() {
            return Err(invalid(ENV_INVOCATION_TIMEOUT_SECS, "must be greater than zero"));
        }
        if self.fan_out_concurrency == 0 {
            return Err(invalid(ENV_FAN_OUT_CONCURRENCY, "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> TriggerError {
    TriggerError::InvalidConfig {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn load<T, F>(lookup: &F, key: &str, default: T) -> TriggerResult<T>
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| invalid(key, format!("{raw:?}: {e}"))),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}

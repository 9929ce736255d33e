//! Delivery of change events to the friendship maintainer.
//!
//! Each event becomes one invocation running on its own task. Invocations
//! for different events may run concurrently and in any order; at most
//! `max_concurrent_invocations` run at once and each is cut off after
//! `invocation_timeout`. A cut-off invocation may have committed some of
//! its batches; the rest are left for the next change or a sweep.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, warn};

use super::config::TriggerConfig;
use super::error::TriggerResult;
use crate::friendship::{FriendshipMaintainer, InvocationReport};
use crate::profile::UserId;
use crate::store::{ChangeStream, ProfileStore};

/// Counters collected while a runtime drains its change stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Events received from the stream.
    pub delivered: usize,
    /// Invocations that ran to completion.
    pub completed: usize,
    /// Completed invocations whose `following` set was unchanged.
    pub noops: usize,
    /// Invocations cut off by the execution budget.
    pub timed_out: usize,
    /// Branches that failed inside completed invocations.
    pub failed_branches: usize,
    /// Invocation tasks that panicked.
    pub panicked: usize,
}

impl RuntimeStats {
    fn record(&mut self, result: Result<Invocation, JoinError>) {
        match result {
            Ok(Invocation::Completed(report)) => {
                self.completed += 1;
                if report.is_noop() {
                    self.noops += 1;
                }
                self.failed_branches += report.failure_count();
            }
            Ok(Invocation::TimedOut(subject)) => {
                self.timed_out += 1;
                warn!(subject = %subject, "invocation exceeded its execution budget");
            }
            Err(e) => {
                self.panicked += 1;
                error!(error = %e, "invocation task failed");
            }
        }
    }
}

enum Invocation {
    Completed(InvocationReport),
    TimedOut(UserId),
}

/// Runs the maintainer once for every event of a change stream.
pub struct TriggerRuntime<S> {
    maintainer: Arc<FriendshipMaintainer<S>>,
    config: TriggerConfig,
}

impl<S: ProfileStore + 'static> TriggerRuntime<S> {
    /// Creates a runtime writing through `store`.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerError::InvalidConfig`](super::TriggerError::InvalidConfig)
    /// if `config` does not validate.
    pub fn new(store: Arc<S>, config: TriggerConfig) -> TriggerResult<Self> {
        config.validate()?;
        let maintainer =
            FriendshipMaintainer::new(store).with_fan_out(config.fan_out_concurrency);
        Ok(Self {
            maintainer: Arc::new(maintainer),
            config,
        })
    }

    /// Returns the active configuration.
    #[must_use]
    pub const fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Processes events until `changes` ends, then waits for in-flight
    /// invocations.
    pub async fn run(self, mut changes: ChangeStream) -> RuntimeStats {
        let permits = Arc::new(Semaphore::new(self.config.max_concurrent_invocations));
        let mut tasks: JoinSet<Invocation> = JoinSet::new();
        let mut stats = RuntimeStats::default();

        loop {
            tokio::select! {
                Some(result) = tasks.join_next(), if !tasks.is_empty() => stats.record(result),
                change = changes.recv() => {
                    let Some(change) = change else {
                        break;
                    };
                    stats.delivered += 1;

                    let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                        break;
                    };
                    let maintainer = Arc::clone(&self.maintainer);
                    let budget = self.config.invocation_timeout;
                    tasks.spawn(async move {
                        let _permit = permit;
                        let subject = change.user_id.clone();
                        match tokio::time::timeout(budget, maintainer.handle(&change)).await {
                            Ok(report) => Invocation::Completed(report),
                            Err(_) => Invocation::TimedOut(subject),
                        }
                    });
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            stats.record(result);
        }

        debug!(
            delivered = stats.delivered,
            completed = stats.completed,
            timed_out = stats.timed_out,
            "change stream ended"
        );
        stats
    }

    /// Runs [`run`](Self::run) on a background task.
    pub fn spawn(self, changes: ChangeStream) -> JoinHandle<RuntimeStats> {
        tokio::spawn(self.run(changes))
    }
}

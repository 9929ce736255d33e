//! Top-level entry point wiring the store, client paths and trigger runtime.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::{CoreError, Result};
use crate::friendship::{ReconcileReport, Reconciler};
use crate::graph::SocialGraph;
use crate::store::{ProfileStore, SqliteProfileStore};
use crate::trigger::{RuntimeStats, TriggerConfig, TriggerRuntime};

/// File name of the profile database inside the data directory.
pub const DATABASE_FILE: &str = "profiles.db";

/// Profile store with friendship maintenance running in the background.
///
/// Call [`shutdown`](Self::shutdown) before dropping; otherwise the runtime
/// task stays parked on the feed until the Tokio runtime stops.
///
/// # Examples
///
/// ```no_run
/// # async fn demo() -> memories_core::Result<()> {
/// use memories_core::trigger::TriggerConfig;
/// use memories_core::MemoriesCore;
///
/// let core = MemoriesCore::open("/tmp/memories".as_ref(), TriggerConfig::default())?;
/// let alice = core.graph().register("alice").await?;
/// let bob = core.graph().register("bob").await?;
/// core.graph().follow(&alice, &bob).await?;
/// core.graph().follow(&bob, &alice).await?;
/// let stats = core.shutdown().await?;
/// # let _ = stats;
/// # Ok(())
/// # }
/// ```
pub struct MemoriesCore {
    data_dir: PathBuf,
    store: Arc<SqliteProfileStore>,
    graph: SocialGraph<SqliteProfileStore>,
    config: TriggerConfig,
    runtime: JoinHandle<RuntimeStats>,
}

impl MemoriesCore {
    /// Opens (or creates) the store under `data_dir` and starts the
    /// trigger runtime on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid, the directory or database
    /// cannot be opened, or no Tokio runtime is running.
    pub fn open(data_dir: &Path, config: TriggerConfig) -> Result<Self> {
        let handle = Handle::try_current().map_err(|e| CoreError::Runtime(e.to_string()))?;

        fs::create_dir_all(data_dir)?;
        let store = Arc::new(SqliteProfileStore::new(&data_dir.join(DATABASE_FILE))?);

        let trigger = TriggerRuntime::new(Arc::clone(&store), config.clone())?;
        let runtime = handle.spawn(trigger.run(store.subscribe()));

        info!(data_dir = %data_dir.display(), "memories core opened");
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            graph: SocialGraph::new(Arc::clone(&store)),
            store,
            config,
            runtime,
        })
    }

    /// Returns the client write paths.
    #[must_use]
    pub const fn graph(&self) -> &SocialGraph<SqliteProfileStore> {
        &self.graph
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<SqliteProfileStore> {
        &self.store
    }

    /// Returns the data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the trigger configuration.
    #[must_use]
    pub const fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Runs a reconciliation sweep over every profile.
    ///
    /// # Errors
    ///
    /// Returns an error if profiles cannot be listed or read.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        Ok(Reconciler::new(Arc::clone(&self.store)).sweep().await?)
    }

    /// Stops delivering changes and waits for in-flight invocations.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Runtime`] if the runtime task panicked.
    pub async fn shutdown(self) -> Result<RuntimeStats> {
        self.store.close_feed();
        let stats = self
            .runtime
            .await
            .map_err(|e| CoreError::Runtime(e.to_string()))?;
        info!(
            delivered = stats.delivered,
            timed_out = stats.timed_out,
            "memories core shut down"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::UserId;
    use std::time::Duration;

    async fn wait_for_friends(core: &MemoriesCore, user: &UserId, expected: usize) {
        for _ in 0..100 {
            if core.graph().friends(user).await.unwrap().len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("friends of {user} never reached {expected}");
    }

    #[test]
    fn open_outside_runtime_fails() {
        let dir = tempfile::tempdir().unwrap();

        let result = MemoriesCore::open(dir.path(), TriggerConfig::default());

        assert!(matches!(result, Err(CoreError::Runtime(_))));
    }

    #[tokio::test]
    async fn open_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = TriggerConfig::new().with_fan_out_concurrency(0);

        let result = MemoriesCore::open(dir.path(), config);

        assert!(matches!(result, Err(CoreError::Trigger(_))));
    }

    #[tokio::test]
    async fn open_creates_database_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");

        let core = MemoriesCore::open(&data_dir, TriggerConfig::default()).unwrap();

        assert!(data_dir.join(DATABASE_FILE).exists());
        assert_eq!(core.data_dir(), data_dir.as_path());
        core.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn mutual_follow_becomes_friendship() {
        let dir = tempfile::tempdir().unwrap();
        let core = MemoriesCore::open(dir.path(), TriggerConfig::default()).unwrap();
        let alice = core.graph().register("alice").await.unwrap();
        let bob = core.graph().register("bob").await.unwrap();

        core.graph().follow(&alice, &bob).await.unwrap();
        core.graph().follow(&bob, &alice).await.unwrap();
        wait_for_friends(&core, &alice, 1).await;
        wait_for_friends(&core, &bob, 1).await;

        core.graph().unfollow(&bob, &alice).await.unwrap();
        wait_for_friends(&core, &alice, 0).await;
        wait_for_friends(&core, &bob, 0).await;

        assert!(core.reconcile().await.unwrap().is_consistent());
        let stats = core.shutdown().await.unwrap();
        assert_eq!(stats.timed_out, 0);
        assert_eq!(stats.panicked, 0);
    }
}

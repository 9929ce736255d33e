//! Reusable helpers for friendship integration tests.
//!
//! Tests drive the maintainer directly from a store subscription so each
//! scenario runs to quiescence deterministically, without the background
//! runtime.

#![allow(dead_code)]

use std::sync::Arc;

use memories_core::friendship::{FriendshipMaintainer, InvocationReport};
use memories_core::graph::SocialGraph;
use memories_core::profile::UserId;
use memories_core::store::{ChangeStream, MemoryProfileStore, ProfileStore};
use tracing_subscriber::{fmt, EnvFilter};

/// Installs a test-writer subscriber. Safe to call multiple times.
///
/// Set `RUST_LOG=memories_core=debug` to see maintainer logs.
pub fn init_tracing() {
    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("memories_core=warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn id(s: &str) -> UserId {
    UserId::new(s).expect("valid test id")
}

/// Finds the first report for `name` that did any work.
pub fn report_for<'a>(reports: &'a [InvocationReport], name: &str) -> &'a InvocationReport {
    let subject = id(name);
    reports
        .iter()
        .find(|r| r.subject == subject && !r.is_noop())
        .unwrap_or_else(|| panic!("no report for {name}"))
}

/// A memory store, client paths and a maintainer sharing one subscription.
pub struct Harness {
    pub store: Arc<MemoryProfileStore>,
    pub graph: SocialGraph<MemoryProfileStore>,
    pub maintainer: FriendshipMaintainer<MemoryProfileStore>,
    pub changes: ChangeStream,
}

impl Harness {
    /// Registers one profile per name, using the name as the id.
    pub async fn with_users(names: &[&str]) -> Self {
        init_tracing();
        let store = Arc::new(MemoryProfileStore::new());
        let graph = SocialGraph::new(Arc::clone(&store));
        for name in names {
            graph
                .register_with_id(&id(name), name)
                .await
                .expect("register test user");
        }
        Self {
            changes: store.subscribe(),
            maintainer: FriendshipMaintainer::new(Arc::clone(&store)),
            store,
            graph,
        }
    }

    pub async fn follow(&self, from: &str, to: &str) {
        self.graph
            .follow(&id(from), &id(to))
            .await
            .expect("follow should succeed");
    }

    pub async fn unfollow(&self, from: &str, to: &str) {
        self.graph
            .unfollow(&id(from), &id(to))
            .await
            .expect("unfollow should succeed");
    }

    /// Handles every pending change, including the ones the maintainer's
    /// own batches produce, until the feed is quiet.
    pub async fn drain(&mut self) -> Vec<InvocationReport> {
        let mut reports = Vec::new();
        while let Ok(change) = self.changes.try_recv() {
            reports.push(self.maintainer.handle(&change).await);
        }
        reports
    }

    /// Returns the sorted `friends` ids of `name`.
    pub async fn friends_of(&self, name: &str) -> Vec<String> {
        self.graph
            .friends(&id(name))
            .await
            .expect("profile exists")
            .iter()
            .map(ToString::to_string)
            .collect()
    }
}

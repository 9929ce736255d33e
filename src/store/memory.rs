//! In-memory profile store.
//!
//! Holds documents in a `HashMap` behind a `tokio::sync::RwLock`. A commit
//! holds the write lock while staging, applying and publishing, so batches
//! are atomic and changes are published in commit order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::batch::{stage, WriteBatch};
use super::error::{StoreError, StoreResult};
use super::feed::{ChangeFeed, ChangeStream, ProfileChange};
use super::ProfileStore;
use crate::profile::{Document, UserId};

/// Profile store backed by process memory.
///
/// Useful as the fake store when exercising the friendship maintainer in
/// isolation. With the `test-utils` feature it can also inject commit
/// failures and latency.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    documents: RwLock<HashMap<UserId, Document>>,
    feed: ChangeFeed,
    commits: AtomicUsize,
    injected_failures: AtomicUsize,
    commit_delay_ms: AtomicU64,
}

impl MemoryProfileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of batches committed successfully.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Makes the next `count` commits fail with [`StoreError::Unavailable`].
    #[cfg(any(test, feature = "test-utils"))]
    pub fn fail_next_commits(&self, count: usize) {
        self.injected_failures.store(count, Ordering::SeqCst);
    }

    /// Delays every subsequent commit by `delay` before it is applied.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_commit_delay(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.commit_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// Closes the change feed, ending every subscription.
    pub fn close_feed(&self) {
        self.feed.close();
    }

    fn take_injected_failure(&self) -> bool {
        self.injected_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, id: &UserId) -> StoreResult<Option<Document>> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn create_profile(&self, id: &UserId, doc: Document) -> StoreResult<()> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(id) {
            return Err(StoreError::AlreadyExists(id.clone()));
        }
        documents.insert(id.clone(), doc);
        Ok(())
    }

    async fn delete_profile(&self, id: &UserId) -> StoreResult<()> {
        self.documents.write().await.remove(id);
        Ok(())
    }

    async fn list_profile_ids(&self) -> StoreResult<Vec<UserId>> {
        let mut ids: Vec<UserId> = self.documents.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    async fn commit(&self, batch: WriteBatch) -> StoreResult<()> {
        let delay = self.commit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.take_injected_failure() {
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        let mut documents = self.documents.write().await;
        let staged = stage(&batch, |id| Ok(documents.get(id).cloned()))?;

        let changes: Vec<ProfileChange> = staged
            .into_iter()
            .map(|write| {
                documents.insert(write.user_id.clone(), write.after.clone());
                ProfileChange::new(write.user_id, write.before, write.after)
            })
            .collect();

        self.commits.fetch_add(1, Ordering::SeqCst);
        self.feed.publish(&changes);
        Ok(())
    }

    fn subscribe(&self) -> ChangeStream {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ProfileField, UserProfile};
    use serde_json::json;

    fn id(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    async fn seeded(ids: &[&str]) -> MemoryProfileStore {
        let store = MemoryProfileStore::new();
        for name in ids {
            store
                .create_profile(&id(name), UserProfile::new_document(name, 0))
                .await
                .unwrap();
        }
        store
    }

    fn follow_batch(subject: &str, target: &str) -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch
            .array_union(id(subject), ProfileField::Following, id(target))
            .unwrap()
            .array_union(id(target), ProfileField::Followers, id(subject))
            .unwrap();
        batch
    }

    #[tokio::test]
    async fn create_and_get_profile() {
        let store = seeded(&["alice"]).await;

        let doc = store.get_profile(&id("alice")).await.unwrap().unwrap();
        assert_eq!(doc["username"], json!("alice"));
        assert!(store.get_profile(&id("bob")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_existing_profile_fails() {
        let store = seeded(&["alice"]).await;
        let result = store
            .create_profile(&id("alice"), UserProfile::new_document("alice", 1))
            .await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = seeded(&["alice"]).await;
        store.delete_profile(&id("alice")).await.unwrap();
        store.delete_profile(&id("alice")).await.unwrap();
        assert!(store.list_profile_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_ids_sorted() {
        let store = seeded(&["carol", "alice", "bob"]).await;
        let ids = store.list_profile_ids().await.unwrap();
        assert_eq!(ids, vec![id("alice"), id("bob"), id("carol")]);
    }

    #[tokio::test]
    async fn commit_applies_and_publishes_changes() {
        let store = seeded(&["alice", "bob"]).await;
        let mut changes = store.subscribe();

        store.commit(follow_batch("alice", "bob")).await.unwrap();

        let alice = store.get_user(&id("alice")).await.unwrap().unwrap();
        assert!(alice.following.contains(&id("bob")));

        let first = changes.recv().await.unwrap();
        let second = changes.recv().await.unwrap();
        assert_eq!(first.user_id, id("alice"));
        assert_eq!(second.user_id, id("bob"));
        assert!(first.field_changed(ProfileField::Following));
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn unchanged_documents_publish_nothing() {
        let store = seeded(&["alice", "bob"]).await;
        store.commit(follow_batch("alice", "bob")).await.unwrap();
        let mut changes = store.subscribe();

        store.commit(follow_batch("alice", "bob")).await.unwrap();

        assert!(changes.try_recv().is_err());
    }

    #[tokio::test]
    async fn union_on_missing_document_aborts_whole_batch() {
        let store = seeded(&["alice"]).await;
        let mut changes = store.subscribe();

        let result = store.commit(WriteBatch::link_friends(&id("alice"), &id("bob"))).await;

        assert!(matches!(result, Err(StoreError::DocumentNotFound(missing)) if missing == id("bob")));
        let alice = store.get_user(&id("alice")).await.unwrap().unwrap();
        assert!(alice.friends.is_empty());
        assert!(changes.try_recv().is_err());
        assert_eq!(store.commit_count(), 0);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = seeded(&["alice", "bob"]).await;
        store.fail_next_commits(1);

        let first = store.commit(follow_batch("alice", "bob")).await;
        let second = store.commit(follow_batch("alice", "bob")).await;

        assert!(matches!(first, Err(StoreError::Unavailable(_))));
        assert!(second.is_ok());
        assert_eq!(store.commit_count(), 1);
    }

    #[tokio::test]
    async fn closed_feed_ends_subscriptions() {
        let store = seeded(&["alice", "bob"]).await;
        let mut changes = store.subscribe();

        store.close_feed();
        store.commit(follow_batch("alice", "bob")).await.unwrap();

        assert!(changes.recv().await.is_none());
    }
}

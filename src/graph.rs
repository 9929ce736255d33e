//! Client write paths for the follow graph.
//!
//! These are the only writes an app client performs: creating profiles and
//! editing `following` / `followers`. `friends` is never written here; the
//! friendship maintainer derives it from the resulting change events.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::profile::{IdSet, ProfileField, UserId, UserProfile};
use crate::store::{ProfileStore, StoreError, WriteBatch};

/// Follow-graph operations over a profile store.
pub struct SocialGraph<S> {
    store: Arc<S>,
}

impl<S> Clone for SocialGraph<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ProfileStore> SocialGraph<S> {
    /// Creates a graph over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Creates a profile under a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the document.
    pub async fn register(&self, username: &str) -> Result<UserId> {
        let id = UserId::generate();
        self.register_with_id(&id, username).await?;
        Ok(id)
    }

    /// Creates a profile under `id` with empty relations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] if the id is taken.
    pub async fn register_with_id(&self, id: &UserId, username: &str) -> Result<()> {
        let doc = UserProfile::new_document(username, Utc::now().timestamp());
        self.store.create_profile(id, doc).await?;
        debug!(user = %id, "profile registered");
        Ok(())
    }

    /// Makes `subject` follow `target`.
    ///
    /// Writes `target` into `following(subject)` and `subject` into
    /// `followers(target)` in one batch.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for a self-follow, or
    /// [`StoreError::DocumentNotFound`] if either profile is missing.
    pub async fn follow(&self, subject: &UserId, target: &UserId) -> Result<()> {
        if subject == target {
            return Err(CoreError::InvalidOperation(
                "a user cannot follow themselves".to_string(),
            ));
        }

        let mut batch = WriteBatch::new();
        batch
            .array_union(subject.clone(), ProfileField::Following, target.clone())?
            .array_union(target.clone(), ProfileField::Followers, subject.clone())?;
        self.store.commit(batch).await?;

        debug!(subject = %subject, target = %target, "followed");
        Ok(())
    }

    /// Makes `subject` stop following `target`.
    ///
    /// Succeeds when either profile is missing or the edge does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for a self-unfollow, or a
    /// store error if the batch cannot be committed.
    pub async fn unfollow(&self, subject: &UserId, target: &UserId) -> Result<()> {
        if subject == target {
            return Err(CoreError::InvalidOperation(
                "a user cannot unfollow themselves".to_string(),
            ));
        }

        let mut batch = WriteBatch::new();
        batch
            .array_remove(subject.clone(), ProfileField::Following, target.clone())?
            .array_remove(target.clone(), ProfileField::Followers, subject.clone())?;
        self.store.commit(batch).await?;

        debug!(subject = %subject, target = %target, "unfollowed");
        Ok(())
    }

    /// Reads a profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn profile(&self, id: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.store.get_user(id).await?)
    }

    /// Reads the `friends` set of a profile.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] if the profile is missing.
    pub async fn friends(&self, id: &UserId) -> Result<IdSet> {
        self.store
            .get_user(id)
            .await?
            .map(|profile| profile.friends)
            .ok_or_else(|| StoreError::DocumentNotFound(id.clone()).into())
    }

    /// Deletes a profile.
    ///
    /// Other profiles keep referencing the id until their own relations
    /// change or a sweep removes stale friendships.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub async fn delete_profile(&self, id: &UserId) -> Result<()> {
        self.store.delete_profile(id).await?;
        debug!(user = %id, "profile deleted");
        Ok(())
    }
}

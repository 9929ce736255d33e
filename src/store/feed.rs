//! Document update events.
//!
//! Stores publish one [`ProfileChange`] per document whose body changed in
//! a successful commit. Each subscriber gets its own unbounded stream;
//! subscribers that have been dropped are pruned on the next publish.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::profile::{Document, IdSet, ProfileField, UserId};

/// Receiving half of a change subscription.
pub type ChangeStream = mpsc::UnboundedReceiver<ProfileChange>;

/// A committed update to one profile document.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileChange {
    /// The document that changed.
    pub user_id: UserId,
    /// Document body before the commit.
    pub before: Document,
    /// Document body after the commit.
    pub after: Document,
    /// When the commit was applied.
    pub committed_at: DateTime<Utc>,
}

impl ProfileChange {
    /// Creates a change stamped with the current time.
    #[must_use]
    pub fn new(user_id: UserId, before: Document, after: Document) -> Self {
        Self {
            user_id,
            before,
            after,
            committed_at: Utc::now(),
        }
    }

    /// Returns whether the ids stored in `field` differ between snapshots.
    #[must_use]
    pub fn field_changed(&self, field: ProfileField) -> bool {
        IdSet::from_field(&self.before, field) != IdSet::from_field(&self.after, field)
    }
}

/// Fan-out of committed changes to subscribers.
#[derive(Debug, Default)]
pub struct ChangeFeed {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ProfileChange>>>,
    closed: AtomicBool,
}

impl ChangeFeed {
    /// Creates an open feed with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new subscription.
    ///
    /// Subscribing to a closed feed returns a stream that is already ended.
    pub fn subscribe(&self) -> ChangeStream {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.closed.load(Ordering::SeqCst) {
            self.subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(tx);
        }
        rx
    }

    /// Delivers `changes` in order to every live subscriber.
    pub fn publish(&self, changes: &[ProfileChange]) {
        if changes.is_empty() {
            return;
        }
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| changes.iter().all(|change| tx.send(change.clone()).is_ok()));
    }

    /// Ends every subscription and rejects new ones.
    ///
    /// Changes already delivered stay readable on the subscriber side.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

//! Mutual-follow friendship maintainer.
//!
//! Reacts to updates of a user's profile document and keeps the derived
//! `friends` relation in line with the `following` relation of both users
//! involved in each changed edge.
//!
//! # Branches
//!
//! | Change | Action |
//! |--------|--------|
//! | id added to `following` | read the followed profile; if it follows back, link both `friends` in one batch |
//! | id removed from `following` | unlink both `friends` in one batch, unconditionally |
//!
//! Every write is an idempotent array-union or array-remove, so replaying
//! the same event leaves the same final state. Failures are logged and
//! reported, never retried: the next `following` change on either side
//! re-converges the pair.

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::{debug, info, warn};

use super::diff::FollowingDiff;
use crate::profile::{Document, UserId};
use crate::store::{ProfileChange, ProfileStore, WriteBatch};

/// Default number of per-id branches run concurrently within one invocation.
pub const DEFAULT_FAN_OUT: usize = 8;

/// Which side of the diff a branch handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BranchKind {
    /// The subject started following the counterparty.
    Addition,
    /// The subject stopped following the counterparty.
    Removal,
}

/// Result of processing one changed edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchOutcome {
    /// Both users follow each other; friendship written on both documents.
    Linked,
    /// The counterparty does not follow back; nothing written.
    NotMutual,
    /// The followed profile does not exist; nothing written.
    CounterpartyMissing,
    /// Friendship removed from both documents.
    Unlinked,
    /// The subject's own id; users are never their own friends.
    SelfReference,
    /// A read or the batch failed; nothing written.
    Failed(String),
}

impl BranchOutcome {
    /// Returns whether a batch was committed.
    #[must_use]
    pub const fn wrote(&self) -> bool {
        matches!(self, Self::Linked | Self::Unlinked)
    }

    /// Returns whether the branch failed.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Report for one changed edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchReport {
    /// Addition or removal.
    pub kind: BranchKind,
    /// The other end of the edge.
    pub counterparty: UserId,
    /// What happened.
    pub outcome: BranchOutcome,
}

/// Report for one maintainer invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationReport {
    /// The user whose document changed.
    pub subject: UserId,
    /// One entry per changed edge, sorted by kind then counterparty.
    pub branches: Vec<BranchReport>,
}

impl InvocationReport {
    /// Returns whether the guard skipped the event.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.branches.is_empty()
    }

    /// Returns the number of committed batches.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.branches.iter().filter(|b| b.outcome.wrote()).count()
    }

    /// Returns the number of failed branches.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.branches.iter().filter(|b| b.outcome.is_failure()).count()
    }

    /// Returns the outcome of the branch for `counterparty`, if any.
    #[must_use]
    pub fn outcome(&self, kind: BranchKind, counterparty: &UserId) -> Option<&BranchOutcome> {
        self.branches
            .iter()
            .find(|b| b.kind == kind && &b.counterparty == counterparty)
            .map(|b| &b.outcome)
    }
}

/// Keeps `friends` consistent with mutual `following` edges.
///
/// Stateless between invocations: every call reads fresh snapshots from
/// the store, so concurrent invocations for the same or different users
/// are safe.
///
/// # Example
///
/// ```ignore
/// let maintainer = FriendshipMaintainer::new(Arc::clone(&store));
/// let report = maintainer.on_profile_updated(&user_id, &before, &after).await;
/// ```
pub struct FriendshipMaintainer<S> {
    store: Arc<S>,
    fan_out: usize,
}

impl<S: ProfileStore> FriendshipMaintainer<S> {
    /// Creates a maintainer writing through `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            fan_out: DEFAULT_FAN_OUT,
        }
    }

    /// Sets how many per-id branches may run concurrently (minimum 1).
    #[must_use]
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    /// Handles a change delivered by a store subscription.
    pub async fn handle(&self, change: &ProfileChange) -> InvocationReport {
        self.on_profile_updated(&change.user_id, &change.before, &change.after)
            .await
    }

    /// Handles an update of `user_id`'s profile document.
    ///
    /// Performs no reads or writes when the `following` set is unchanged.
    /// Never fails: problems are logged and recorded in the report.
    pub async fn on_profile_updated(
        &self,
        user_id: &UserId,
        before: &Document,
        after: &Document,
    ) -> InvocationReport {
        let diff = FollowingDiff::from_documents(before, after);
        if diff.is_empty() {
            debug!(subject = %user_id, "following unchanged");
            return InvocationReport {
                subject: user_id.clone(),
                branches: Vec::new(),
            };
        }

        debug!(
            subject = %user_id,
            added = diff.added.len(),
            removed = diff.removed.len(),
            "following changed"
        );

        let pending: Vec<BoxFuture<'_, BranchReport>> = diff
            .added
            .iter()
            .map(|counterparty| self.process_addition(user_id, counterparty).boxed())
            .chain(
                diff.removed
                    .iter()
                    .map(|counterparty| self.process_removal(user_id, counterparty).boxed()),
            )
            .collect();

        let mut branches: Vec<BranchReport> = stream::iter(pending)
            .buffer_unordered(self.fan_out)
            .collect()
            .await;
        branches.sort_by(|a, b| (a.kind, &a.counterparty).cmp(&(b.kind, &b.counterparty)));

        InvocationReport {
            subject: user_id.clone(),
            branches,
        }
    }

    async fn process_addition(&self, subject: &UserId, counterparty: &UserId) -> BranchReport {
        let outcome = if subject == counterparty {
            debug!(subject = %subject, "ignoring self-follow");
            BranchOutcome::SelfReference
        } else {
            self.link_if_mutual(subject, counterparty).await
        };

        BranchReport {
            kind: BranchKind::Addition,
            counterparty: counterparty.clone(),
            outcome,
        }
    }

    async fn link_if_mutual(&self, subject: &UserId, counterparty: &UserId) -> BranchOutcome {
        let followed = match self.store.get_user(counterparty).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                info!(
                    subject = %subject,
                    counterparty = %counterparty,
                    "followed profile does not exist"
                );
                return BranchOutcome::CounterpartyMissing;
            }
            Err(e) => {
                warn!(
                    subject = %subject,
                    counterparty = %counterparty,
                    error = %e,
                    "failed to read followed profile"
                );
                return BranchOutcome::Failed(e.to_string());
            }
        };

        if !followed.following.contains(subject) {
            debug!(subject = %subject, counterparty = %counterparty, "follow is not mutual");
            return BranchOutcome::NotMutual;
        }

        match self
            .store
            .commit(WriteBatch::link_friends(subject, counterparty))
            .await
        {
            Ok(()) => {
                info!(subject = %subject, counterparty = %counterparty, "friendship linked");
                BranchOutcome::Linked
            }
            Err(e) => {
                warn!(
                    subject = %subject,
                    counterparty = %counterparty,
                    error = %e,
                    "failed to link friendship"
                );
                BranchOutcome::Failed(e.to_string())
            }
        }
    }

    async fn process_removal(&self, subject: &UserId, counterparty: &UserId) -> BranchReport {
        let outcome = if subject == counterparty {
            debug!(subject = %subject, "ignoring self-unfollow");
            BranchOutcome::SelfReference
        } else {
            match self
                .store
                .commit(WriteBatch::unlink_friends(subject, counterparty))
                .await
            {
                Ok(()) => {
                    info!(subject = %subject, counterparty = %counterparty, "friendship unlinked");
                    BranchOutcome::Unlinked
                }
                Err(e) => {
                    warn!(
                        subject = %subject,
                        counterparty = %counterparty,
                        error = %e,
                        "failed to unlink friendship"
                    );
                    BranchOutcome::Failed(e.to_string())
                }
            }
        };

        BranchReport {
            kind: BranchKind::Removal,
            counterparty: counterparty.clone(),
            outcome,
        }
    }
}

//! Reconciliation sweep for the `friends` relation.
//!
//! The maintainer never retries a failed batch; a pair stays inconsistent
//! until one side changes `following` again. The sweep closes that gap by
//! recomputing every pair from current `following` sets and issuing the
//! same idempotent link/unlink batches the maintainer would have.
//!
//! Each repair re-reads both profiles right before committing and carries
//! a condition on the follow graph, so a pair whose `following` sets
//! changed after the scan is skipped rather than written from stale data.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::profile::{UserId, UserProfile};
use crate::store::{Condition, ProfileStore, StoreError, StoreResult, WriteBatch};

/// Outcome of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Number of profiles read.
    pub scanned: usize,
    /// Pairs whose friendship was (re)written on both sides.
    pub linked: Vec<(UserId, UserId)>,
    /// Pairs whose stale friendship was removed.
    pub unlinked: Vec<(UserId, UserId)>,
    /// Pairs left alone because their follow state changed mid-sweep.
    pub skipped: Vec<(UserId, UserId)>,
    /// Pairs whose batch failed, with the error.
    pub failed: Vec<(UserId, UserId, String)>,
}

impl ReconcileReport {
    /// Returns whether the sweep found nothing to repair.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.linked.is_empty()
            && self.unlinked.is_empty()
            && self.skipped.is_empty()
            && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Repair {
    Link,
    Unlink,
}

/// Recomputes `friends` for every profile in a store.
///
/// May run while the maintainer is live. A repair only commits if the
/// pair's mutual-follow state still matches the plan inside the commit;
/// otherwise the pair is reported as skipped and left to the maintainer.
pub struct Reconciler<S> {
    store: Arc<S>,
}

impl<S: ProfileStore> Reconciler<S> {
    /// Creates a reconciler over `store`.
    #[must_use]
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Scans every profile and repairs inconsistent pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if profiles cannot be listed or read. Failed and
    /// skipped repairs are recorded in the report instead.
    pub async fn sweep(&self) -> StoreResult<ReconcileReport> {
        let mut profiles = BTreeMap::new();
        for id in self.store.list_profile_ids().await? {
            // Deleted between listing and reading.
            if let Some(profile) = self.store.get_user(&id).await? {
                profiles.insert(id, profile);
            }
        }

        let mut report = ReconcileReport {
            scanned: profiles.len(),
            ..ReconcileReport::default()
        };

        for (a, b) in candidate_pairs(&profiles) {
            let Some(repair) = plan_repair(&profiles, &a, &b) else {
                continue;
            };

            if self.replan(&a, &b).await? != Some(repair) {
                debug!(a = %a, b = %b, "pair changed during sweep");
                report.skipped.push((a, b));
                continue;
            }

            let batch = match repair {
                Repair::Link => WriteBatch::link_friends(&a, &b)
                    .require(Condition::Mutual(a.clone(), b.clone())),
                Repair::Unlink => WriteBatch::unlink_friends(&a, &b)
                    .require(Condition::NotMutual(a.clone(), b.clone())),
            };

            match self.store.commit(batch).await {
                Ok(()) => {
                    info!(a = %a, b = %b, repair = ?repair, "repaired friendship");
                    match repair {
                        Repair::Link => report.linked.push((a, b)),
                        Repair::Unlink => report.unlinked.push((a, b)),
                    }
                }
                Err(StoreError::ConditionFailed(reason)) => {
                    debug!(a = %a, b = %b, reason = %reason, "pair changed during sweep");
                    report.skipped.push((a, b));
                }
                Err(e) => {
                    warn!(a = %a, b = %b, error = %e, "failed to repair friendship");
                    report.failed.push((a, b, e.to_string()));
                }
            }
        }

        info!(
            scanned = report.scanned,
            linked = report.linked.len(),
            unlinked = report.unlinked.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "friendship sweep finished"
        );
        Ok(report)
    }

    /// Plans the pair again from fresh reads of both profiles.
    async fn replan(&self, a: &UserId, b: &UserId) -> StoreResult<Option<Repair>> {
        let mut current = BTreeMap::new();
        for id in [a, b] {
            if let Some(profile) = self.store.get_user(id).await? {
                current.insert(id.clone(), profile);
            }
        }
        Ok(plan_repair(&current, a, b))
    }
}

/// Every unordered pair that is followed or befriended by either side.
fn candidate_pairs(profiles: &BTreeMap<UserId, UserProfile>) -> BTreeSet<(UserId, UserId)> {
    let mut pairs = BTreeSet::new();
    for profile in profiles.values() {
        for other in profile.following.union(&profile.friends) {
            let pair = if profile.id <= other {
                (profile.id.clone(), other)
            } else {
                (other, profile.id.clone())
            };
            pairs.insert(pair);
        }
    }
    pairs
}

fn plan_repair(
    profiles: &BTreeMap<UserId, UserProfile>,
    a: &UserId,
    b: &UserId,
) -> Option<Repair> {
    let left = profiles.get(a);
    let right = profiles.get(b);

    let mutual = match (left, right) {
        (Some(x), Some(y)) => x.is_mutual_with(y),
        _ => false,
    };
    let a_lists_b = left.is_some_and(|p| p.friends.contains(b));
    let b_lists_a = right.is_some_and(|p| p.friends.contains(a));

    if mutual && !(a_lists_b && b_lists_a) {
        Some(Repair::Link)
    } else if !mutual && (a_lists_b || b_lists_a) {
        Some(Repair::Unlink)
    } else {
        None
    }
}

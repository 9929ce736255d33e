//! Mutual-follow friendship maintenance.
//!
//! `friends` is a derived, symmetric relation: `B ∈ friends(A)` exactly
//! when `A` follows `B` and `B` follows `A`. Clients never write it. This
//! module owns every write to it.
//!
//! # Architecture
//!
//! ```text
//! ProfileChange (from the store feed)
//!     │
//!     ▼
//! FriendshipMaintainer
//!     ├── FollowingDiff        (guard + added/removed ids)
//!     ├── addition branch      (read counterparty, link if mutual)
//!     └── removal branch       (unlink unconditionally)
//!
//! Reconciler                   (full sweep, repairs failed pairs)
//! ```
//!
//! # Consistency
//!
//! Each branch writes both documents in one atomic batch. Convergence is
//! eventual: a failed batch is not retried and is repaired by the next
//! `following` change on either side, or by a [`Reconciler`] sweep.

mod diff;
mod maintainer;
mod reconcile;

pub use diff::FollowingDiff;
pub use maintainer::{
    BranchKind, BranchOutcome, BranchReport, FriendshipMaintainer, InvocationReport,
    DEFAULT_FAN_OUT,
};
pub use reconcile::{ReconcileReport, Reconciler};

//! Profile document store.
//!
//! The rest of the app owns profile documents; this module defines the
//! contract the follow graph and the friendship maintainer rely on:
//!
//! - point lookup of a document by id
//! - atomic [`WriteBatch`] commits of array-union / array-remove operations
//! - a change feed delivering one [`ProfileChange`] per updated document
//!
//! # Implementations
//!
//! ```text
//! ProfileStore (trait)
//!     ├── MemoryProfileStore  (HashMap behind a RwLock; test fake)
//!     └── SqliteProfileStore  (one JSON document per row; transactions)
//! ```
//!
//! # Batch semantics
//!
//! | Operation | Missing document | Element already in target state |
//! |-----------|------------------|---------------------------------|
//! | `ArrayUnion` | whole batch fails with `DocumentNotFound` | no-op |
//! | `ArrayRemove` | no-op | no-op |

mod batch;
mod error;
mod feed;
mod memory;
mod sqlite;

use async_trait::async_trait;

pub(crate) use batch::Condition;
pub use batch::{WriteBatch, WriteOp};
pub use error::{StoreError, StoreResult};
pub use feed::{ChangeFeed, ChangeStream, ProfileChange};
pub use memory::MemoryProfileStore;
pub use sqlite::SqliteProfileStore;

use crate::profile::{Document, UserId, UserProfile};

/// Access to the `Users` document collection.
///
/// Implementations must apply [`commit`](Self::commit) atomically and
/// publish changes only after the batch is durable.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Reads a document. Returns `Ok(None)` if it does not exist.
    async fn get_profile(&self, id: &UserId) -> StoreResult<Option<Document>>;

    /// Creates a document. Does not publish a change.
    async fn create_profile(&self, id: &UserId, doc: Document) -> StoreResult<()>;

    /// Deletes a document if present. Does not publish a change.
    async fn delete_profile(&self, id: &UserId) -> StoreResult<()>;

    /// Lists every document id in ascending order.
    async fn list_profile_ids(&self) -> StoreResult<Vec<UserId>>;

    /// Applies every operation of `batch` or none of them.
    async fn commit(&self, batch: WriteBatch) -> StoreResult<()>;

    /// Opens a subscription to committed document updates.
    fn subscribe(&self) -> ChangeStream;

    /// Reads a document and decodes it as a [`UserProfile`].
    async fn get_user(&self, id: &UserId) -> StoreResult<Option<UserProfile>> {
        Ok(self
            .get_profile(id)
            .await?
            .map(|doc| UserProfile::from_document(id.clone(), &doc)))
    }
}

//! Memories Core Library
//!
//! Server-side maintenance of the mutual-follow `friends` relation for the
//! Memories social app.
//!
//! Users follow each other one-way; two users who follow each other are
//! friends. Clients only edit `following` and `followers` (see
//! [`graph::SocialGraph`]). Every committed profile update is delivered to
//! the [`friendship::FriendshipMaintainer`] by the [`trigger`] runtime,
//! which links or unlinks `friends` on both documents in one atomic batch.
//!
//! # Modules
//!
//! - [`profile`]: ids, id sets and the profile document shape
//! - [`store`]: the document store contract, batches and change feed
//! - [`friendship`]: the maintainer and the reconciliation sweep
//! - [`trigger`]: event delivery with bounded concurrency and timeouts
//! - [`graph`]: client follow/unfollow paths

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

mod api;
mod error;
pub mod friendship;
pub mod graph;
pub mod profile;
pub mod store;
pub mod trigger;

pub use api::{MemoriesCore, DATABASE_FILE};
pub use error::{CoreError, Result};

//! User profile data model.
//!
//! Profile documents live in a schemaless document store. This module
//! gives them a typed shape for the follow graph:
//!
//! - [`UserId`]: validated document id
//! - [`IdSet`]: set of ids decoded from an array field
//! - [`ProfileField`]: the array-valued relation fields
//! - [`UserProfile`]: typed view over a [`Document`]
//!
//! # Relations
//!
//! | Field | Writer | Meaning |
//! |-------|--------|---------|
//! | `following` | owning user's client | ids this user follows |
//! | `followers` | follower's client | informational mirror |
//! | `friends` | friendship maintainer only | mutual follows |

mod error;
pub mod types;

pub use error::{ProfileError, Result};
pub use types::{Document, IdSet, ProfileField, UserId, UserProfile};

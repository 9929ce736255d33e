//! Core types for user profiles.
//!
//! Profile documents are schemaless JSON objects in the document store.
//! This module provides strongly-typed views over the fields the follow
//! graph cares about: identifiers, id sets, and the profile itself.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{ProfileError, Result};

/// Schemaless body of a profile document.
pub type Document = Map<String, Value>;

/// Maximum size of a document id in bytes.
pub const MAX_ID_BYTES: usize = 1500;

/// Length of auto-generated document ids.
pub const GENERATED_ID_LEN: usize = 20;

/// Field name holding the display username.
pub const USERNAME_FIELD: &str = "username";

/// Field name holding the creation timestamp (Unix seconds).
pub const CREATED_AT_FIELD: &str = "created_at";

/// Stable identifier of a user profile document.
///
/// Follows document-store id rules: non-empty, at most [`MAX_ID_BYTES`]
/// bytes, no `/`, not `.` or `..`, and not of the reserved form `__name__`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Creates a validated user id.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::InvalidId`] if the id violates document id rules.
    ///
    /// # Examples
    ///
    /// ```
    /// use memories_core::profile::UserId;
    ///
    /// let id = UserId::new("alice").unwrap();
    /// assert_eq!(id.as_str(), "alice");
    /// assert!(UserId::new("users/alice").is_err());
    /// ```
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(ProfileError::InvalidId("id is empty".to_string()));
        }
        if id.len() > MAX_ID_BYTES {
            return Err(ProfileError::InvalidId(format!(
                "id exceeds {MAX_ID_BYTES} bytes"
            )));
        }
        if id.contains('/') {
            return Err(ProfileError::InvalidId(id));
        }
        if id == "." || id == ".." {
            return Err(ProfileError::InvalidId(id));
        }
        if id.len() >= 4 && id.starts_with("__") && id.ends_with("__") {
            return Err(ProfileError::InvalidId(id));
        }
        Ok(Self(id))
    }

    /// Generates a random 20-character alphanumeric id.
    #[must_use]
    pub fn generate() -> Self {
        let id: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for UserId {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = ProfileError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Array-valued relation fields on a profile document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProfileField {
    /// Ids this user follows. Written by the owning user's client.
    Following,
    /// Ids following this user. Informational mirror.
    Followers,
    /// Derived mutual-follow relation. Written only by the maintainer.
    Friends,
}

impl ProfileField {
    /// Returns the document field name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Following => "following",
            Self::Followers => "followers",
            Self::Friends => "friends",
        }
    }

    /// Returns whether client code paths may write this field.
    #[must_use]
    pub const fn is_client_writable(&self) -> bool {
        matches!(self, Self::Following | Self::Followers)
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered set of user ids.
///
/// Replaces untyped arrays of ids read from documents. Duplicates and
/// ordering in the underlying array carry no meaning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdSet(BTreeSet<UserId>);

impl IdSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Reads an id set from an array field of a document.
    ///
    /// A missing field or a non-array value yields the empty set. Entries
    /// that are not strings or not valid ids are skipped.
    ///
    /// # Examples
    ///
    /// ```
    /// use memories_core::profile::{Document, IdSet, ProfileField};
    /// use serde_json::json;
    ///
    /// let doc: Document = serde_json::from_value(json!({
    ///     "following": ["bob", "carol", "bob", 42]
    /// })).unwrap();
    ///
    /// let following = IdSet::from_field(&doc, ProfileField::Following);
    /// assert_eq!(following.len(), 2);
    /// assert!(IdSet::from_field(&doc, ProfileField::Friends).is_empty());
    /// ```
    #[must_use]
    pub fn from_field(doc: &Document, field: ProfileField) -> Self {
        match doc.get(field.as_str()) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter_map(|s| UserId::new(s).ok())
                .collect(),
            _ => Self::new(),
        }
    }

    /// Returns whether the set contains `id`.
    #[must_use]
    pub fn contains(&self, id: &UserId) -> bool {
        self.0.contains(id)
    }

    /// Returns the ids in `self` that are not in `other`.
    #[must_use]
    pub fn difference(&self, other: &Self) -> Self {
        self.0.difference(&other.0).cloned().collect()
    }

    /// Returns the ids present in either set.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        self.0.union(&other.0).cloned().collect()
    }

    /// Returns the number of ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &UserId> {
        self.0.iter()
    }
}

impl FromIterator<UserId> for IdSet {
    fn from_iter<I: IntoIterator<Item = UserId>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for IdSet {
    type Item = UserId;
    type IntoIter = std::collections::btree_set::IntoIter<UserId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a IdSet {
    type Item = &'a UserId;
    type IntoIter = std::collections::btree_set::Iter<'a, UserId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Typed view of a user profile document.
///
/// Only the fields relevant to the follow graph are decoded; all other
/// document fields are owned by the rest of the app and ignored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Document id.
    pub id: UserId,
    /// Display username, if set.
    pub username: Option<String>,
    /// Ids this user follows.
    pub following: IdSet,
    /// Ids following this user.
    pub followers: IdSet,
    /// Mutual-follow ids, maintained by the friendship maintainer.
    pub friends: IdSet,
    /// When the profile was created (Unix timestamp).
    pub created_at: Option<i64>,
}

impl UserProfile {
    /// Decodes a profile from its document, tolerating missing fields.
    #[must_use]
    pub fn from_document(id: UserId, doc: &Document) -> Self {
        Self {
            id,
            username: doc
                .get(USERNAME_FIELD)
                .and_then(Value::as_str)
                .map(str::to_owned),
            following: IdSet::from_field(doc, ProfileField::Following),
            followers: IdSet::from_field(doc, ProfileField::Followers),
            friends: IdSet::from_field(doc, ProfileField::Friends),
            created_at: doc.get(CREATED_AT_FIELD).and_then(Value::as_i64),
        }
    }

    /// Builds the initial document for a newly registered user.
    #[must_use]
    pub fn new_document(username: &str, created_at: i64) -> Document {
        let mut doc = Document::new();
        doc.insert(USERNAME_FIELD.to_string(), Value::from(username));
        doc.insert(CREATED_AT_FIELD.to_string(), Value::from(created_at));
        for field in [
            ProfileField::Following,
            ProfileField::Followers,
            ProfileField::Friends,
        ] {
            doc.insert(field.as_str().to_string(), Value::Array(Vec::new()));
        }
        doc
    }

    /// Returns whether both users follow each other.
    #[must_use]
    pub fn is_mutual_with(&self, other: &Self) -> bool {
        self.id != other.id
            && self.following.contains(&other.id)
            && other.following.contains(&self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> UserId {
        UserId::new(s).unwrap()
    }

    fn doc(value: Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn user_id_accepts_plain_ids() {
        assert!(UserId::new("alice").is_ok());
        assert!(UserId::new("u_123-XYZ").is_ok());
        assert!(UserId::new("__partial").is_ok());
    }

    #[test]
    fn user_id_rejects_invalid_ids() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("a/b").is_err());
        assert!(UserId::new(".").is_err());
        assert!(UserId::new("..").is_err());
        assert!(UserId::new("__reserved__").is_err());
        assert!(UserId::new("x".repeat(MAX_ID_BYTES + 1)).is_err());
    }

    #[test]
    fn user_id_at_size_limit_is_valid() {
        assert!(UserId::new("x".repeat(MAX_ID_BYTES)).is_ok());
    }

    #[test]
    fn generated_ids_are_alphanumeric_and_distinct() {
        let a = UserId::generate();
        let b = UserId::generate();
        assert_eq!(a.as_str().len(), GENERATED_ID_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn user_id_serde_validates() {
        let parsed: UserId = serde_json::from_value(json!("bob")).unwrap();
        assert_eq!(parsed, id("bob"));
        assert!(serde_json::from_value::<UserId>(json!("a/b")).is_err());
        assert_eq!(serde_json::to_value(id("bob")).unwrap(), json!("bob"));
    }

    #[test]
    fn only_friends_is_not_client_writable() {
        assert!(ProfileField::Following.is_client_writable());
        assert!(ProfileField::Followers.is_client_writable());
        assert!(!ProfileField::Friends.is_client_writable());
    }

    #[test]
    fn id_set_from_missing_field_is_empty() {
        let d = doc(json!({ "username": "alice" }));
        assert!(IdSet::from_field(&d, ProfileField::Following).is_empty());
    }

    #[test]
    fn id_set_from_non_array_is_empty() {
        let d = doc(json!({ "following": "bob" }));
        assert!(IdSet::from_field(&d, ProfileField::Following).is_empty());
    }

    #[test]
    fn id_set_skips_invalid_entries_and_duplicates() {
        let d = doc(json!({ "following": ["bob", null, "bob", "a/b", 7, "carol"] }));
        let set = IdSet::from_field(&d, ProfileField::Following);
        let ids: Vec<&str> = set.iter().map(UserId::as_str).collect();
        assert_eq!(ids, vec!["bob", "carol"]);
    }

    #[test]
    fn id_set_equality_ignores_order() {
        let a = IdSet::from_field(
            &doc(json!({ "following": ["x", "y", "z"] })),
            ProfileField::Following,
        );
        let b = IdSet::from_field(
            &doc(json!({ "following": ["z", "x", "y", "x"] })),
            ProfileField::Following,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn id_set_set_operations() {
        let a: IdSet = [id("a"), id("b"), id("c")].into_iter().collect();
        let b: IdSet = [id("b"), id("c"), id("d")].into_iter().collect();

        assert_eq!(a.difference(&b), [id("a")].into_iter().collect());
        assert_eq!(b.difference(&a), [id("d")].into_iter().collect());
        assert_eq!(a.union(&b).len(), 4);
    }

    #[test]
    fn profile_from_document_decodes_fields() {
        let d = doc(json!({
            "username": "alice",
            "created_at": 1_700_000_000,
            "following": ["bob"],
            "followers": ["bob", "carol"],
            "friends": ["bob"],
            "bio": "ignored"
        }));
        let profile = UserProfile::from_document(id("alice"), &d);

        assert_eq!(profile.username.as_deref(), Some("alice"));
        assert_eq!(profile.created_at, Some(1_700_000_000));
        assert_eq!(profile.following.len(), 1);
        assert_eq!(profile.followers.len(), 2);
        assert!(profile.friends.contains(&id("bob")));
    }

    #[test]
    fn new_document_has_empty_relations() {
        let d = UserProfile::new_document("alice", 42);
        let profile = UserProfile::from_document(id("alice"), &d);

        assert!(profile.following.is_empty());
        assert!(profile.followers.is_empty());
        assert!(profile.friends.is_empty());
        assert_eq!(d.get("friends"), Some(&json!([])));
        assert_eq!(profile.created_at, Some(42));
    }

    #[test]
    fn mutuality_requires_both_edges() {
        let alice = UserProfile::from_document(
            id("alice"),
            &doc(json!({ "following": ["bob"] })),
        );
        let bob_one_way = UserProfile::from_document(id("bob"), &doc(json!({})));
        let bob_mutual = UserProfile::from_document(
            id("bob"),
            &doc(json!({ "following": ["alice"] })),
        );

        assert!(!alice.is_mutual_with(&bob_one_way));
        assert!(alice.is_mutual_with(&bob_mutual));
        assert!(bob_mutual.is_mutual_with(&alice));
    }

    #[test]
    fn self_follow_is_never_mutual() {
        let narcissus = UserProfile::from_document(
            id("narcissus"),
            &doc(json!({ "following": ["narcissus"] })),
        );
        assert!(!narcissus.is_mutual_with(&narcissus.clone()));
    }
}

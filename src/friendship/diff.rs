//! Symmetric difference of `following` snapshots.

use crate::profile::{Document, IdSet, ProfileField};

/// Ids added to and removed from a user's `following` set by one update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FollowingDiff {
    /// Ids present after the update but not before.
    pub added: IdSet,
    /// Ids present before the update but not after.
    pub removed: IdSet,
}

impl FollowingDiff {
    /// Computes the difference between two `following` sets.
    #[must_use]
    pub fn between(before: &IdSet, after: &IdSet) -> Self {
        Self {
            added: after.difference(before),
            removed: before.difference(after),
        }
    }

    /// Computes the difference between the `following` fields of two
    /// document snapshots. A missing field counts as an empty set.
    ///
    /// # Examples
    ///
    /// ```
    /// use memories_core::friendship::FollowingDiff;
    /// use memories_core::profile::Document;
    /// use serde_json::json;
    ///
    /// let before: Document = serde_json::from_value(json!({ "following": ["bob", "carol"] })).unwrap();
    /// let after: Document = serde_json::from_value(json!({ "following": ["carol", "dave"] })).unwrap();
    ///
    /// let diff = FollowingDiff::from_documents(&before, &after);
    /// assert_eq!(diff.added.len(), 1);
    /// assert_eq!(diff.removed.len(), 1);
    /// ```
    #[must_use]
    pub fn from_documents(before: &Document, after: &Document) -> Self {
        Self::between(
            &IdSet::from_field(before, ProfileField::Following),
            &IdSet::from_field(after, ProfileField::Following),
        )
    }

    /// Returns whether the `following` set is unchanged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Returns the total number of changed edges.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::UserId;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    fn ids(names: &[&str]) -> IdSet {
        names.iter().map(|n| UserId::new(*n).unwrap()).collect()
    }

    #[test]
    fn identical_sets_produce_empty_diff() {
        let diff = FollowingDiff::between(&ids(&["a", "b"]), &ids(&["b", "a"]));
        assert!(diff.is_empty());
        assert_eq!(diff.len(), 0);
    }

    #[test]
    fn rewritten_field_with_same_contents_is_empty() {
        let diff = FollowingDiff::from_documents(
            &doc(json!({ "following": ["a", "b"], "bio": "old" })),
            &doc(json!({ "following": ["b", "a", "a"], "bio": "new" })),
        );
        assert!(diff.is_empty());
    }

    #[test]
    fn multiple_additions_and_removals_are_all_reported() {
        let diff = FollowingDiff::between(&ids(&["a", "b", "c"]), &ids(&["c", "d", "e"]));
        assert_eq!(diff.added, ids(&["d", "e"]));
        assert_eq!(diff.removed, ids(&["a", "b"]));
        assert_eq!(diff.len(), 4);
    }

    #[test]
    fn missing_field_counts_as_empty() {
        let added = FollowingDiff::from_documents(&doc(json!({})), &doc(json!({ "following": ["a"] })));
        assert_eq!(added.added, ids(&["a"]));
        assert!(added.removed.is_empty());

        let removed = FollowingDiff::from_documents(&doc(json!({ "following": ["a"] })), &doc(json!({})));
        assert_eq!(removed.removed, ids(&["a"]));

        assert!(FollowingDiff::from_documents(&doc(json!({})), &doc(json!({}))).is_empty());
    }
}

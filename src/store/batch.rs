//! Atomic multi-document write batches.
//!
//! A [`WriteBatch`] is a list of array-field operations applied to profile
//! documents as a single all-or-nothing unit. Both operations are
//! idempotent: a union never duplicates an element and a remove of an
//! absent element changes nothing.
//!
//! Crate-internal batches may also carry [`Condition`]s on the follow
//! graph. Conditions are checked against the documents as they are read
//! inside the commit, so a batch planned from an older snapshot cannot
//! land after the graph has moved on.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;

use super::error::{StoreError, StoreResult};
use crate::profile::{Document, IdSet, ProfileError, ProfileField, UserId};

/// A single array-field operation on one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Add `value` to the array unless an equal element is already present.
    ArrayUnion {
        /// Target document.
        doc: UserId,
        /// Target array field.
        field: ProfileField,
        /// Element to add.
        value: UserId,
    },
    /// Remove every element equal to `value`.
    ArrayRemove {
        /// Target document.
        doc: UserId,
        /// Target array field.
        field: ProfileField,
        /// Element to remove.
        value: UserId,
    },
}

impl WriteOp {
    /// Returns the target document id.
    #[must_use]
    pub const fn doc(&self) -> &UserId {
        match self {
            Self::ArrayUnion { doc, .. } | Self::ArrayRemove { doc, .. } => doc,
        }
    }

    /// Returns the target field.
    #[must_use]
    pub const fn field(&self) -> ProfileField {
        match self {
            Self::ArrayUnion { field, .. } | Self::ArrayRemove { field, .. } => *field,
        }
    }

    /// Returns the element being added or removed.
    #[must_use]
    pub const fn value(&self) -> &UserId {
        match self {
            Self::ArrayUnion { value, .. } | Self::ArrayRemove { value, .. } => value,
        }
    }

    /// Returns whether this operation requires the document to exist.
    #[must_use]
    pub const fn requires_document(&self) -> bool {
        matches!(self, Self::ArrayUnion { .. })
    }

    /// Applies the operation to a document body.
    ///
    /// A union on a missing or non-array field replaces it with a
    /// one-element array. A remove on a missing or non-array field does
    /// nothing. Returns whether the document changed.
    pub fn apply(&self, doc: &mut Document) -> bool {
        let key = self.field().as_str();
        let element = Value::String(self.value().as_str().to_owned());

        match self {
            Self::ArrayUnion { .. } => match doc.get_mut(key) {
                Some(Value::Array(items)) => {
                    if items.contains(&element) {
                        false
                    } else {
                        items.push(element);
                        true
                    }
                }
                _ => {
                    doc.insert(key.to_string(), Value::Array(vec![element]));
                    true
                }
            },
            Self::ArrayRemove { .. } => match doc.get_mut(key) {
                Some(Value::Array(items)) => {
                    let before = items.len();
                    items.retain(|item| item != &element);
                    items.len() != before
                }
                _ => false,
            },
        }
    }
}

/// A precondition on the follow graph checked when a batch is staged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Condition {
    /// Both users exist, are distinct and follow each other.
    Mutual(UserId, UserId),
    /// The users are not mutual followers.
    NotMutual(UserId, UserId),
}

impl Condition {
    fn pair(&self) -> (&UserId, &UserId) {
        match self {
            Self::Mutual(a, b) | Self::NotMutual(a, b) => (a, b),
        }
    }

    const fn expects_mutual(&self) -> bool {
        matches!(self, Self::Mutual(..))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutual(a, b) => write!(f, "{a} and {b} follow each other"),
            Self::NotMutual(a, b) => write!(f, "{a} and {b} are not mutual followers"),
        }
    }
}

/// An ordered list of operations committed atomically.
///
/// Client code can only target client-writable fields. Writes to
/// `friends` are built exclusively inside this crate by the friendship
/// maintainer and the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
    conditions: Vec<Condition>,
}

impl WriteBatch {
    /// Creates an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ops: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// Adds an array-union of `value` into `field` of `doc`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::ReadOnlyField`] if `field` is not client-writable.
    pub fn array_union(
        &mut self,
        doc: UserId,
        field: ProfileField,
        value: UserId,
    ) -> Result<&mut Self, ProfileError> {
        ensure_client_writable(field)?;
        self.ops.push(WriteOp::ArrayUnion { doc, field, value });
        Ok(self)
    }

    /// Adds an array-remove of `value` from `field` of `doc`.
    ///
    /// # Errors
    ///
    /// Returns [`ProfileError::ReadOnlyField`] if `field` is not client-writable.
    pub fn array_remove(
        &mut self,
        doc: UserId,
        field: ProfileField,
        value: UserId,
    ) -> Result<&mut Self, ProfileError> {
        ensure_client_writable(field)?;
        self.ops.push(WriteOp::ArrayRemove { doc, field, value });
        Ok(self)
    }

    /// Builds the batch recording a friendship on both documents.
    pub(crate) fn link_friends(a: &UserId, b: &UserId) -> Self {
        Self {
            ops: vec![
                WriteOp::ArrayUnion {
                    doc: b.clone(),
                    field: ProfileField::Friends,
                    value: a.clone(),
                },
                WriteOp::ArrayUnion {
                    doc: a.clone(),
                    field: ProfileField::Friends,
                    value: b.clone(),
                },
            ],
            conditions: Vec::new(),
        }
    }

    /// Builds the batch erasing a friendship from both documents.
    pub(crate) fn unlink_friends(a: &UserId, b: &UserId) -> Self {
        Self {
            ops: vec![
                WriteOp::ArrayRemove {
                    doc: b.clone(),
                    field: ProfileField::Friends,
                    value: a.clone(),
                },
                WriteOp::ArrayRemove {
                    doc: a.clone(),
                    field: ProfileField::Friends,
                    value: b.clone(),
                },
            ],
            conditions: Vec::new(),
        }
    }

    /// Makes the batch fail with [`StoreError::ConditionFailed`] unless
    /// `condition` holds when it is staged.
    pub(crate) fn require(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Returns the preconditions checked before any operation applies.
    pub(crate) fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Returns the operations in application order.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Returns the distinct documents this batch touches.
    #[must_use]
    pub fn documents(&self) -> BTreeSet<&UserId> {
        self.ops.iter().map(WriteOp::doc).collect()
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns whether the batch has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

fn ensure_client_writable(field: ProfileField) -> Result<(), ProfileError> {
    if field.is_client_writable() {
        Ok(())
    } else {
        Err(ProfileError::ReadOnlyField(field.as_str()))
    }
}

/// A document whose body changed while staging a batch.
#[derive(Debug, Clone)]
pub(crate) struct StagedWrite {
    pub user_id: UserId,
    pub before: Document,
    pub after: Document,
}

type Slot = Option<(Document, Document)>;

/// Applies a batch to copies of the documents it touches.
///
/// Conditions are checked first, against the documents as loaded.
/// `load` is called at most once per document. Nothing is written: the
/// caller persists the returned documents only if staging succeeds, which
/// is what makes a batch all-or-nothing. Documents whose body did not
/// change are omitted from the result.
///
/// # Errors
///
/// Returns [`StoreError::ConditionFailed`] if a condition does not hold,
/// [`StoreError::DocumentNotFound`] if a union targets a missing
/// document, or any error returned by `load`.
pub(crate) fn stage<F>(batch: &WriteBatch, mut load: F) -> StoreResult<Vec<StagedWrite>>
where
    F: FnMut(&UserId) -> StoreResult<Option<Document>>,
{
    let mut staged: BTreeMap<UserId, Slot> = BTreeMap::new();

    for condition in batch.conditions() {
        let (a, b) = condition.pair();
        load_slot(&mut staged, a, &mut load)?;
        load_slot(&mut staged, b, &mut load)?;

        let follows = |from: &UserId, to: &UserId| {
            staged
                .get(from)
                .and_then(Option::as_ref)
                .is_some_and(|(before, _)| {
                    IdSet::from_field(before, ProfileField::Following).contains(to)
                })
        };
        let mutual = a != b && follows(a, b) && follows(b, a);
        if mutual != condition.expects_mutual() {
            return Err(StoreError::ConditionFailed(condition.to_string()));
        }
    }

    for op in batch.ops() {
        match load_slot(&mut staged, op.doc(), &mut load)? {
            Some((_, after)) => {
                op.apply(after);
            }
            None if op.requires_document() => {
                return Err(StoreError::DocumentNotFound(op.doc().clone()));
            }
            // Removing from a missing document already has the desired effect.
            None => {}
        }
    }

    Ok(staged
        .into_iter()
        .filter_map(|(user_id, slot)| {
            slot.and_then(|(before, after)| {
                (before != after).then_some(StagedWrite {
                    user_id,
                    before,
                    after,
                })
            })
        })
        .collect())
}

fn load_slot<'a, F>(
    staged: &'a mut BTreeMap<UserId, Slot>,
    id: &UserId,
    load: &mut F,
) -> StoreResult<&'a mut Slot>
where
    F: FnMut(&UserId) -> StoreResult<Option<Document>>,
{
    match staged.entry(id.clone()) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            let loaded = load(id)?;
            Ok(entry.insert(loaded.map(|doc| (doc.clone(), doc))))
        }
    }
}

//! Operation outcomes.
//!
//! Every public mutation reports its result as a discriminated outcome;
//! the tree never signals failures out-of-band. After any non-`Inserted` /
//! non-`Removed` outcome the tree is indistinguishable from one in which
//! the operation was never attempted.

// ============================================================================
//  Insert
// ============================================================================

/// Outcome of [`insert`](crate::CrabTree::insert) and
/// [`insert_distinct`](crate::CrabTree::insert_distinct).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum InsertOutcome {
    /// The (key, value) pair was added.
    Inserted,

    /// The exact (key, value) pair was already present and duplicate
    /// suppression was requested; nothing changed.
    NoOp,
}

// ============================================================================
//  InsertUnique
// ============================================================================

/// Outcome of [`insert_unique`](crate::CrabTree::insert_unique).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum UniqueInsertOutcome {
    /// The (key, value) pair was added.
    Inserted,

    /// The exact value was already associated with the key.
    DuplicateValue,

    /// The caller's predicate matched an existing value for the key.
    PredicateConflict,
}

// ============================================================================
//  Delete
// ============================================================================

/// Outcome of [`delete`](crate::CrabTree::delete).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum DeleteOutcome {
    /// One occurrence of the (key, value) pair was removed.
    Removed,

    /// No occurrence of the (key, value) pair exists.
    NotFound,
}

impl InsertOutcome {
    /// True when the pair was added.
    #[must_use]
    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

impl UniqueInsertOutcome {
    /// True when the pair was added.
    #[must_use]
    pub const fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

impl DeleteOutcome {
    /// True when an occurrence was removed.
    #[must_use]
    pub const fn is_removed(self) -> bool {
        matches!(self, Self::Removed)
    }
}

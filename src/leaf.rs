//! Leaf nodes.
//!
//! A leaf holds an ordered sequence of [`ValueList`] entries (ascending by
//! key, keys unique within the leaf) plus weak links to its left and right
//! leaf siblings. The sibling chain spans the whole tree in ascending key
//! order, so a linear walk over (chain, in-leaf order) visits every entry;
//! range scans rely on it.
//!
//! Leaves are small (bounded by the tree's `order`), so entry location is
//! a linear scan; keeping the sequence physically sorted makes the
//! ordered-sequence invariant trivial.

use crate::keyops::KeyOps;
use crate::node::NodeWeak;
use crate::values::ValueList;

// ============================================================================
//  Mutation signals
// ============================================================================

/// Signal from [`LeafNode::insert_at_leaf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeafInsert {
    /// The value was stored. `new_entry` is true when a new distinct key
    /// was spliced in (the entry count grew by one).
    Inserted { new_entry: bool },

    /// Duplicate suppression was requested and the exact (key, value)
    /// pair already exists; nothing changed.
    NoOp,
}

/// Signal from [`LeafNode::remove_from_leaf`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LeafRemove {
    /// One occurrence was removed. `entry_removed` is true when the
    /// multiset emptied and the whole entry was spliced out.
    Removed { entry_removed: bool },

    /// No matching (key, value) occurrence exists in this leaf.
    NotFound,
}

// ============================================================================
//  LeafNode
// ============================================================================

/// A leaf: ordered entries plus the sibling chain links.
pub(crate) struct LeafNode<K, V> {
    /// Entries in ascending key order, one per distinct key.
    entries: Vec<ValueList<K, V>>,

    /// Left sibling in the leaf chain (`None` at the leftmost leaf).
    left: Option<NodeWeak<K, V>>,

    /// Right sibling in the leaf chain (`None` at the rightmost leaf).
    right: Option<NodeWeak<K, V>>,
}

impl<K, V> LeafNode<K, V> {
    /// Create an empty, unlinked leaf.
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            left: None,
            right: None,
        }
    }

    /// Create an unlinked leaf from already-ordered entries.
    pub(crate) fn from_entries(entries: Vec<ValueList<K, V>>) -> Self {
        Self {
            entries,
            left: None,
            right: None,
        }
    }

    /// Number of entries (distinct keys) in this leaf.
    #[inline]
    pub(crate) fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// The entries in ascending key order.
    #[inline]
    pub(crate) fn entries(&self) -> &[ValueList<K, V>] {
        &self.entries
    }

    /// Key of the smallest entry, if any.
    pub(crate) fn first_key(&self) -> Option<&K> {
        self.entries.first().map(ValueList::key)
    }

    // ========================================================================
    //  Sibling chain
    // ========================================================================

    pub(crate) fn left_sibling(&self) -> Option<&NodeWeak<K, V>> {
        self.left.as_ref()
    }

    pub(crate) fn right_sibling(&self) -> Option<&NodeWeak<K, V>> {
        self.right.as_ref()
    }

    pub(crate) fn set_left_sibling(&mut self, left: Option<NodeWeak<K, V>>) {
        self.left = left;
    }

    pub(crate) fn set_right_sibling(&mut self, right: Option<NodeWeak<K, V>>) {
        self.right = right;
    }

    // ========================================================================
    //  Entry location
    // ========================================================================

    /// Locate `key` by linear scan.
    ///
    /// Returns `Ok(i)` when entry `i` holds an equal key, `Err(i)` with
    /// the splice position that keeps the leaf ordered otherwise.
    pub(crate) fn position_of<O: KeyOps<K, V>>(&self, key: &K, ops: &O) -> Result<usize, usize> {
        for (i, entry) in self.entries.iter().enumerate() {
            if ops.key_eq(entry.key(), key) {
                return Ok(i);
            }
            if ops.key_less(key, entry.key()) {
                return Err(i);
            }
        }
        Err(self.entries.len())
    }

    /// The entry holding `key`, if present.
    pub(crate) fn find_entry<O: KeyOps<K, V>>(&self, key: &K, ops: &O) -> Option<&ValueList<K, V>> {
        match self.position_of(key, ops) {
            Ok(i) => self.entries.get(i),
            Err(_) => None,
        }
    }

    // ========================================================================
    //  Mutations
    // ========================================================================

    /// Store `value` under `key`.
    ///
    /// If the key exists, the value is appended to its multiset, unless
    /// `allow_duplicate_values` is false and the exact value is already
    /// present, which signals [`LeafInsert::NoOp`]. Otherwise a fresh
    /// entry is spliced in at the ordered position.
    pub(crate) fn insert_at_leaf<O: KeyOps<K, V>>(
        &mut self,
        key: K,
        value: V,
        allow_duplicate_values: bool,
        ops: &O,
    ) -> LeafInsert {
        match self.position_of(&key, ops) {
            Ok(i) => {
                #[expect(clippy::indexing_slicing, reason = "position_of returned a live index")]
                let entry = &mut self.entries[i];
                if !allow_duplicate_values && entry.contains_value(&value, ops) {
                    return LeafInsert::NoOp;
                }
                entry.add_value(value);
                LeafInsert::Inserted { new_entry: false }
            }
            Err(at) => {
                self.entries.insert(at, ValueList::new(key, value));
                LeafInsert::Inserted { new_entry: true }
            }
        }
    }

    /// Remove one occurrence of `value` under `key`.
    ///
    /// An emptied entry is spliced out and the entry count shrinks.
    pub(crate) fn remove_from_leaf<O: KeyOps<K, V>>(
        &mut self,
        key: &K,
        value: &V,
        ops: &O,
    ) -> LeafRemove {
        let Ok(i) = self.position_of(key, ops) else {
            return LeafRemove::NotFound;
        };

        #[expect(clippy::indexing_slicing, reason = "position_of returned a live index")]
        let entry = &mut self.entries[i];
        if !entry.remove_one(value, ops) {
            return LeafRemove::NotFound;
        }

        if entry.is_empty() {
            self.entries.remove(i);
            return LeafRemove::Removed {
                entry_removed: true,
            };
        }
        LeafRemove::Removed {
            entry_removed: false,
        }
    }

    // ========================================================================
    //  Split / rebalance primitives
    // ========================================================================

    /// Move the upper half of the entries out for a split.
    ///
    /// Entries `0..floor(s/2)` remain; the rest are returned together with
    /// a copy of the first moved key, the separator to push up.
    pub(crate) fn split_off_upper_half(&mut self) -> (K, Vec<ValueList<K, V>>)
    where
        K: Clone,
    {
        let at = self.entries.len() / 2;
        let upper = self.entries.split_off(at);
        #[expect(
            clippy::expect_used,
            reason = "splits run on overfull leaves; the upper half is never empty"
        )]
        let separator = upper
            .first()
            .map(|entry| entry.key().clone())
            .expect("split of leaf with no upper half");
        (separator, upper)
    }

    /// Detach the smallest entry (borrow-to-left-neighbor donor side).
    pub(crate) fn take_first_entry(&mut self) -> ValueList<K, V> {
        self.entries.remove(0)
    }

    /// Detach the largest entry (borrow-to-right-neighbor donor side).
    #[expect(clippy::expect_used, reason = "donors are checked non-empty before borrowing")]
    pub(crate) fn take_last_entry(&mut self) -> ValueList<K, V> {
        self.entries.pop().expect("take_last_entry on empty leaf")
    }

    /// Append an entry whose key is greater than every present key.
    pub(crate) fn push_back_entry(&mut self, entry: ValueList<K, V>) {
        self.entries.push(entry);
    }

    /// Prepend an entry whose key is smaller than every present key.
    pub(crate) fn push_front_entry(&mut self, entry: ValueList<K, V>) {
        self.entries.insert(0, entry);
    }

    /// Append all entries of a right-hand merge victim.
    pub(crate) fn append_entries(&mut self, entries: Vec<ValueList<K, V>>) {
        self.entries.extend(entries);
    }

    /// Take every entry out (merge victim side).
    pub(crate) fn drain_entries(&mut self) -> Vec<ValueList<K, V>> {
        std::mem::take(&mut self.entries)
    }

    /// Estimated heap footprint of the entry storage.
    pub(crate) fn entries_heap_bytes(&self) -> u64 {
        self.entries.iter().map(ValueList::heap_bytes).sum()
    }
}

// ============================================================================
//  Tests
// ============================================================================

//! The concurrent B+Tree multimap.
//!
//! [`CrabTree`] owns the root handle behind the tree-level ordering lock
//! (the *root anchor*), the branching parameter `order`, and the
//! writer-turn counter. Writers enter through the anchor in FIFO order,
//! draw a turn ticket, and descend with lock crabbing; readers pass the
//! anchor shared and descend hand-over-hand.
//!
//! # Write protocol
//!
//! ```text
//! 1. anchor.write()                       // FIFO turn; root cannot move
//! 2. ticket = turn.fetch_add(1)           // serialization order
//! 3. lock root; drop anchor if the root is structurally safe
//! 4. descend: lock child, test safety, release held ancestors if safe
//! 5. mutate the leaf
//! 6. split_up / merge_up along the still-held path (4.)
//! 7. drop guards
//! ```
//!
//! The held path after step 4 runs from the shallowest unsafe ancestor to
//! the leaf: exactly the nodes a split or merge may restructure. Readers
//! can never observe a node mid-restructure because every restructured
//! node is write-locked for the duration.

mod descent;
mod rebalance;
mod scan;
mod split;
mod validate;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::events;
use crate::keyops::{KeyOps, OrdKeyOps};
use crate::leaf::{LeafInsert, LeafRemove};
use crate::node::{Node, NodeBody, NodeRef};
use crate::outcome::{DeleteOutcome, InsertOutcome, UniqueInsertOutcome};
use crate::ticketlock::TicketRwLock;
use crate::values::ValueList;

use descent::WriteIntent;

pub use validate::TreeStats;

// ============================================================================
//  Root anchor
// ============================================================================

/// The root handle, guarded by the tree-level ordering lock.
///
/// Held exclusive only while a writer enters (briefly) or while the root
/// itself may split or collapse; the root pointer changes only under this
/// lock.
pub(crate) struct RootAnchor<K, V> {
    pub(crate) root: NodeRef<K, V>,
}

// ============================================================================
//  CrabTree
// ============================================================================

/// A concurrent ordered multimap index organized as a B+Tree, named for
/// the lock-crabbing protocol that serializes its structural changes.
///
/// Maps keys to multisets of values. Generic over the comparator bundle
/// `O`; all comparisons route through it.
///
/// # Example
///
/// ```
/// use crabtree::{CrabTree, InsertOutcome};
///
/// let tree: CrabTree<u64, u64> = CrabTree::new(8);
/// assert_eq!(tree.insert(4, 400), InsertOutcome::Inserted);
/// assert_eq!(tree.insert(4, 401), InsertOutcome::Inserted);
/// assert_eq!(tree.get_value(&4).len(), 2);
/// ```
pub struct CrabTree<K, V, O = OrdKeyOps> {
    /// Maximum entries per leaf / separators per internal node.
    order: usize,

    /// The comparator bundle; lives once on the tree.
    ops: O,

    /// Tree-level ordering lock around the root handle.
    anchor: Arc<TicketRwLock<RootAnchor<K, V>>>,

    /// Writer-turn counter; drawn under the anchor's write lock.
    turn: AtomicU64,

    /// Live (key, value) pair count.
    len: AtomicU64,
}

impl<K: Ord, V: PartialEq> CrabTree<K, V> {
    /// Create an empty tree with the default [`OrdKeyOps`] bundle.
    ///
    /// # Panics
    /// Panics if `order < 2`.
    #[must_use]
    pub fn new(order: u32) -> Self {
        Self::with_key_ops(order, OrdKeyOps)
    }
}

impl<K, V, O: KeyOps<K, V>> CrabTree<K, V, O> {
    /// Create an empty tree with a caller-supplied comparator bundle.
    ///
    /// # Panics
    /// Panics if `order < 2`.
    #[must_use]
    pub fn with_key_ops(order: u32, ops: O) -> Self {
        assert!(order >= 2, "order must be at least 2");
        Self {
            order: order as usize,
            ops,
            anchor: Arc::new(TicketRwLock::new(RootAnchor {
                root: Node::new_leaf_ref(),
            })),
            turn: AtomicU64::new(0),
            len: AtomicU64::new(0),
        }
    }

    /// The branching parameter.
    #[must_use]
    pub fn order(&self) -> u32 {
        #[expect(clippy::cast_possible_truncation, reason = "order was constructed from u32")]
        {
            self.order as u32
        }
    }

    /// Number of live (key, value) pairs.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Relaxed)
    }

    /// True when no pair is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The comparator bundle.
    #[must_use]
    pub fn key_ops(&self) -> &O {
        &self.ops
    }
}

// ============================================================================
//  Mutations
// ============================================================================

impl<K, V, O> CrabTree<K, V, O>
where
    K: Clone,
    O: KeyOps<K, V>,
{
    /// Store `value` under `key`.
    ///
    /// Duplicate (key, value) pairs are permitted: inserting the same
    /// pair three times yields a three-element multiset. This is the
    /// path a secondary index without uniqueness constraints uses.
    pub fn insert(&self, key: K, value: V) -> InsertOutcome {
        self.insert_impl(key, value, true)
    }

    /// Store `value` under `key` unless the exact pair is already
    /// present, in which case nothing changes and [`InsertOutcome::NoOp`]
    /// is returned.
    pub fn insert_distinct(&self, key: K, value: V) -> InsertOutcome {
        self.insert_impl(key, value, false)
    }

    fn insert_impl(&self, key: K, value: V, allow_duplicate_values: bool) -> InsertOutcome {
        let mut path = self.descend_for_write(&key, WriteIntent::Insert);
        let leaf = path.leaf_mut();

        match leaf
            .as_leaf_mut()
            .insert_at_leaf(key, value, allow_duplicate_values, &self.ops)
        {
            LeafInsert::NoOp => InsertOutcome::NoOp,
            LeafInsert::Inserted { new_entry } => {
                self.len.fetch_add(1, Ordering::Relaxed);
                events::leaf_inserted(path.ticket, new_entry);
                if new_entry && path.leaf_mut().len() > self.order {
                    self.split_up(path);
                }
                InsertOutcome::Inserted
            }
        }
    }

    /// Store `value` under `key` subject to a uniqueness check.
    ///
    /// Under the leaf's write lock, `predicate` runs over every value
    /// already associated with `key`; any match aborts with
    /// [`UniqueInsertOutcome::PredicateConflict`]. An exact value match
    /// aborts with [`UniqueInsertOutcome::DuplicateValue`]. Embedders use
    /// the predicate for visibility/conflict checks against their
    /// transaction state.
    pub fn insert_unique<P>(&self, key: K, value: V, predicate: P) -> UniqueInsertOutcome
    where
        P: Fn(&V) -> bool,
    {
        let mut path = self.descend_for_write(&key, WriteIntent::Insert);
        let leaf = path.leaf_mut();

        if let Some(entry) = leaf.as_leaf().find_entry(&key, &self.ops) {
            if entry.values().iter().any(|v| predicate(v)) {
                return UniqueInsertOutcome::PredicateConflict;
            }
            if entry.contains_value(&value, &self.ops) {
                return UniqueInsertOutcome::DuplicateValue;
            }
        }

        let signal = leaf
            .as_leaf_mut()
            .insert_at_leaf(key, value, true, &self.ops);
        debug_assert!(matches!(signal, LeafInsert::Inserted { .. }));

        self.len.fetch_add(1, Ordering::Relaxed);
        if path.leaf_mut().len() > self.order {
            self.split_up(path);
        }
        UniqueInsertOutcome::Inserted
    }

    /// Remove one occurrence of the (key, value) pair.
    pub fn delete(&self, key: &K, value: &V) -> DeleteOutcome {
        let mut path = self.descend_for_write(key, WriteIntent::Delete);
        let leaf = path.leaf_mut();

        match leaf.as_leaf_mut().remove_from_leaf(key, value, &self.ops) {
            LeafRemove::NotFound => DeleteOutcome::NotFound,
            LeafRemove::Removed { entry_removed } => {
                self.len.fetch_sub(1, Ordering::Relaxed);
                events::leaf_removed(path.ticket, entry_removed);
                if entry_removed {
                    let leaf = path.leaf_mut();
                    if leaf.len() < leaf.min_len(self.order) {
                        // Non-root leaves rebalance; an emptied root leaf
                        // simply stays (no tree is torn down).
                        self.merge_up(path, key);
                    }
                }
                DeleteOutcome::Removed
            }
        }
    }
}

// ============================================================================
//  Lookup and accounting
// ============================================================================

impl<K, V, O> CrabTree<K, V, O>
where
    O: KeyOps<K, V>,
{
    /// Snapshot of the value multiset stored under `key`; empty when the
    /// key is absent. Order within the multiset is unspecified.
    #[must_use]
    pub fn get_value(&self, key: &K) -> Vec<V>
    where
        V: Clone,
    {
        let guard = self.descend_to_leaf_read(key);
        guard
            .as_leaf()
            .find_entry(key, &self.ops)
            .map(ValueList::all_values)
            .unwrap_or_default()
    }

    /// Approximate heap footprint in bytes: per-node fixed overhead plus
    /// per-entry overhead plus multiset element sizes.
    ///
    /// Computed from live lengths, so an insert followed by the matching
    /// delete restores the previous figure. Concurrent writers may shift
    /// the result; it is an estimator, not an audit.
    #[must_use]
    pub fn heap_usage(&self) -> u64 {
        // Holding the anchor shared keeps the root pointer pinned for the
        // duration of the walk; writers already past the anchor drain as
        // the walk reaches their locked nodes.
        let anchor = TicketRwLock::read(&self.anchor);
        let root = NodeRef::clone(&anchor.root);
        let usage = Self::node_heap_bytes(&root);
        drop(anchor);
        usage
    }

    fn node_heap_bytes(node: &NodeRef<K, V>) -> u64 {
        let guard = TicketRwLock::read(node);
        let own = guard.heap_bytes();
        let children: Vec<NodeRef<K, V>> = match guard.body() {
            NodeBody::Leaf(_) => Vec::new(),
            NodeBody::Internal(internal) => internal.children().to_vec(),
        };
        drop(guard);

        own + children.iter().map(Self::node_heap_bytes).sum::<u64>()
    }
}

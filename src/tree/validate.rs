//! Tree-level diagnostics and validation.
//!
//! These walkers are for tests, debugging and embedder sanity checks:
//!
//! - [`CrabTree::assert_invariants`] panics unless every structural
//!   invariant holds (uniform leaf depth, occupancy bounds, separator
//!   contracts, in-leaf ordering, sibling chain, parent links, live pair
//!   count).
//! - [`CrabTree::stats`] and [`CrabTree::depth`] summarize the shape.
//! - [`CrabTree::level_keys`] dumps the keys level by level for
//!   asserting exact shapes in regression tests.
//!
//! # Quiescence
//!
//! The walkers take read locks top-down and are deadlock-free against
//! concurrent operations, but a tree mutated mid-walk can yield a mix of
//! pre- and post-restructure observations. Use them when the tree is
//! quiescent, typically after worker threads have joined.

use std::sync::{Arc, Weak};

use crate::keyops::KeyOps;
use crate::node::{Node, NodeBody, NodeRef};
use crate::ticketlock::{TicketReadGuard, TicketRwLock};

use super::CrabTree;

/// Shape summary collected by [`CrabTree::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    /// Number of levels, counting the root level as 1.
    pub depth: usize,
    /// Number of leaves.
    pub leaf_count: usize,
    /// Number of distinct keys.
    pub entry_count: usize,
    /// Number of stored (key, value) pairs.
    pub value_count: usize,
}

/// Sibling links captured while a leaf's lock was held.
struct LeafLinks<K, V> {
    node: NodeRef<K, V>,
    left: Option<NodeRef<K, V>>,
    right: Option<NodeRef<K, V>>,
}

impl<K, V, O: KeyOps<K, V>> CrabTree<K, V, O> {
    /// Number of levels (1 for a tree that is a single root leaf).
    #[must_use]
    pub fn depth(&self) -> usize {
        let anchor = TicketRwLock::read(&self.anchor);
        let root = NodeRef::clone(&anchor.root);
        let mut guard = TicketRwLock::read(&root);
        drop(anchor);

        let mut depth = 1;
        loop {
            let child = match guard.body() {
                NodeBody::Leaf(_) => return depth,
                NodeBody::Internal(internal) => internal.child(0),
            };
            depth += 1;
            guard = TicketRwLock::read(&child);
        }
    }

    /// Walk the whole tree and summarize its shape.
    #[must_use]
    pub fn stats(&self) -> TreeStats {
        let anchor = TicketRwLock::read(&self.anchor);
        let root = NodeRef::clone(&anchor.root);

        let mut stats = TreeStats {
            depth: 0,
            leaf_count: 0,
            entry_count: 0,
            value_count: 0,
        };
        Self::collect_stats(&root, 1, &mut stats);
        drop(anchor);
        stats
    }

    fn collect_stats(node: &NodeRef<K, V>, depth: usize, stats: &mut TreeStats) {
        let guard = TicketRwLock::read(node);
        stats.depth = stats.depth.max(depth);
        match guard.body() {
            NodeBody::Leaf(leaf) => {
                stats.leaf_count += 1;
                stats.entry_count += leaf.entry_count();
                stats.value_count += leaf.entries().iter().map(|e| e.len()).sum::<usize>();
            }
            NodeBody::Internal(internal) => {
                for child in internal.children() {
                    Self::collect_stats(child, depth + 1, stats);
                }
            }
        }
    }

    /// Keys level by level: `level_keys()[level][node]` is the key list
    /// (separators, or leaf entry keys) of one node, left to right.
    #[must_use]
    pub fn level_keys(&self) -> Vec<Vec<Vec<K>>>
    where
        K: Clone,
    {
        let anchor = TicketRwLock::read(&self.anchor);
        let mut levels: Vec<Vec<Vec<K>>> = Vec::new();
        let mut frontier = vec![NodeRef::clone(&anchor.root)];

        while !frontier.is_empty() {
            let mut keys_here = Vec::new();
            let mut next = Vec::new();
            for node in &frontier {
                let guard = TicketRwLock::read(node);
                match guard.body() {
                    NodeBody::Leaf(leaf) => {
                        keys_here.push(leaf.entries().iter().map(|e| e.key().clone()).collect());
                    }
                    NodeBody::Internal(internal) => {
                        keys_here.push(internal.separators().to_vec());
                        next.extend(internal.children().iter().map(NodeRef::clone));
                    }
                }
            }
            levels.push(keys_here);
            frontier = next;
        }

        drop(anchor);
        levels
    }

    /// Validate every structural invariant, panicking on the first
    /// violation.
    ///
    /// # Panics
    /// Panics with a description of the violated invariant.
    pub fn assert_invariants(&self) {
        let anchor = TicketRwLock::read(&self.anchor);
        let root = NodeRef::clone(&anchor.root);

        {
            let guard = TicketRwLock::read(&root);
            assert!(
                guard.parent().is_none(),
                "root must not have a parent link"
            );
            if let NodeBody::Internal(internal) = guard.body() {
                assert!(
                    internal.separator_count() >= 1,
                    "an internal root needs at least one separator"
                );
            }
        }

        let mut leaves: Vec<LeafLinks<K, V>> = Vec::new();
        let mut leaf_depth: Option<usize> = None;
        self.check_node(&root, None, None, None, 1, &mut leaves, &mut leaf_depth);

        self.check_leaf_chain(&leaves);

        let value_count: usize = {
            let mut total = 0;
            for link in &leaves {
                let guard = TicketRwLock::read(&link.node);
                total += guard
                    .as_leaf()
                    .entries()
                    .iter()
                    .map(|e| e.len())
                    .sum::<usize>();
            }
            total
        };
        assert_eq!(
            value_count as u64,
            self.len(),
            "live pair counter disagrees with stored values"
        );

        drop(anchor);
    }

    #[expect(clippy::too_many_arguments, reason = "recursive walker threading its context")]
    fn check_node(
        &self,
        node: &NodeRef<K, V>,
        expected_parent: Option<&NodeRef<K, V>>,
        lower: Option<&K>,
        upper: Option<&K>,
        depth: usize,
        leaves: &mut Vec<LeafLinks<K, V>>,
        leaf_depth: &mut Option<usize>,
    ) {
        let guard = TicketRwLock::read(node);

        match expected_parent {
            Some(parent) => {
                assert!(
                    Weak::ptr_eq(guard.parent_weak(), &Arc::downgrade(parent)),
                    "parent link does not point at the owning node"
                );
                let min = guard.min_len(self.order);
                assert!(
                    guard.len() >= min,
                    "non-root node below minimum occupancy: {} < {min}",
                    guard.len(),
                );
            }
            None => {
                assert!(guard.parent().is_none(), "root carries a parent link");
            }
        }
        assert!(
            guard.len() <= self.order,
            "node above maximum occupancy: {} > {}",
            guard.len(),
            self.order
        );

        match guard.body() {
            NodeBody::Leaf(leaf) => {
                self.check_leaf_entries(&guard, lower, upper);

                match *leaf_depth {
                    None => *leaf_depth = Some(depth),
                    Some(expected) => {
                        assert_eq!(depth, expected, "leaves at different depths");
                    }
                }
                leaves.push(LeafLinks {
                    node: NodeRef::clone(node),
                    left: leaf.left_sibling().and_then(Weak::upgrade),
                    right: leaf.right_sibling().and_then(Weak::upgrade),
                });
            }
            NodeBody::Internal(internal) => {
                let separators = internal.separators();
                assert_eq!(
                    internal.children().len(),
                    separators.len() + 1,
                    "child count must be separator count plus one"
                );
                #[expect(clippy::indexing_slicing, reason = "windows(2) yields pairs")]
                for window in separators.windows(2) {
                    assert!(
                        self.ops.key_less(&window[0], &window[1]),
                        "separators not strictly ascending"
                    );
                }

                for (i, child) in internal.children().iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { separators.get(i - 1) };
                    let child_upper = separators.get(i).or(upper);
                    self.check_node(
                        child,
                        Some(node),
                        child_lower,
                        child_upper,
                        depth + 1,
                        leaves,
                        leaf_depth,
                    );
                }
            }
        }
    }

    fn check_leaf_entries(
        &self,
        guard: &TicketReadGuard<Node<K, V>>,
        lower: Option<&K>,
        upper: Option<&K>,
    ) {
        let entries = guard.as_leaf().entries();
        for entry in entries {
            assert!(!entry.is_empty(), "leaf entry with an empty multiset");
            if let Some(lower) = lower {
                assert!(
                    !self.ops.key_less(entry.key(), lower),
                    "leaf key below its subtree's lower bound"
                );
            }
            if let Some(upper) = upper {
                assert!(
                    self.ops.key_less(entry.key(), upper),
                    "leaf key at or above its subtree's upper bound"
                );
            }
        }
        #[expect(clippy::indexing_slicing, reason = "windows(2) yields pairs")]
        for window in entries.windows(2) {
            assert!(
                self.ops.key_less(window[0].key(), window[1].key()),
                "leaf keys not strictly ascending"
            );
        }
    }

    #[expect(
        clippy::panic,
        clippy::indexing_slicing,
        reason = "the validator reports violations by panicking; windows(2) yields pairs"
    )]
    fn check_leaf_chain(&self, leaves: &[LeafLinks<K, V>]) {
        if let Some(first) = leaves.first() {
            assert!(first.left.is_none(), "leftmost leaf has a left sibling");
        }
        if let Some(last) = leaves.last() {
            assert!(last.right.is_none(), "rightmost leaf has a right sibling");
        }
        for pair in leaves.windows(2) {
            let right_of_left = pair[0]
                .right
                .as_ref()
                .unwrap_or_else(|| panic!("leaf chain broken: missing right link"));
            assert!(
                NodeRef::ptr_eq(right_of_left, &pair[1].node),
                "leaf chain right link skips a leaf"
            );
            let left_of_right = pair[1]
                .left
                .as_ref()
                .unwrap_or_else(|| panic!("leaf chain broken: missing left link"));
            assert!(
                NodeRef::ptr_eq(left_of_right, &pair[0].node),
                "leaf chain left link skips a leaf"
            );
        }
    }
}

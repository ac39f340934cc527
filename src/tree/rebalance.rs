//! Underflow-driven rebalancing.
//!
//! When a deletion empties a leaf entry and pushes the leaf below its
//! minimum occupancy, rebalancing climbs the write path retained by
//! crabbing. At each level the underfull child first tries to borrow one
//! element, then merges:
//!
//! - Case A: borrow from the right sibling (if it can spare one),
//! - Case B: borrow from the left sibling,
//! - Case C: merge with the right sibling,
//! - Case D: merge into the left sibling.
//!
//! A merge removes one separator from the parent, which may underflow in
//! turn. A root left with zero separators hands its single child the
//! root role and the tree shrinks by exactly one level.
//!
//! Siblings are located and locked under the parent's write lock. Leaf
//! locks are only ever blocked on left-to-right, so left-sibling cases at
//! the leaf level release the child and re-acquire after the left
//! sibling; the parent's write lock excludes every other writer from
//! both nodes across the gap.
//!
//! Before rebalancing bubbles past a level, separators equal to the
//! deleted key in the touched nodes are rewritten to the smallest key of
//! the subtree to their right.

use std::sync::Arc;

use crate::events::{self, Sibling};
use crate::keyops::KeyOps;
use crate::node::{Node, NodeBody, NodeRef};
use crate::ticketlock::{TicketRwLock, TicketWriteGuard};

use super::CrabTree;
use super::descent::WritePath;

type Guard<K, V> = TicketWriteGuard<Node<K, V>>;

impl<K, V, O> CrabTree<K, V, O>
where
    K: Clone,
    O: KeyOps<K, V>,
{
    /// Rebalance upward from the underfull leaf at the bottom of `path`.
    pub(crate) fn merge_up(&self, mut path: WritePath<K, V>, deleted_key: &K) {
        #[expect(clippy::expect_used, reason = "merge_up runs on a non-empty write path")]
        let mut child_guard = path.path.pop().expect("rebalance with no held leaf");

        loop {
            if path.path.is_empty() {
                // The shallowest held node. With the anchor in hand this
                // is the root; an internal root drained to zero
                // separators hands the root role to its only child.
                if let Some(mut anchor) = path.anchor.take()
                    && !child_guard.is_leaf()
                    && child_guard.len() == 0
                {
                    let new_root = child_guard.as_internal_mut().into_only_child();
                    TicketRwLock::write(&new_root).clear_parent();
                    anchor.root = new_root;
                    events::root_collapsed(path.ticket);
                }
                return;
            }

            if child_guard.len() >= child_guard.min_len(self.order) {
                return;
            }

            #[expect(clippy::expect_used, reason = "emptiness was checked above")]
            let mut parent_guard = path.path.pop().expect("rebalance lost its parent");
            self.rebalance_child(&mut parent_guard, child_guard, deleted_key);
            child_guard = parent_guard;
        }
    }

    /// Fix one underfull child within its (write-held) parent.
    fn rebalance_child(&self, parent: &mut Guard<K, V>, mut child: Guard<K, V>, deleted_key: &K) {
        let child_ref = NodeRef::clone(child.rwlock());
        let at = parent.as_internal().child_index_of(&child_ref);
        let separator_count = parent.as_internal().separator_count();
        debug_assert!(separator_count > 0, "rebalancing under a childless parent");

        let min = child.min_len(self.order);
        let has_right = at < separator_count;
        let has_left = at > 0;

        // Case A: borrow from the right sibling.
        if has_right {
            let right_ref = parent.as_internal().child(at + 1);
            let mut right = TicketRwLock::write(&right_ref);
            if right.len() > min {
                Self::borrow_from_right(parent, at, &mut child, &child_ref, &mut right);
                drop(right);
                self.finish_level(parent, child, deleted_key);
                return;
            }
            // The right sibling cannot spare an element; try the left
            // side before settling on a merge. Its lock is released so
            // the leaf-level re-lock below stays left-to-right.
            drop(right);
        }

        if has_left {
            let left_ref = parent.as_internal().child(at - 1);
            let (mut left, mut child) = if child.is_leaf() {
                drop(child);
                let left = TicketRwLock::write(&left_ref);
                let child = TicketRwLock::write(&child_ref);
                (left, child)
            } else {
                (TicketRwLock::write(&left_ref), child)
            };

            // Case B: borrow from the left sibling.
            if left.len() > min {
                Self::borrow_from_left(parent, at, &mut left, &mut child, &child_ref);
                drop(left);
                self.finish_level(parent, child, deleted_key);
                return;
            }

            if has_right {
                // Case C: merge with the right sibling.
                drop(left);
                let right_ref = parent.as_internal().child(at + 1);
                let right = TicketRwLock::write(&right_ref);
                Self::merge_right_sibling(parent, at, &mut child, &child_ref, right);
                self.finish_level(parent, child, deleted_key);
            } else {
                // Case D: merge into the left sibling; the child is freed.
                Self::merge_into_left(parent, at, &mut left, &left_ref, child);
                self.finish_level(parent, left, deleted_key);
            }
            return;
        }

        // Leftmost child: merge with the right sibling, which exists
        // because the parent holds at least one separator.
        let right_ref = parent.as_internal().child(at + 1);
        let right = TicketRwLock::write(&right_ref);
        Self::merge_right_sibling(parent, at, &mut child, &child_ref, right);
        self.finish_level(parent, child, deleted_key);
    }

    /// Post-case bookkeeping for one level: separator repair on the
    /// surviving child, then on the parent.
    fn finish_level(&self, parent: &mut Guard<K, V>, mut survivor: Guard<K, V>, deleted_key: &K) {
        if !survivor.is_leaf() {
            self.repair_separators(&mut survivor, deleted_key);
        }
        drop(survivor);
        self.repair_separators(parent, deleted_key);
    }

    // ========================================================================
    //  Borrow cases
    // ========================================================================

    fn borrow_from_right(
        parent: &mut Guard<K, V>,
        at: usize,
        child: &mut Guard<K, V>,
        child_ref: &NodeRef<K, V>,
        right: &mut Guard<K, V>,
    ) {
        if child.is_leaf() {
            let moved = right.as_leaf_mut().take_first_entry();
            child.as_leaf_mut().push_back_entry(moved);

            #[expect(clippy::expect_used, reason = "a donor keeps at least its minimum")]
            let new_separator = right
                .as_leaf()
                .first_key()
                .cloned()
                .expect("donor leaf left empty");
            parent.as_internal_mut().set_separator(at, new_separator);
            events::borrowed(Sibling::Right, true);
        } else {
            let pulled = parent.as_internal().separator(at).clone();
            child.as_internal_mut().push_back_separator(pulled);

            let grandchild = right.as_internal_mut().take_first_child();
            TicketRwLock::write(&grandchild).set_parent(child_ref);
            child.as_internal_mut().push_back_child(grandchild);

            let promoted = right.as_internal_mut().take_first_separator();
            parent.as_internal_mut().set_separator(at, promoted);
            events::borrowed(Sibling::Right, false);
        }
    }

    fn borrow_from_left(
        parent: &mut Guard<K, V>,
        at: usize,
        left: &mut Guard<K, V>,
        child: &mut Guard<K, V>,
        child_ref: &NodeRef<K, V>,
    ) {
        let separator_at = at - 1;
        if child.is_leaf() {
            let moved = left.as_leaf_mut().take_last_entry();
            child.as_leaf_mut().push_front_entry(moved);

            #[expect(clippy::expect_used, reason = "the child just received an entry")]
            let new_separator = child
                .as_leaf()
                .first_key()
                .cloned()
                .expect("borrowing leaf is empty");
            parent
                .as_internal_mut()
                .set_separator(separator_at, new_separator);
            events::borrowed(Sibling::Left, true);
        } else {
            let pulled = parent.as_internal().separator(separator_at).clone();
            child.as_internal_mut().push_front_separator(pulled);

            let grandchild = left.as_internal_mut().take_last_child();
            TicketRwLock::write(&grandchild).set_parent(child_ref);
            child.as_internal_mut().push_front_child(grandchild);

            let promoted = left.as_internal_mut().take_last_separator();
            parent
                .as_internal_mut()
                .set_separator(separator_at, promoted);
            events::borrowed(Sibling::Left, false);
        }
    }

    // ========================================================================
    //  Merge cases
    // ========================================================================

    /// The child absorbs its right sibling; the sibling is freed.
    fn merge_right_sibling(
        parent: &mut Guard<K, V>,
        at: usize,
        child: &mut Guard<K, V>,
        child_ref: &NodeRef<K, V>,
        mut right: Guard<K, V>,
    ) {
        // Leaf merges discard the separator (leaf keys carry the ordering
        // themselves); internal merges pull it down.
        let (separator, victim) = parent.as_internal_mut().remove_separator_and_right_child(at);
        debug_assert!(NodeRef::ptr_eq(&victim, right.rwlock()));

        if child.is_leaf() {
            let entries = right.as_leaf_mut().drain_entries();
            child.as_leaf_mut().append_entries(entries);

            let next = right.as_leaf().right_sibling().cloned();
            child.as_leaf_mut().set_right_sibling(next.clone());
            if let Some(neighbor) = next.and_then(|weak| weak.upgrade()) {
                TicketRwLock::write(&neighbor)
                    .as_leaf_mut()
                    .set_left_sibling(Some(Arc::downgrade(child_ref)));
            }
            events::merged(Sibling::Right, true);
        } else {
            child.as_internal_mut().push_back_separator(separator);

            let (separators, children) = right.as_internal_mut().drain();
            for grandchild in &children {
                TicketRwLock::write(grandchild).set_parent(child_ref);
            }
            child.as_internal_mut().append_separators(separators);
            child.as_internal_mut().append_children(children);
            events::merged(Sibling::Right, false);
        }

        drop(right);
        drop(victim);
    }

    /// The left sibling absorbs the child; the child is freed.
    fn merge_into_left(
        parent: &mut Guard<K, V>,
        at: usize,
        left: &mut Guard<K, V>,
        left_ref: &NodeRef<K, V>,
        mut child: Guard<K, V>,
    ) {
        let (separator, victim) = parent
            .as_internal_mut()
            .remove_separator_and_right_child(at - 1);
        debug_assert!(NodeRef::ptr_eq(&victim, child.rwlock()));

        if child.is_leaf() {
            let entries = child.as_leaf_mut().drain_entries();
            left.as_leaf_mut().append_entries(entries);

            let next = child.as_leaf().right_sibling().cloned();
            left.as_leaf_mut().set_right_sibling(next.clone());
            if let Some(neighbor) = next.and_then(|weak| weak.upgrade()) {
                TicketRwLock::write(&neighbor)
                    .as_leaf_mut()
                    .set_left_sibling(Some(Arc::downgrade(left_ref)));
            }
            events::merged(Sibling::Left, true);
        } else {
            left.as_internal_mut().push_back_separator(separator);

            let (separators, children) = child.as_internal_mut().drain();
            for grandchild in &children {
                TicketRwLock::write(grandchild).set_parent(left_ref);
            }
            left.as_internal_mut().append_separators(separators);
            left.as_internal_mut().append_children(children);
            events::merged(Sibling::Left, false);
        }

        drop(child);
        drop(victim);
    }

    // ========================================================================
    //  Separator repair
    // ========================================================================

    /// Rewrite separators equal to the deleted key to the smallest key of
    /// the subtree to their right.
    ///
    /// Merges and borrows pull separators between levels, so the rule is
    /// applied to both the parent and the surviving child at each level
    /// the rebalance reaches.
    fn repair_separators(&self, node: &mut Guard<K, V>, deleted_key: &K) {
        let count = node.as_internal().separator_count();
        for at in 0..count {
            let stale = {
                let Some(separator) = node.as_internal().separators().get(at) else {
                    break;
                };
                self.ops.key_eq(separator, deleted_key)
            };
            if !stale {
                continue;
            }

            let subtree = node.as_internal().child(at + 1);
            if let Some(replacement) = self.smallest_key_in(&subtree) {
                node.as_internal_mut().set_separator(at, replacement);
                events::separator_repaired();
            }
        }
    }

    /// Smallest key stored in `subtree`, by leftmost read descent.
    fn smallest_key_in(&self, subtree: &NodeRef<K, V>) -> Option<K> {
        let mut guard = TicketRwLock::read(subtree);
        loop {
            let child = match guard.body() {
                NodeBody::Leaf(leaf) => return leaf.first_key().cloned(),
                NodeBody::Internal(internal) => internal.child(0),
            };
            guard = TicketRwLock::read(&child);
        }
    }
}

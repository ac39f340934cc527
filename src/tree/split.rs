//! Split propagation.
//!
//! An overfull node (len == order + 1 after an insertion) splits at
//! `floor(s/2)`: the lower half stays, the upper half moves to a fresh
//! right sibling, and a separator is promoted into the parent. Promotion
//! recurses while parents overflow; promoting out of the root grows the
//! tree by exactly one level.
//!
//! All restructured nodes sit on the write path retained by crabbing;
//! the only locks acquired here are on freshly allocated nodes, on moved
//! children (to re-parent them), and on the old right leaf sibling (to
//! repair the chain), each of which is below or to the right of a held
//! node, keeping acquisition order consistent with descent and scans.

use std::sync::Arc;

use crate::events;
use crate::internode::InternalNode;
use crate::keyops::KeyOps;
use crate::leaf::LeafNode;
use crate::node::{Node, NodeRef};
use crate::ticketlock::{TicketRwLock, TicketWriteGuard};

use super::CrabTree;
use super::descent::WritePath;

impl<K, V, O> CrabTree<K, V, O>
where
    K: Clone,
    O: KeyOps<K, V>,
{
    /// Split the overfull leaf at the bottom of `path` and propagate
    /// promotions upward along the held path.
    pub(crate) fn split_up(&self, mut path: WritePath<K, V>) {
        #[expect(clippy::expect_used, reason = "split_up runs on a non-empty write path")]
        let mut child_guard = path.path.pop().expect("split with no held leaf");

        loop {
            debug_assert!(child_guard.len() > self.order, "splitting a fit node");

            let child_ref = NodeRef::clone(child_guard.rwlock());
            let (separator, right_ref) = Self::split_node(&mut child_guard, &child_ref);

            match path.path.pop() {
                Some(mut parent_guard) => {
                    let parent_ref = NodeRef::clone(parent_guard.rwlock());
                    let at = parent_guard.as_internal().child_index_of(&child_ref);
                    parent_guard.as_internal_mut().splice_separator(
                        at,
                        separator,
                        NodeRef::clone(&right_ref),
                    );

                    child_guard.set_parent(&parent_ref);
                    drop(child_guard);
                    TicketRwLock::write(&right_ref).set_parent(&parent_ref);

                    if parent_guard.len() <= self.order {
                        return;
                    }
                    child_guard = parent_guard;
                }
                None => {
                    // The root itself split; the anchor is still held and
                    // records the new root.
                    #[expect(
                        clippy::expect_used,
                        reason = "crabbing retains the anchor whenever the root is unsafe"
                    )]
                    let mut anchor = path.anchor.take().expect("root split without the anchor");

                    let new_root = Node::internal_ref(InternalNode::new_root(
                        separator,
                        NodeRef::clone(&child_ref),
                        NodeRef::clone(&right_ref),
                    ));
                    child_guard.set_parent(&new_root);
                    drop(child_guard);
                    TicketRwLock::write(&right_ref).set_parent(&new_root);

                    anchor.root = new_root;
                    events::root_split(path.ticket);
                    return;
                }
            }
        }
    }

    /// Split one overfull node, returning the separator to promote and
    /// the new right sibling (fully wired except for its parent link).
    fn split_node(
        guard: &mut TicketWriteGuard<Node<K, V>>,
        node_ref: &NodeRef<K, V>,
    ) -> (K, NodeRef<K, V>) {
        if guard.is_leaf() {
            let leaf = guard.as_leaf_mut();
            let (separator, upper) = leaf.split_off_upper_half();

            let mut right = LeafNode::from_entries(upper);
            let old_right = leaf.right_sibling().cloned();
            right.set_left_sibling(Some(Arc::downgrade(node_ref)));
            right.set_right_sibling(old_right.clone());

            let right_ref = Node::leaf_ref(right);
            leaf.set_right_sibling(Some(Arc::downgrade(&right_ref)));

            // The old right neighbor's back link now points at the
            // fresh leaf.
            if let Some(neighbor) = old_right.and_then(|weak| weak.upgrade()) {
                TicketRwLock::write(&neighbor)
                    .as_leaf_mut()
                    .set_left_sibling(Some(Arc::downgrade(&right_ref)));
            }

            events::leaf_split(guard.len());
            (separator, right_ref)
        } else {
            let internal = guard.as_internal_mut();
            let (promoted, upper_separators, upper_children) = internal.split_off_upper_half();

            let right_ref = Node::internal_ref(InternalNode::from_halves(
                upper_separators,
                upper_children,
            ));

            // Moved children hang off the new sibling now. They are
            // unreachable to other writers (this node is locked), so
            // the per-child locks are uncontended except for draining
            // readers.
            let moved: Vec<NodeRef<K, V>> = TicketRwLock::read(&right_ref)
                .as_internal()
                .children()
                .to_vec();
            for child in &moved {
                TicketRwLock::write(child).set_parent(&right_ref);
            }

            events::internal_split(guard.len(), moved.len());
            (promoted, right_ref)
        }
    }
}

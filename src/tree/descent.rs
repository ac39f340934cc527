//! Descent and lock crabbing.
//!
//! Write descent holds a contiguous path of write guards: the current
//! node plus every ancestor that might still be restructured. After
//! acquiring a child's lock the structural-safety predicate runs; a safe
//! child lets the whole held prefix (including the root anchor) go.
//!
//! Read descent is hand-over-hand: never more than one node held, the
//! child's lock acquired before the ancestor's is released.

use crate::events;
use crate::keyops::KeyOps;
use crate::node::{Node, NodeBody, NodeRef};
use crate::ticketlock::{TicketReadGuard, TicketRwLock, TicketWriteGuard};

use super::{CrabTree, RootAnchor};

/// Which structural-safety predicate the descent tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteIntent {
    /// Safe when an insertion cannot overflow: `len < order`.
    Insert,

    /// Safe when a deletion cannot underflow: `len > min`.
    Delete,
}

/// The locks a write operation still holds after descending.
///
/// `path` runs from the shallowest retained ancestor down to the leaf.
/// `anchor` is present exactly when the root itself may split or
/// collapse, since only the anchor may swap the root pointer.
pub(crate) struct WritePath<K, V> {
    pub(crate) anchor: Option<TicketWriteGuard<RootAnchor<K, V>>>,
    pub(crate) path: Vec<TicketWriteGuard<Node<K, V>>>,

    /// Tree-level writer turn; fixes the serialization order of this
    /// operation among contending writers.
    pub(crate) ticket: u64,
}

impl<K, V> WritePath<K, V> {
    /// The leaf guard at the bottom of the held path.
    #[expect(clippy::expect_used, reason = "descent always terminates at a locked leaf")]
    pub(crate) fn leaf_mut(&mut self) -> &mut TicketWriteGuard<Node<K, V>> {
        self.path.last_mut().expect("write path holds no leaf")
    }
}

impl<K, V, O: KeyOps<K, V>> CrabTree<K, V, O> {
    /// Descend from the root for a mutation, crabbing locks.
    pub(crate) fn descend_for_write(&self, key: &K, intent: WriteIntent) -> WritePath<K, V> {
        let anchor = TicketRwLock::write(&self.anchor);
        let ticket = self.turn.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        events::writer_turn_drawn(ticket, intent == WriteIntent::Delete);

        let root = NodeRef::clone(&anchor.root);
        let root_guard = TicketRwLock::write(&root);

        let mut anchor = Some(anchor);
        if Self::root_is_safe(&root_guard, intent, self.order) {
            anchor = None;
        }
        let mut path = vec![root_guard];

        loop {
            let child = {
                #[expect(clippy::expect_used, reason = "the held path is never empty")]
                let current = path.last().expect("descent lost its path");
                match current.body() {
                    NodeBody::Leaf(_) => break,
                    NodeBody::Internal(internal) => {
                        internal.child(internal.find_child(key, &self.ops))
                    }
                }
            };

            let child_guard = TicketRwLock::write(&child);
            let safe = match intent {
                WriteIntent::Insert => child_guard.safe_for_insert(self.order),
                WriteIntent::Delete => child_guard.safe_for_delete(self.order),
            };
            if safe {
                // The child absorbs any restructure; everything above is
                // released.
                path.clear();
                anchor = None;
            }
            path.push(child_guard);
        }

        WritePath {
            anchor,
            path,
            ticket,
        }
    }

    /// Root-level safety.
    ///
    /// The root has no occupancy bounds, but a restructure that would
    /// swap the root pointer (root split; collapse of an internal root
    /// with one separator) must keep the anchor.
    fn root_is_safe(root: &Node<K, V>, intent: WriteIntent, order: usize) -> bool {
        match intent {
            WriteIntent::Insert => root.safe_for_insert(order),
            WriteIntent::Delete => root.is_leaf() || root.len() >= 2,
        }
    }

    /// Descend to the leaf that would contain `key`, shared, holding one
    /// node at a time.
    pub(crate) fn descend_to_leaf_read(&self, key: &K) -> TicketReadGuard<Node<K, V>> {
        // The anchor is the topmost ancestor: hold it until the root's
        // lock is in hand, or a concurrent root split could reroute keys
        // above the node this descent starts from.
        let anchor = TicketRwLock::read(&self.anchor);
        let root = NodeRef::clone(&anchor.root);
        let mut guard = TicketRwLock::read(&root);
        drop(anchor);

        loop {
            let child = match guard.body() {
                NodeBody::Leaf(_) => return guard,
                NodeBody::Internal(internal) => internal.child(internal.find_child(key, &self.ops)),
            };
            // Acquire the child before the ancestor guard drops.
            guard = TicketRwLock::read(&child);
        }
    }
}

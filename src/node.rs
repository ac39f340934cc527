//! Node identity and shape.
//!
//! Nodes are identified by handle: a [`NodeRef`] is an `Arc` of the
//! node's lock, and the `Arc` pointer is the node's identity. Ownership
//! is strictly parent → child through the child vector (the tree owns the
//! root); parent and sibling links are non-owning [`NodeWeak`] references
//! maintained as structural metadata under lock and never used to
//! deallocate.
//!
//! A node is either a leaf or an internal node; the discriminant is the
//! [`NodeBody`] variant, never a downcast.

use std::sync::{Arc, Weak};

use crate::internode::InternalNode;
use crate::leaf::LeafNode;
use crate::ticketlock::TicketRwLock;

/// Owning handle: the identity of a node.
pub(crate) type NodeRef<K, V> = Arc<TicketRwLock<Node<K, V>>>;

/// Non-owning back reference (parent and sibling links).
pub(crate) type NodeWeak<K, V> = Weak<TicketRwLock<Node<K, V>>>;

// ============================================================================
//  Node
// ============================================================================

/// Shape of a node's payload.
pub(crate) enum NodeBody<K, V> {
    Leaf(LeafNode<K, V>),
    Internal(InternalNode<K, V>),
}

/// A tree node: parent back link plus leaf or internal payload.
pub(crate) struct Node<K, V> {
    /// Parent link; dangling (never upgradable) at the root.
    parent: NodeWeak<K, V>,

    body: NodeBody<K, V>,
}

impl<K, V> Node<K, V> {
    /// Fresh empty leaf wrapped into its handle.
    pub(crate) fn new_leaf_ref() -> NodeRef<K, V> {
        Self::into_ref(NodeBody::Leaf(LeafNode::new()))
    }

    /// Wrap a built leaf into its handle.
    pub(crate) fn leaf_ref(leaf: LeafNode<K, V>) -> NodeRef<K, V> {
        Self::into_ref(NodeBody::Leaf(leaf))
    }

    /// Wrap a built internal node into its handle.
    pub(crate) fn internal_ref(internal: InternalNode<K, V>) -> NodeRef<K, V> {
        Self::into_ref(NodeBody::Internal(internal))
    }

    fn into_ref(body: NodeBody<K, V>) -> NodeRef<K, V> {
        Arc::new(TicketRwLock::new(Self {
            parent: Weak::new(),
            body,
        }))
    }

    // ========================================================================
    //  Shape
    // ========================================================================

    #[inline]
    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.body, NodeBody::Leaf(_))
    }

    #[inline]
    pub(crate) fn body(&self) -> &NodeBody<K, V> {
        &self.body
    }

    /// Separator count (internal) or entry count (leaf).
    pub(crate) fn len(&self) -> usize {
        match &self.body {
            NodeBody::Leaf(leaf) => leaf.entry_count(),
            NodeBody::Internal(internal) => internal.separator_count(),
        }
    }

    #[expect(clippy::panic, reason = "shape is pinned by the caller's descent")]
    pub(crate) fn as_leaf(&self) -> &LeafNode<K, V> {
        match &self.body {
            NodeBody::Leaf(leaf) => leaf,
            NodeBody::Internal(_) => panic!("as_leaf called on an internal node"),
        }
    }

    #[expect(clippy::panic, reason = "shape is pinned by the caller's descent")]
    pub(crate) fn as_leaf_mut(&mut self) -> &mut LeafNode<K, V> {
        match &mut self.body {
            NodeBody::Leaf(leaf) => leaf,
            NodeBody::Internal(_) => panic!("as_leaf_mut called on an internal node"),
        }
    }

    #[expect(clippy::panic, reason = "shape is pinned by the caller's descent")]
    pub(crate) fn as_internal(&self) -> &InternalNode<K, V> {
        match &self.body {
            NodeBody::Internal(internal) => internal,
            NodeBody::Leaf(_) => panic!("as_internal called on a leaf"),
        }
    }

    #[expect(clippy::panic, reason = "shape is pinned by the caller's descent")]
    pub(crate) fn as_internal_mut(&mut self) -> &mut InternalNode<K, V> {
        match &mut self.body {
            NodeBody::Internal(internal) => internal,
            NodeBody::Leaf(_) => panic!("as_internal_mut called on a leaf"),
        }
    }

    // ========================================================================
    //  Parent link
    // ========================================================================

    /// Upgraded parent handle, `None` at the root.
    pub(crate) fn parent(&self) -> Option<NodeRef<K, V>> {
        self.parent.upgrade()
    }

    /// Raw parent link, for identity checks.
    pub(crate) fn parent_weak(&self) -> &NodeWeak<K, V> {
        &self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: &NodeRef<K, V>) {
        self.parent = Arc::downgrade(parent);
    }

    /// Mark this node as the root (no parent).
    pub(crate) fn clear_parent(&mut self) {
        self.parent = Weak::new();
    }

    // ========================================================================
    //  Occupancy bounds
    // ========================================================================

    /// Minimum occupancy for this node shape at the given `order`.
    ///
    /// Leaves: `ceil(order / 2)` entries. Internals: `floor(order / 2)`
    /// separators, the largest bound every `floor(s/2)` split satisfies;
    /// the two coincide for even orders.
    pub(crate) fn min_len(&self, order: usize) -> usize {
        match &self.body {
            NodeBody::Leaf(_) => order.div_ceil(2),
            NodeBody::Internal(_) => order / 2,
        }
    }

    /// Whether an insertion here can overflow the node.
    pub(crate) fn safe_for_insert(&self, order: usize) -> bool {
        self.len() < order
    }

    /// Whether a deletion here can underflow the node.
    ///
    /// Non-root nodes must keep `len > min`. The root has no lower bound;
    /// the tree-level descent separately pins the root anchor when a
    /// collapse (internal root with one separator) is possible.
    pub(crate) fn safe_for_delete(&self, order: usize) -> bool {
        self.len() > self.min_len(order)
    }

    /// Estimated heap footprint: fixed node overhead plus payload.
    pub(crate) fn heap_bytes(&self) -> u64 {
        let fixed = size_of::<TicketRwLock<Self>>() as u64;
        let payload = match &self.body {
            NodeBody::Leaf(leaf) => leaf.entries_heap_bytes(),
            NodeBody::Internal(internal) => internal.routing_heap_bytes(),
        };
        fixed + payload
    }
}

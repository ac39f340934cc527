//! Structural-event logging.
//!
//! Restructuring is where this tree is hardest to follow, so every
//! structural transition has a named emitter here: writer turns, leaf
//! mutations, splits, sibling borrows, merges, root growth and collapse,
//! separator repair. Writer-driven events carry the tree-level ticket,
//! so a log filtered to this crate replays the structural history in
//! serialization order.
//!
//! Everything is gated on the `tracing` feature. Without it each emitter
//! is an empty inline function the optimizer erases, so the hot path
//! pays nothing.
//!
//! ```bash
//! # Normal build - no tracing overhead
//! cargo build --release
//!
//! # Watch structural transitions while running a test
//! RUST_LOG=crabtree=debug cargo test --features tracing scenario
//! ```

/// Which sibling a rebalance step leaned on.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Sibling {
    Left,
    Right,
}

/// A writer drew its turn at the root anchor.
#[inline]
pub(crate) fn writer_turn_drawn(ticket: u64, delete: bool) {
    #[cfg(feature = "tracing")]
    tracing::trace!(ticket, delete, "writer turn drawn");
    #[cfg(not(feature = "tracing"))]
    let _ = (ticket, delete);
}

/// A value landed in a leaf; `new_entry` when a distinct key was added.
#[inline]
pub(crate) fn leaf_inserted(ticket: u64, new_entry: bool) {
    #[cfg(feature = "tracing")]
    tracing::trace!(ticket, new_entry, "leaf insert");
    #[cfg(not(feature = "tracing"))]
    let _ = (ticket, new_entry);
}

/// A value left a leaf; `entry_removed` when its entry was spliced out.
#[inline]
pub(crate) fn leaf_removed(ticket: u64, entry_removed: bool) {
    #[cfg(feature = "tracing")]
    tracing::trace!(ticket, entry_removed, "leaf remove");
    #[cfg(not(feature = "tracing"))]
    let _ = (ticket, entry_removed);
}

/// A leaf split; `remaining` entries stayed in the left half.
#[inline]
pub(crate) fn leaf_split(remaining: usize) {
    #[cfg(feature = "tracing")]
    tracing::debug!(remaining, "leaf split");
    #[cfg(not(feature = "tracing"))]
    let _ = remaining;
}

/// An internal node split; `moved` children went to the new sibling.
#[inline]
pub(crate) fn internal_split(remaining: usize, moved: usize) {
    #[cfg(feature = "tracing")]
    tracing::debug!(remaining, moved, "internal split");
    #[cfg(not(feature = "tracing"))]
    let _ = (remaining, moved);
}

/// The root split; the tree grew one level.
#[inline]
pub(crate) fn root_split(ticket: u64) {
    #[cfg(feature = "tracing")]
    tracing::debug!(ticket, "root split, tree grew one level");
    #[cfg(not(feature = "tracing"))]
    let _ = ticket;
}

/// An underfull node borrowed one element from a sibling.
#[inline]
pub(crate) fn borrowed(from: Sibling, is_leaf: bool) {
    #[cfg(feature = "tracing")]
    tracing::debug!(?from, is_leaf, "borrowed from sibling");
    #[cfg(not(feature = "tracing"))]
    let _ = (from, is_leaf);
}

/// An underfull node merged with a sibling; one of the two was freed.
#[inline]
pub(crate) fn merged(with: Sibling, is_leaf: bool) {
    #[cfg(feature = "tracing")]
    tracing::debug!(?with, is_leaf, "merged with sibling");
    #[cfg(not(feature = "tracing"))]
    let _ = (with, is_leaf);
}

/// The root collapsed onto its only child; the tree shrank one level.
#[inline]
pub(crate) fn root_collapsed(ticket: u64) {
    #[cfg(feature = "tracing")]
    tracing::debug!(ticket, "root collapsed, tree shrank one level");
    #[cfg(not(feature = "tracing"))]
    let _ = ticket;
}

/// A separator equal to the deleted key was rewritten to the smallest
/// key of the subtree to its right.
#[inline]
pub(crate) fn separator_repaired() {
    #[cfg(feature = "tracing")]
    tracing::trace!("separator repaired to successor key");
}

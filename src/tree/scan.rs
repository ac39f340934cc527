//! Bounded range scans over the leaf chain.
//!
//! Ascending scans start at the leaf that would hold `low` and walk
//! `right_sibling` links hand-over-hand: the next leaf's read lock is
//! acquired before the current one is released, so no split or merge can
//! slip between two observed leaves.
//!
//! Descending scans walk `left_sibling` links. Blocking right-to-left
//! would invert the leaf lock order, so the left neighbor is only probed
//! with `try_read`; on contention the scan releases everything and
//! re-descends from the root, bounded by the last emitted key. Emission
//! is keyed strictly below that bound, so a re-descent never repeats and
//! never skips an entry.
//!
//! `limit` counts emitted entries (distinct keys); a limited scan emits
//! every value of an entry before testing the limit. `limit = 0` means
//! unlimited. An empty range (`low > high`) emits nothing.

use std::sync::Weak;

use crate::keyops::KeyOps;
use crate::ticketlock::TicketRwLock;

use super::CrabTree;

impl<K, V, O> CrabTree<K, V, O>
where
    O: KeyOps<K, V>,
{
    /// Values of every entry with key in `[low, high]`, walked left to
    /// right. Values within one entry come out in unspecified order.
    #[must_use]
    pub fn scan_ascending(&self, low: &K, high: &K, limit: u32) -> Vec<V>
    where
        V: Clone,
    {
        let mut out = Vec::new();
        if self.ops.key_less(high, low) {
            return out;
        }

        let mut emitted_entries: u32 = 0;
        let mut guard = self.descend_to_leaf_read(low);

        'walk: loop {
            for entry in guard.as_leaf().entries() {
                if self.ops.key_less(entry.key(), low) {
                    continue;
                }
                if self.ops.key_less(high, entry.key()) {
                    break 'walk;
                }
                out.extend(entry.values().iter().cloned());
                emitted_entries += 1;
                if limit != 0 && emitted_entries >= limit {
                    break 'walk;
                }
            }

            let Some(next) = guard.as_leaf().right_sibling().and_then(Weak::upgrade) else {
                break;
            };
            // Hand-over-hand: the new guard is acquired before the old
            // one drops.
            guard = TicketRwLock::read(&next);
        }

        out
    }

    /// Values of every entry with key in `[low, high]`, walked right to
    /// left.
    #[must_use]
    pub fn scan_descending(&self, low: &K, high: &K, limit: u32) -> Vec<V>
    where
        K: Clone,
        V: Clone,
    {
        let mut out = Vec::new();
        if self.ops.key_less(high, low) {
            return out;
        }

        let mut emitted_entries: u32 = 0;
        // Keys >= bound are already emitted (or above high); only keys
        // strictly below it may still be emitted. This is what makes the
        // contended re-descent exact.
        let mut bound: Option<K> = None;
        let mut guard = self.descend_to_leaf_read(high);

        'walk: loop {
            for entry in guard.as_leaf().entries().iter().rev() {
                let key = entry.key();
                match &bound {
                    Some(b) => {
                        if !self.ops.key_less(key, b) {
                            continue;
                        }
                    }
                    None => {
                        if self.ops.key_less(high, key) {
                            continue;
                        }
                    }
                }
                if self.ops.key_less(key, low) {
                    break 'walk;
                }
                out.extend(entry.values().iter().cloned());
                emitted_entries += 1;
                bound = Some(key.clone());
                if limit != 0 && emitted_entries >= limit {
                    break 'walk;
                }
            }

            let Some(prev) = guard.as_leaf().left_sibling().and_then(Weak::upgrade) else {
                break;
            };
            match TicketRwLock::try_read(&prev) {
                Some(prev_guard) => guard = prev_guard,
                None => {
                    // A writer owns or queues on the left neighbor.
                    // Blocking here right-to-left could deadlock with it,
                    // so restart from the root below the bound.
                    let target = bound.clone().unwrap_or_else(|| high.clone());
                    drop(guard);
                    guard = self.descend_to_leaf_read(&target);
                }
            }
        }

        out
    }
}

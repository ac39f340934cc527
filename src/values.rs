//! Per-key value storage for leaf nodes.
//!
//! A [`ValueList`] is the leaf-resident bag for one distinct key: the key
//! stored once plus the unordered multiset of values associated with it.
//! It is created on the first insertion of a new distinct key and torn
//! down by the caller when a deletion empties the multiset.
//!
//! No invariants couple distinct value lists; duplicate suppression is a
//! policy of the caller, not of the multiset.

use crate::keyops::KeyOps;

/// A distinct key and the multiset of values stored under it.
///
/// After any successful tree operation the multiset is non-empty; an
/// emptied list is spliced out of its leaf by the deletion path.
#[derive(Debug, Clone)]
pub(crate) struct ValueList<K, V> {
    key: K,
    values: Vec<V>,
}

impl<K, V> ValueList<K, V> {
    /// Create a list holding a single value.
    pub(crate) fn new(key: K, first: V) -> Self {
        Self {
            key,
            values: vec![first],
        }
    }

    /// The distinct key this list stores.
    #[inline]
    pub(crate) fn key(&self) -> &K {
        &self.key
    }

    /// Append a value unconditionally; returns the new multiset size.
    pub(crate) fn add_value(&mut self, value: V) -> usize {
        self.values.push(value);
        self.values.len()
    }

    /// Linear membership test under the bundle's value equality.
    pub(crate) fn contains_value<O: KeyOps<K, V>>(&self, value: &V, ops: &O) -> bool {
        self.values.iter().any(|v| ops.value_eq(v, value))
    }

    /// Remove one occurrence of `value`; returns whether one was removed.
    ///
    /// The multiset is unordered, so removal may reorder the remaining
    /// values.
    pub(crate) fn remove_one<O: KeyOps<K, V>>(&mut self, value: &V, ops: &O) -> bool {
        match self.values.iter().position(|v| ops.value_eq(v, value)) {
            Some(at) => {
                self.values.swap_remove(at);
                true
            }
            None => false,
        }
    }

    /// True when the multiset holds no values.
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values in the multiset.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }

    /// The values, in unspecified order.
    #[inline]
    pub(crate) fn values(&self) -> &[V] {
        &self.values
    }

    /// Snapshot of the multiset for the scan and lookup paths.
    pub(crate) fn all_values(&self) -> Vec<V>
    where
        V: Clone,
    {
        self.values.clone()
    }

    /// Estimated heap footprint of this entry: the list header plus the
    /// live values. Computed from lengths, not capacities, so an
    /// insert/delete pair restores the previous figure.
    pub(crate) fn heap_bytes(&self) -> u64 {
        let header = size_of::<Self>() as u64;
        let values = (self.values.len() * size_of::<V>()) as u64;
        header + values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyops::OrdKeyOps;

    #[test]
    fn test_new_holds_single_value() {
        let list: ValueList<u64, u64> = ValueList::new(4, 40);

        assert_eq!(*list.key(), 4);
        assert_eq!(list.len(), 1);
        assert!(!list.is_empty());
        assert!(list.contains_value(&40, &OrdKeyOps));
    }

    #[test]
    fn test_add_value_permits_duplicates() {
        let mut list: ValueList<u64, u64> = ValueList::new(4, 40);

        assert_eq!(list.add_value(40), 2);
        assert_eq!(list.add_value(41), 3);

        let mut snapshot = list.all_values();
        snapshot.sort_unstable();
        assert_eq!(snapshot, vec![40, 40, 41]);
    }

    #[test]
    fn test_remove_one_removes_single_occurrence() {
        let mut list: ValueList<u64, u64> = ValueList::new(4, 40);
        list.add_value(40);

        assert!(list.remove_one(&40, &OrdKeyOps));
        assert_eq!(list.len(), 1);
        assert!(list.contains_value(&40, &OrdKeyOps));

        assert!(list.remove_one(&40, &OrdKeyOps));
        assert!(list.is_empty());

        assert!(!list.remove_one(&40, &OrdKeyOps));
    }

    #[test]
    fn test_heap_bytes_tracks_length() {
        let mut list: ValueList<u64, u64> = ValueList::new(1, 10);
        let one = list.heap_bytes();

        list.add_value(11);
        let two = list.heap_bytes();
        assert_eq!(two - one, size_of::<u64>() as u64);

        assert!(list.remove_one(&11, &OrdKeyOps));
        assert_eq!(list.heap_bytes(), one);
    }
}

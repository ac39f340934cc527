//! Property-based tests for the tree.
//!
//! Differential testing against `BTreeMap<u64, Vec<u64>>` as the oracle
//! for the multimap semantics, plus a structural invariant check after
//! every generated batch.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

mod common;

use std::collections::BTreeMap;

use crabtree::{CrabTree, DeleteOutcome, InsertOutcome};
use proptest::prelude::*;

type Oracle = BTreeMap<u64, Vec<u64>>;

// ============================================================================
//  Strategies
// ============================================================================

/// Small key space so collisions, duplicates and deletes actually hit.
fn key() -> impl Strategy<Value = u64> {
    0_u64..48
}

fn value() -> impl Strategy<Value = u64> {
    0_u64..6
}

/// Branching parameters worth exercising, including the minimum.
fn order() -> impl Strategy<Value = u32> {
    prop_oneof![Just(2), Just(3), Just(4), Just(7), Just(16)]
}

/// Operations for random testing.
#[derive(Debug, Clone)]
enum Op {
    Insert(u64, u64),
    InsertDistinct(u64, u64),
    Delete(u64, u64),
    Get(u64),
    ScanAscending(u64, u64, u32),
    ScanDescending(u64, u64, u32),
}

fn operations(max_ops: usize) -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            4 => (key(), value()).prop_map(|(k, v)| Op::Insert(k, v)),
            1 => (key(), value()).prop_map(|(k, v)| Op::InsertDistinct(k, v)),
            3 => (key(), value()).prop_map(|(k, v)| Op::Delete(k, v)),
            2 => key().prop_map(Op::Get),
            1 => (key(), key(), 0_u32..5).prop_map(|(a, b, l)| Op::ScanAscending(a, b, l)),
            1 => (key(), key(), 0_u32..5).prop_map(|(a, b, l)| Op::ScanDescending(a, b, l)),
        ],
        0..=max_ops,
    )
}

// ============================================================================
//  Oracle helpers
// ============================================================================

fn oracle_insert(oracle: &mut Oracle, key: u64, value: u64) {
    oracle.entry(key).or_default().push(value);
}

fn oracle_delete(oracle: &mut Oracle, key: u64, value: u64) -> bool {
    let Some(values) = oracle.get_mut(&key) else {
        return false;
    };
    let Some(at) = values.iter().position(|v| *v == value) else {
        return false;
    };
    values.swap_remove(at);
    if values.is_empty() {
        oracle.remove(&key);
    }
    true
}

fn sorted(mut values: Vec<u64>) -> Vec<u64> {
    values.sort_unstable();
    values
}

/// Expected scan output as per-entry multisets in emission order,
/// honoring the entry-granular limit.
fn oracle_scan(oracle: &Oracle, low: u64, high: u64, limit: u32, descending: bool) -> Vec<Vec<u64>> {
    if low > high {
        return Vec::new();
    }
    let mut entries: Vec<Vec<u64>> = Vec::new();
    let in_range = oracle.range(low..=high);
    let keys: Vec<u64> = if descending {
        in_range.rev().map(|(k, _)| *k).collect()
    } else {
        in_range.map(|(k, _)| *k).collect()
    };
    for key in keys {
        if limit != 0 && entries.len() >= limit as usize {
            break;
        }
        entries.push(sorted(oracle[&key].clone()));
    }
    entries
}

/// Cut a flat scan result into per-entry chunks using the oracle's
/// multiset sizes, sorting each chunk (in-entry order is unspecified).
fn chunk_scan(flat: &[u64], expected: &[Vec<u64>]) -> Option<Vec<Vec<u64>>> {
    let mut chunks = Vec::new();
    let mut rest = flat;
    for entry in expected {
        if rest.len() < entry.len() {
            return None;
        }
        let (chunk, tail) = rest.split_at(entry.len());
        chunks.push(sorted(chunk.to_vec()));
        rest = tail;
    }
    rest.is_empty().then_some(chunks)
}

fn check_scan(tree: &CrabTree<u64, u64>, oracle: &Oracle, op: &Op) {
    let (low, high, limit, descending) = match *op {
        Op::ScanAscending(low, high, limit) => (low, high, limit, false),
        Op::ScanDescending(low, high, limit) => (low, high, limit, true),
        _ => unreachable!(),
    };
    let flat = if descending {
        tree.scan_descending(&low, &high, limit)
    } else {
        tree.scan_ascending(&low, &high, limit)
    };
    let expected = oracle_scan(oracle, low, high, limit, descending);
    let chunks = chunk_scan(&flat, &expected);
    assert_eq!(
        chunks.as_deref(),
        Some(expected.as_slice()),
        "scan mismatch: low={low} high={high} limit={limit} descending={descending}"
    );
}

// ============================================================================
//  Differential properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Random operation batches match the oracle at every step, and the
    /// structure validates afterwards.
    #[test]
    fn differential_random_ops(order in order(), ops in operations(300)) {
        common::init_tracing();
        let tree: CrabTree<u64, u64> = CrabTree::new(order);
        let mut oracle: Oracle = Oracle::new();

        for op in &ops {
            match *op {
                Op::Insert(key, value) => {
                    prop_assert_eq!(tree.insert(key, value), InsertOutcome::Inserted);
                    oracle_insert(&mut oracle, key, value);
                }
                Op::InsertDistinct(key, value) => {
                    let present = oracle
                        .get(&key)
                        .is_some_and(|vs| vs.contains(&value));
                    let outcome = tree.insert_distinct(key, value);
                    if present {
                        prop_assert_eq!(outcome, InsertOutcome::NoOp);
                    } else {
                        prop_assert_eq!(outcome, InsertOutcome::Inserted);
                        oracle_insert(&mut oracle, key, value);
                    }
                }
                Op::Delete(key, value) => {
                    let expected = oracle_delete(&mut oracle, key, value);
                    let outcome = tree.delete(&key, &value);
                    prop_assert_eq!(outcome == DeleteOutcome::Removed, expected);
                }
                Op::Get(key) => {
                    let expected = oracle.get(&key).cloned().unwrap_or_default();
                    prop_assert_eq!(sorted(tree.get_value(&key)), sorted(expected));
                }
                Op::ScanAscending(..) | Op::ScanDescending(..) => check_scan(&tree, &oracle, op),
            }
        }

        tree.assert_invariants();

        let expected_len: usize = oracle.values().map(Vec::len).sum();
        prop_assert_eq!(tree.len(), expected_len as u64);

        for (key, values) in &oracle {
            prop_assert_eq!(sorted(tree.get_value(key)), sorted(values.clone()));
        }
    }

    /// Inserting the same (key, value) multiset in any order yields
    /// lookup-equivalent trees.
    #[test]
    fn insertion_order_is_immaterial(order in order(), pairs in prop::collection::vec((key(), value()), 1..60)) {
        common::init_tracing();
        let forward: CrabTree<u64, u64> = CrabTree::new(order);
        let backward: CrabTree<u64, u64> = CrabTree::new(order);

        for &(k, v) in &pairs {
            let _ = forward.insert(k, v);
        }
        for &(k, v) in pairs.iter().rev() {
            let _ = backward.insert(k, v);
        }

        forward.assert_invariants();
        backward.assert_invariants();

        for &(k, _) in &pairs {
            prop_assert_eq!(
                sorted(forward.get_value(&k)),
                sorted(backward.get_value(&k))
            );
        }
        prop_assert_eq!(
            forward.scan_ascending(&0, &u64::MAX, 0).len(),
            backward.scan_ascending(&0, &u64::MAX, 0).len()
        );
    }

    /// Fill then fully drain, checking structure the whole way down.
    #[test]
    fn drain_to_empty(order in order(), keys in prop::collection::hash_set(key(), 1..40)) {
        common::init_tracing();
        let tree: CrabTree<u64, u64> = CrabTree::new(order);
        let keys: Vec<u64> = keys.into_iter().collect();

        for &k in &keys {
            let _ = tree.insert(k, k);
        }
        tree.assert_invariants();

        for &k in &keys {
            prop_assert_eq!(tree.delete(&k, &k), DeleteOutcome::Removed);
            tree.assert_invariants();
        }

        prop_assert!(tree.is_empty());
        prop_assert_eq!(tree.depth(), 1);
        prop_assert_eq!(tree.scan_ascending(&0, &u64::MAX, 0), Vec::<u64>::new());
    }

    /// Ascending and descending scans are mirror images.
    #[test]
    fn scans_mirror_each_other(order in order(), keys in prop::collection::hash_set(key(), 0..40), low in key(), high in key()) {
        common::init_tracing();
        let tree: CrabTree<u64, u64> = CrabTree::new(order);
        for &k in &keys {
            let _ = tree.insert(k, k);
        }

        let mut ascending = tree.scan_ascending(&low, &high, 0);
        let descending = tree.scan_descending(&low, &high, 0);
        ascending.reverse();
        prop_assert_eq!(ascending, descending);
    }
}

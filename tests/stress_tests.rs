//! Concurrent stress tests.
//!
//! These drive the crabbing protocol with real thread interleavings:
//! disjoint and overlapping writers, reader/writer mixes, and
//! insert/delete churn at the minimum order (which maximizes splits,
//! borrows and merges). Each test ends with a full invariant check on the
//! quiescent tree.

#![expect(clippy::unwrap_used, reason = "fail fast in tests")]

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crabtree::{CrabTree, DeleteOutcome};

const SMALL_ORDER: u32 = 2;

#[test]
fn concurrent_disjoint_range_writers() {
    common::init_tracing();

    const NUM_THREADS: u64 = 8;
    const KEYS_PER_THREAD: u64 = 500;

    let tree = Arc::new(CrabTree::<u64, u64>::new(4));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let base = t * KEYS_PER_THREAD;
                for i in 0..KEYS_PER_THREAD {
                    let _ = tree.insert(base + i, t);
                    // Immediate read-back through the public path.
                    assert_eq!(tree.get_value(&(base + i)), vec![t]);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    tree.assert_invariants();
    assert_eq!(tree.len(), NUM_THREADS * KEYS_PER_THREAD);

    let all = tree.scan_ascending(&0, &u64::MAX, 0);
    assert_eq!(all.len() as u64, NUM_THREADS * KEYS_PER_THREAD);
}

#[test]
fn concurrent_writers_on_shared_keys() {
    common::init_tracing();

    const NUM_THREADS: u64 = 8;
    const KEYS: u64 = 64;

    // Every thread stores its own value under every key; the per-key
    // multisets must come out complete.
    let tree = Arc::new(CrabTree::<u64, u64>::new(SMALL_ORDER));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                for key in 0..KEYS {
                    let _ = tree.insert(key, t);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    tree.assert_invariants();
    for key in 0..KEYS {
        let mut values = tree.get_value(&key);
        values.sort_unstable();
        let expected: Vec<u64> = (0..NUM_THREADS).collect();
        assert_eq!(values, expected, "key {key}");
    }
}

#[test]
fn concurrent_insert_delete_churn_at_minimum_order() {
    common::init_tracing();

    const NUM_THREADS: u64 = 6;
    const ROUNDS: u64 = 200;

    let tree = Arc::new(CrabTree::<u64, u64>::new(SMALL_ORDER));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let base = t * ROUNDS;
                for i in 0..ROUNDS {
                    let key = base + i;
                    let _ = tree.insert(key, key);
                    if i % 2 == 0 {
                        assert_eq!(tree.delete(&key, &key), DeleteOutcome::Removed);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    tree.assert_invariants();
    // Odd offsets survive, even offsets were deleted.
    for t in 0..NUM_THREADS {
        for i in 0..ROUNDS {
            let key = t * ROUNDS + i;
            let expected = if i % 2 == 0 { 0 } else { 1 };
            assert_eq!(tree.get_value(&key).len(), expected, "key {key}");
        }
    }
}

#[test]
fn readers_race_writers() {
    common::init_tracing();

    const WRITERS: u64 = 4;
    const READERS: usize = 4;
    const KEYS_PER_WRITER: u64 = 400;

    let tree = Arc::new(CrabTree::<u64, u64>::new(SMALL_ORDER));
    let done = Arc::new(AtomicBool::new(false));

    let writer_handles: Vec<_> = (0..WRITERS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let base = t * KEYS_PER_WRITER;
                for i in 0..KEYS_PER_WRITER {
                    let _ = tree.insert(base + i, base + i);
                }
            })
        })
        .collect();

    let reader_handles: Vec<_> = (0..READERS)
        .map(|r| {
            let tree = Arc::clone(&tree);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut iterations = 0_u64;
                loop {
                    // Ascending scans must always come out sorted, no
                    // matter what the writers are doing.
                    let snapshot = if r % 2 == 0 {
                        tree.scan_ascending(&0, &u64::MAX, 0)
                    } else {
                        let mut descending = tree.scan_descending(&0, &u64::MAX, 0);
                        descending.reverse();
                        descending
                    };
                    assert!(
                        snapshot.windows(2).all(|w| w[0] < w[1]),
                        "scan observed out-of-order keys"
                    );
                    iterations += 1;
                    if done.load(Ordering::Relaxed) {
                        break;
                    }
                }
                iterations
            })
        })
        .collect();

    for h in writer_handles {
        h.join().unwrap();
    }
    done.store(true, Ordering::Relaxed);
    for h in reader_handles {
        assert!(h.join().unwrap() > 0);
    }

    tree.assert_invariants();
    assert_eq!(tree.len(), WRITERS * KEYS_PER_WRITER);
}

#[test]
fn deletes_race_scans_until_empty() {
    common::init_tracing();

    const KEYS: u64 = 1500;

    let tree = Arc::new(CrabTree::<u64, u64>::new(SMALL_ORDER));
    for key in 0..KEYS {
        let _ = tree.insert(key, key);
    }

    let deleter = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            // Delete right-to-left so descending scans chase the shrink.
            for key in (0..KEYS).rev() {
                assert_eq!(tree.delete(&key, &key), DeleteOutcome::Removed);
            }
        })
    };
    let scanner = {
        let tree = Arc::clone(&tree);
        thread::spawn(move || {
            loop {
                let snapshot = tree.scan_descending(&0, &u64::MAX, 0);
                assert!(
                    snapshot.windows(2).all(|w| w[0] > w[1]),
                    "descending scan observed out-of-order keys"
                );
                if snapshot.is_empty() {
                    break;
                }
            }
        })
    };

    deleter.join().unwrap();
    scanner.join().unwrap();

    tree.assert_invariants();
    assert!(tree.is_empty());
}

#[test]
fn unique_inserts_agree_under_contention() {
    common::init_tracing();

    const NUM_THREADS: u64 = 8;
    const KEYS: u64 = 100;

    // All threads race insert_unique on the same keys with a predicate
    // that rejects any existing value: exactly one wins per key.
    let tree = Arc::new(CrabTree::<u64, u64>::new(4));

    let handles: Vec<_> = (0..NUM_THREADS)
        .map(|t| {
            let tree = Arc::clone(&tree);
            thread::spawn(move || {
                let mut wins = 0_u64;
                for key in 0..KEYS {
                    if tree.insert_unique(key, t, |_| true).is_inserted() {
                        wins += 1;
                    }
                }
                wins
            })
        })
        .collect();

    let total_wins: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    tree.assert_invariants();
    assert_eq!(total_wins, KEYS);
    for key in 0..KEYS {
        assert_eq!(tree.get_value(&key).len(), 1, "key {key}");
    }
}

//! FIFO ticket reader/writer lock with owned guards.
//!
//! Every node (and the tree-level root anchor) is guarded by a
//! [`TicketRwLock`]. Unlike an ordinary reader/writer lock, admission is
//! strictly first-in-first-out: each acquisition attempt draws a ticket
//! from the lock's counter and is admitted only when its ticket reaches
//! the front of the queue and no incompatible holder is active. Writers
//! are exclusive; readers are shared with each other (consecutive queued
//! readers are admitted as a batch) but exclusive with writers.
//!
//! FIFO admission is what prevents writer starvation and what gives
//! contending writers a total order: writers draw their tree-level turn
//! ticket while holding the root anchor and acquire node locks strictly
//! top-down, so every node they both touch observes them in turn order.
//!
//! # Owned guards
//!
//! Guards hold an `Arc` of the lock rather than a borrow. Lock crabbing
//! needs this: the descent stack stores a guard per held ancestor and
//! drops an arbitrary prefix of them once a node proves structurally
//! safe, which a lifetime-bound guard cannot express.
//!
//! # `try_read`
//!
//! [`TicketRwLock::try_read`] admits only when the wait queue is empty and
//! no writer is active. Barging past queued waiters would break the FIFO
//! guarantee, so a non-empty queue fails the attempt. Descending scans use
//! this to probe a left sibling without risking a lock-order inversion.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

// ============================================================================
//  Queue state
// ============================================================================

/// Admission bookkeeping, guarded by the internal mutex.
#[derive(Debug)]
struct QueueState {
    /// Next ticket to hand out.
    next_ticket: u64,

    /// Ticket currently at the front of the queue.
    serving: u64,

    /// Readers currently holding the lock.
    active_readers: u32,

    /// Whether a writer currently holds the lock.
    writer_active: bool,
}

impl QueueState {
    const fn new() -> Self {
        Self {
            next_ticket: 0,
            serving: 0,
            active_readers: 0,
            writer_active: false,
        }
    }

    /// True when no acquisition attempt is queued.
    const fn queue_empty(&self) -> bool {
        self.serving == self.next_ticket
    }
}

// ============================================================================
//  TicketRwLock
// ============================================================================

/// A fair reader/writer lock admitting holders in ticket order.
pub struct TicketRwLock<T> {
    state: Mutex<QueueState>,
    turnstile: Condvar,
    data: UnsafeCell<T>,
}

// SAFETY: the admission protocol guarantees either one writer or any
// number of readers access `data`, so the lock behaves like an RwLock:
// moving it needs T: Send, sharing it hands out &T (needs Sync) and,
// through write guards, &mut T (needs Send).
unsafe impl<T: Send> Send for TicketRwLock<T> {}
unsafe impl<T: Send + Sync> Sync for TicketRwLock<T> {}

impl<T> TicketRwLock<T> {
    /// Wrap `data` in a new, unlocked lock.
    pub const fn new(data: T) -> Self {
        Self {
            state: Mutex::new(QueueState::new()),
            turnstile: Condvar::new(),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock shared, waiting for the ticket to come up.
    pub fn read(lock: &Arc<Self>) -> TicketReadGuard<T> {
        let mut state = lock.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while state.serving != ticket || state.writer_active {
            lock.turnstile.wait(&mut state);
        }

        state.active_readers += 1;
        // Advance the queue immediately so a run of queued readers is
        // admitted as a batch.
        state.serving += 1;
        drop(state);
        lock.turnstile.notify_all();

        TicketReadGuard {
            lock: Arc::clone(lock),
        }
    }

    /// Acquire the lock exclusive, waiting for the ticket to come up and
    /// for all earlier readers to drain.
    pub fn write(lock: &Arc<Self>) -> TicketWriteGuard<T> {
        let mut state = lock.state.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        while state.serving != ticket || state.writer_active || state.active_readers > 0 {
            lock.turnstile.wait(&mut state);
        }

        state.writer_active = true;
        state.serving += 1;
        drop(state);

        TicketWriteGuard {
            lock: Arc::clone(lock),
        }
    }

    /// Acquire shared without waiting.
    ///
    /// Fails when a writer is active or when any attempt is queued;
    /// succeeding in either case would barge past the FIFO queue.
    pub fn try_read(lock: &Arc<Self>) -> Option<TicketReadGuard<T>> {
        let mut state = lock.state.lock();
        if state.writer_active || !state.queue_empty() {
            return None;
        }

        state.next_ticket += 1;
        state.serving += 1;
        state.active_readers += 1;
        drop(state);

        Some(TicketReadGuard {
            lock: Arc::clone(lock),
        })
    }

    fn release_read(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.active_readers > 0, "release_read without a reader");
        state.active_readers -= 1;
        let drained = state.active_readers == 0;
        drop(state);
        if drained {
            self.turnstile.notify_all();
        }
    }

    fn release_write(&self) {
        let mut state = self.state.lock();
        debug_assert!(state.writer_active, "release_write without a writer");
        state.writer_active = false;
        drop(state);
        self.turnstile.notify_all();
    }
}

impl<T: fmt::Debug> fmt::Debug for TicketRwLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketRwLock")
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

// ============================================================================
//  Guards
// ============================================================================

/// Shared guard. Releases on drop.
pub struct TicketReadGuard<T> {
    lock: Arc<TicketRwLock<T>>,
}

impl<T> TicketReadGuard<T> {
    /// The lock this guard holds, for identity comparisons and re-locking.
    #[must_use]
    pub fn rwlock(&self) -> &Arc<TicketRwLock<T>> {
        &self.lock
    }
}

impl<T> Deref for TicketReadGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: a read guard exists, so no writer is active and the
        // protocol admits only shared access until it drops.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for TicketReadGuard<T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

/// Exclusive guard. Releases on drop.
pub struct TicketWriteGuard<T> {
    lock: Arc<TicketRwLock<T>>,
}

impl<T> TicketWriteGuard<T> {
    /// The lock this guard holds, for identity comparisons and re-locking.
    #[must_use]
    pub fn rwlock(&self) -> &Arc<TicketRwLock<T>> {
        &self.lock
    }
}

impl<T> Deref for TicketWriteGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: this guard is the unique holder.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for TicketWriteGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: this guard is the unique holder.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for TicketWriteGuard<T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

// ============================================================================
//  Tests
// ============================================================================

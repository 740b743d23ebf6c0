//! Shared numeric accumulator
//!
//! A single `i64` total contributed to by many threads, with the update
//! strategy fixed at construction. Exactly one synchronization mechanism
//! guards the total for each strategy:
//!
//! - [`Strategy::Unsynchronized`] - none. A plain read-modify-write;
//!   concurrent contributions can lose updates, and divergence from the
//!   sequential sum is an expected outcome under load.
//! - [`Strategy::Locked`] - a mutex around every contribution. Exact.
//! - [`Strategy::Atomic`] - a hardware fetch-add. Exact, non-blocking.
//!
//! The accumulator is an owned value shared by handle; nothing here is
//! ambient or static.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// How contributions to the shared total are synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// No synchronization; lost updates expected under contention.
    Unsynchronized,
    /// Every contribution holds an exclusive lock.
    Locked,
    /// Contributions use an atomic fetch-add.
    Atomic,
}

enum Total {
    /// Atomic storage, non-atomic update: the load/store pair is the race.
    Unsynchronized(AtomicI64),
    Locked(Mutex<i64>),
    Atomic(AtomicI64),
}

/// A shared running total.
///
/// Cloning produces another handle to the same total.
pub struct Accumulator {
    total: Arc<Total>,
    strategy: Strategy,
}

impl Clone for Accumulator {
    fn clone(&self) -> Self {
        Self {
            total: Arc::clone(&self.total),
            strategy: self.strategy,
        }
    }
}

impl Accumulator {
    /// Create a zeroed accumulator with the given update strategy.
    #[must_use]
    pub fn new(strategy: Strategy) -> Self {
        let total = match strategy {
            Strategy::Unsynchronized => Total::Unsynchronized(AtomicI64::new(0)),
            Strategy::Locked => Total::Locked(Mutex::new(0)),
            Strategy::Atomic => Total::Atomic(AtomicI64::new(0)),
        };
        Self {
            total: Arc::new(total),
            strategy,
        }
    }

    /// The strategy this accumulator was built with.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Add `delta` to the total under the configured strategy.
    pub fn add(&self, delta: i64) {
        match &*self.total {
            Total::Unsynchronized(t) => {
                let current = t.load(Ordering::Relaxed);
                t.store(current + delta, Ordering::Relaxed);
            }
            Total::Locked(t) => {
                *t.lock() += delta;
            }
            Total::Atomic(t) => {
                t.fetch_add(delta, Ordering::Relaxed);
            }
        }
    }

    /// Read the current total.
    #[must_use]
    pub fn total(&self) -> i64 {
        match &*self.total {
            Total::Unsynchronized(t) | Total::Atomic(t) => t.load(Ordering::Relaxed),
            Total::Locked(t) => *t.lock(),
        }
    }
}

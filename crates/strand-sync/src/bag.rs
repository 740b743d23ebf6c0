//! Unordered concurrent bag
//!
//! Storage is sharded so that threads mostly touch their own shard:
//! each thread is lazily assigned a shard slot on first access, adds go
//! to the local shard, and takes prefer it before scanning the others.
//! The price of low contention is that no ordering of any kind is
//! guaranteed.

use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

thread_local! {
    /// This thread's shard slot, assigned on first bag access.
    static BAG_SLOT: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Shard slot for the calling thread, assigned round-robin on first use.
fn local_slot(shard_count: usize) -> usize {
    static NEXT_SLOT: AtomicUsize = AtomicUsize::new(0);
    BAG_SLOT.with(|slot| match slot.get() {
        Some(s) => s % shard_count,
        None => {
            let s = NEXT_SLOT.fetch_add(1, Ordering::Relaxed);
            slot.set(Some(s));
            s % shard_count
        }
    })
}

/// A thread-safe unordered collection.
///
/// `add` always succeeds; `try_take` returns *an* element with no
/// ordering guarantee. Cloning produces another handle to the same bag.
pub struct ConcurrentBag<T> {
    shards: Arc<Vec<Mutex<Vec<T>>>>,
}

impl<T> Clone for ConcurrentBag<T> {
    fn clone(&self) -> Self {
        Self {
            shards: Arc::clone(&self.shards),
        }
    }
}

impl<T> Default for ConcurrentBag<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ConcurrentBag<T> {
    /// Create an empty bag with one shard per hardware thread.
    #[must_use]
    pub fn new() -> Self {
        let shards = std::thread::available_parallelism()
            .map(|p| p.get())
            .unwrap_or(1);
        Self::with_shards(shards)
    }

    /// Create an empty bag with an explicit shard count.
    ///
    /// # Panics
    ///
    /// Panics if `shards` is zero.
    #[must_use]
    pub fn with_shards(shards: usize) -> Self {
        assert!(shards > 0, "bag needs at least one shard");
        Self {
            shards: Arc::new((0..shards).map(|_| Mutex::new(Vec::new())).collect()),
        }
    }

    /// Add an item. Always succeeds.
    pub fn add(&self, item: T) {
        let slot = local_slot(self.shards.len());
        self.shards[slot].lock().push(item);
    }

    /// Remove and return an arbitrary item, if any.
    ///
    /// Prefers the calling thread's shard, then scans the rest.
    pub fn try_take(&self) -> Option<T> {
        let local = local_slot(self.shards.len());
        if let Some(item) = self.shards[local].lock().pop() {
            return Some(item);
        }
        for (i, shard) in self.shards.iter().enumerate() {
            if i == local {
                continue;
            }
            if let Some(item) = shard.lock().pop() {
                return Some(item);
            }
        }
        None
    }

    /// Total number of items across all shards.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// True if every shard is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.lock().is_empty())
    }
}

impl<T: Clone> ConcurrentBag<T> {
    /// Return a copy of an arbitrary item without removing it.
    pub fn try_peek(&self) -> Option<T> {
        let local = local_slot(self.shards.len());
        if let Some(item) = self.shards[local].lock().last().cloned() {
            return Some(item);
        }
        for (i, shard) in self.shards.iter().enumerate() {
            if i == local {
                continue;
            }
            if let Some(item) = shard.lock().last().cloned() {
                return Some(item);
            }
        }
        None
    }
}

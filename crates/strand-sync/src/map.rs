//! Concurrent map with compare-and-swap updates
//!
//! Keys are unique. Storage is split across a fixed number of shards,
//! each guarded by its own reader/writer lock; a key's shard is chosen
//! by hash, so operations on different shards never contend.
//!
//! `try_update` is the one operation that can lose a race: it succeeds
//! only if the current value equals the expected one, and retrying is
//! the caller's responsibility. `add_or_update` is atomic per key, but
//! its update function must be pure — the contract allows it to be
//! invoked more than once for a single logical update.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};
use std::sync::Arc;
use thiserror::Error;

/// Returned by [`ConcurrentMap::try_update`] when the current value does
/// not equal the expected one. The caller decides whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("current value did not match the expected value")]
pub struct CasFailed;

const SHARD_COUNT: usize = 16;

type Hasher = BuildHasherDefault<rustc_hash::FxHasher>;

/// A thread-safe map of unique keys.
///
/// Cloning produces another handle to the same map.
pub struct ConcurrentMap<K, V> {
    shards: Arc<Vec<RwLock<FxHashMap<K, V>>>>,
    hasher: Hasher,
}

impl<K, V> Clone for ConcurrentMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            shards: Arc::clone(&self.shards),
            hasher: Hasher::default(),
        }
    }
}

impl<K: Hash + Eq, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq, V> ConcurrentMap<K, V> {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: Arc::new(
                (0..SHARD_COUNT)
                    .map(|_| RwLock::new(FxHashMap::default()))
                    .collect(),
            ),
            hasher: Hasher::default(),
        }
    }

    fn shard(&self, key: &K) -> &RwLock<FxHashMap<K, V>> {
        let hash = self.hasher.hash_one(key) as usize;
        &self.shards[hash % SHARD_COUNT]
    }

    /// Insert `value` under `key` if the key is absent.
    ///
    /// Returns false (and leaves the map untouched) if the key exists.
    pub fn try_add(&self, key: K, value: V) -> bool {
        let mut shard = self.shard(&key).write();
        if shard.contains_key(&key) {
            return false;
        }
        shard.insert(key, value);
        true
    }

    /// Remove `key`, returning its value if present.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard(key).write().remove(key)
    }

    /// True if `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &K) -> bool {
        self.shard(key).read().contains_key(key)
    }

    /// Total number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// True if the map holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.read().is_empty())
    }
}

impl<K: Hash + Eq, V: Clone> ConcurrentMap<K, V> {
    /// Return a copy of the value under `key`, if present.
    pub fn get(&self, key: &K) -> Option<V> {
        self.shard(key).read().get(key).cloned()
    }

    /// Insert `seed` if `key` is absent, else replace the current value
    /// with `update(&current)`. Returns the value now stored.
    ///
    /// Atomic per key. `update` must be free of side effects: under
    /// contention the implementation may invoke it more than once for a
    /// single winning update.
    pub fn add_or_update<F>(&self, key: K, seed: V, update: F) -> V
    where
        F: Fn(&V) -> V,
    {
        let mut shard = self.shard(&key).write();
        let next = match shard.get(&key) {
            Some(current) => update(current),
            None => seed,
        };
        shard.insert(key, next.clone());
        next
    }
}

impl<K: Hash + Eq, V: PartialEq> ConcurrentMap<K, V> {
    /// Replace the value under `key` with `new` only if the current
    /// value equals `expected` (compare-and-swap).
    ///
    /// Fails with [`CasFailed`] when the key is absent or the value has
    /// moved on; this is the only race-losing path and the caller must
    /// retry or abandon.
    pub fn try_update(&self, key: K, new: V, expected: V) -> Result<(), CasFailed> {
        let mut shard = self.shard(&key).write();
        match shard.get(&key) {
            Some(current) if *current == expected => {
                shard.insert(key, new);
                Ok(())
            }
            _ => Err(CasFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_add_update_sequence() {
        let ages: ConcurrentMap<String, i32> = ConcurrentMap::new();

        assert!(ages.try_add("rico".to_string(), 29));
        assert_eq!(ages.get(&"rico".to_string()), Some(29));

        // A second add of the same key is rejected.
        assert!(!ages.try_add("rico".to_string(), 99));

        ages.try_update("rico".to_string(), 30, 29).unwrap();
        assert_eq!(ages.get(&"rico".to_string()), Some(30));

        let stored = ages.add_or_update("rico".to_string(), 1, |age| age + 1);
        assert_eq!(stored, 31);
        assert_eq!(ages.get(&"rico".to_string()), Some(31));
    }

    #[test]
    fn test_try_update_mismatch_is_returned_not_thrown() {
        let map: ConcurrentMap<&str, i32> = ConcurrentMap::new();
        map.try_add("k", 1);

        assert_eq!(map.try_update("k", 5, 2), Err(CasFailed));
        assert_eq!(map.get(&"k"), Some(1));

        // Absent keys fail the same way.
        assert_eq!(map.try_update("missing", 5, 2), Err(CasFailed));
    }

    #[test]
    fn test_add_or_update_seeds_when_absent() {
        let map: ConcurrentMap<&str, i32> = ConcurrentMap::new();
        assert_eq!(map.add_or_update("k", 7, |v| v + 1), 7);
        assert_eq!(map.add_or_update("k", 7, |v| v + 1), 8);
    }

    #[test]
    fn test_concurrent_add_or_update_counts_exactly() {
        let map: ConcurrentMap<&str, u64> = ConcurrentMap::new();
        let threads = 8;
        let per_thread = 500;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let map = map.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        map.add_or_update("hits", 1, |v| v + 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Seed 0 semantics: first writer stores the seed, the remaining
        // M-1 apply the increment; seeding with 1 makes the total M.
        assert_eq!(map.get(&"hits"), Some(threads * per_thread));
    }

    #[test]
    fn test_cas_retry_loop_converges() {
        let map: ConcurrentMap<&str, u64> = ConcurrentMap::new();
        map.try_add("n", 0);
        let threads = 4;
        let per_thread = 250;

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let map = map.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        loop {
                            let current = map.get(&"n").unwrap();
                            if map.try_update("n", current + 1, current).is_ok() {
                                break;
                            }
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(map.get(&"n"), Some(threads * per_thread));
    }

    #[test]
    fn test_remove_and_len() {
        let map: ConcurrentMap<i32, i32> = ConcurrentMap::new();
        for i in 0..100 {
            map.try_add(i, i * 2);
        }
        assert_eq!(map.len(), 100);
        assert_eq!(map.remove(&40), Some(80));
        assert_eq!(map.remove(&40), None);
        assert_eq!(map.len(), 99);
        assert!(!map.contains_key(&40));
    }
}

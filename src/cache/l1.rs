//! L1 Cache - Process-Local Bounded Map
//!
//! Capacity-bounded key/value map behind a reader/writer lock. Reads run
//! concurrently; writes are exclusive.
//!
//! # Eviction
//!
//! When a new key arrives at a full cache, exactly one arbitrary resident
//! entry is dropped. Hit-rate optimality is not a goal; the capacity bound is.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::key::CacheKey;

/// Contract shared by every L1 variant
pub trait L1Tier<V>: Send + Sync {
    /// Look up a value
    fn get(&self, key: &CacheKey) -> Option<V>;

    /// Insert or overwrite a value
    fn set(&self, key: CacheKey, value: V);

    /// Drop one key, returning whether it was present
    fn remove(&self, key: &CacheKey) -> bool;

    /// Drop everything
    fn flush(&self);

    /// Resident entry count
    fn len(&self) -> usize;

    /// Configured entry bound
    fn capacity(&self) -> usize;

    /// Counters snapshot
    fn stats(&self) -> L1Stats;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// L1 cache statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct L1Stats {
    /// Number of entries
    pub entries: usize,
    /// Entry bound
    pub capacity: usize,
    /// Hit count
    pub hits: u64,
    /// Miss count
    pub misses: u64,
    /// Capacity evictions
    pub evictions: u64,
    /// Hit ratio (0.0 - 1.0)
    pub hit_ratio: f64,
}

pub(crate) fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Generic capacity-bounded cache storing native values
pub struct BoundedCache<K, V> {
    map: RwLock<HashMap<K, V>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            map: RwLock::new(HashMap::with_capacity(capacity)),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Get a clone of the cached value
    pub fn get(&self, key: &K) -> Option<V> {
        let found = self.map.read().get(key).cloned();
        match &found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// Insert a value, evicting one arbitrary entry if the key is new and
    /// the cache is full
    pub fn set(&self, key: K, value: V) {
        let mut guard = self.map.write();

        if let Some(slot) = guard.get_mut(&key) {
            *slot = value;
            return;
        }

        if guard.len() >= self.capacity {
            if let Some(victim) = guard.keys().next().cloned() {
                guard.remove(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        guard.insert(key, value);
    }

    /// Remove an entry
    pub fn remove(&self, key: &K) -> bool {
        self.map.write().remove(key).is_some()
    }

    /// Check if cache contains a key (does not count as a hit)
    pub fn contains(&self, key: &K) -> bool {
        self.map.read().contains_key(key)
    }

    /// Clear the cache
    pub fn flush(&self) {
        self.map.write().clear();
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get cache statistics
    pub fn stats(&self) -> L1Stats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        L1Stats {
            entries: self.len(),
            capacity: self.capacity,
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_ratio: hit_ratio(hits, misses),
        }
    }
}

impl<V> L1Tier<V> for BoundedCache<CacheKey, V>
where
    V: Clone + Send + Sync,
{
    fn get(&self, key: &CacheKey) -> Option<V> {
        BoundedCache::get(self, key)
    }

    fn set(&self, key: CacheKey, value: V) {
        BoundedCache::set(self, key, value)
    }

    fn remove(&self, key: &CacheKey) -> bool {
        BoundedCache::remove(self, key)
    }

    fn flush(&self) {
        BoundedCache::flush(self)
    }

    fn len(&self) -> usize {
        BoundedCache::len(self)
    }

    fn capacity(&self) -> usize {
        BoundedCache::capacity(self)
    }

    fn stats(&self) -> L1Stats {
        BoundedCache::stats(self)
    }
}

// =============================================================================
// Tests
// =============================================================================

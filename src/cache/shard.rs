//! Sharded Map Implementation
//!
//! Concurrent hashmap split into independently locked shards.
//!
//! # Design
//!
//! - Each shard has its own RwLock, minimizing contention
//! - Power-of-2 shard count enables fast modulo via bitwise AND
//! - One entry bound for the whole map, tracked by an atomic count that only
//!   changes under a shard write lock
//! - A new key arriving at a full map evicts exactly one resident entry,
//!   taken from its own shard when possible and from another shard otherwise

use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Values that report their own size in bytes
pub trait Weighted {
    fn weight(&self) -> u64;
}

/// Outcome of a bounded insert
#[derive(Debug)]
pub struct Insertion<K, V> {
    /// Previous value under the same key
    pub replaced: Option<V>,
    /// Entry dropped to make room
    pub evicted: Option<(K, V)>,
}

/// Single shard containing a hashmap and its byte total
struct Shard<K, V> {
    map: RwLock<HashMap<K, V>>,
    size_bytes: AtomicU64,
}

impl<K, V> Shard<K, V> {
    fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            size_bytes: AtomicU64::new(0),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Weighted> Shard<K, V> {
    /// Drop one arbitrary entry from an already locked shard
    fn pop_one(&self, map: &mut HashMap<K, V>) -> Option<(K, V)> {
        let victim = map.keys().next().cloned()?;
        let old = map.remove(&victim)?;
        self.size_bytes.fetch_sub(old.weight(), Ordering::Relaxed);
        Some((victim, old))
    }
}

/// Sharded map holding at most `capacity` entries in total
pub struct ShardedMap<K, V> {
    shards: Box<[Shard<K, V>]>,
    mask: usize,
    capacity: usize,
    len: AtomicUsize,
}

impl<K, V> ShardedMap<K, V> {
    /// Create a map of `shard_count` shards (rounded up to a power of two)
    /// holding at most `capacity` entries (minimum 1) across all shards
    pub fn new(shard_count: usize, capacity: usize) -> Self {
        let count = shard_count.max(1).next_power_of_two();
        let shards: Vec<Shard<K, V>> = (0..count).map(|_| Shard::new()).collect();
        Self {
            shards: shards.into_boxed_slice(),
            mask: count - 1,
            capacity: capacity.max(1),
            len: AtomicUsize::new(0),
        }
    }

    /// Get the shard count
    #[inline]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Entry bound for the whole map
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get total number of entries across all shards
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get total size in bytes across all shards
    pub fn size_bytes(&self) -> u64 {
        self.shards.iter().map(|s| s.size_bytes.load(Ordering::Relaxed)).sum()
    }

    /// Claim one slot if the map is below capacity
    fn try_reserve(&self) -> bool {
        self.len
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok()
    }
}

impl<K: Eq + Hash + Clone, V: Weighted> ShardedMap<K, V> {
    // `Borrow` guarantees K and Q hash identically, so both pick one shard
    #[inline]
    fn shard_index<Q: Hash + ?Sized>(&self, key: &Q) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    /// Get a value
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.shards[self.shard_index(key)].map.read().get(key).cloned()
    }

    /// Insert a value. A new key at a full map evicts one resident entry.
    pub fn insert(&self, key: K, value: V) -> Insertion<K, V> {
        let home = self.shard_index(&key);
        let shard = &self.shards[home];
        let added = value.weight();
        let mut evicted = None;

        loop {
            let mut guard = shard.map.write();

            if let Some(slot) = guard.get_mut(&key) {
                let old = std::mem::replace(slot, value);
                shard.size_bytes.fetch_sub(old.weight(), Ordering::Relaxed);
                shard.size_bytes.fetch_add(added, Ordering::Relaxed);
                return Insertion {
                    replaced: Some(old),
                    evicted,
                };
            }

            if !self.try_reserve() {
                // Full: swap out a neighbour under the lock already held
                match shard.pop_one(&mut guard) {
                    Some(victim) => evicted = Some(victim),
                    None => {
                        drop(guard);
                        // Retry once a slot has been freed in another shard
                        if let Some(victim) = self.evict_outside(home) {
                            evicted = Some(victim);
                        }
                        continue;
                    }
                }
            }

            guard.insert(key, value);
            shard.size_bytes.fetch_add(added, Ordering::Relaxed);
            return Insertion {
                replaced: None,
                evicted,
            };
        }
    }

    /// Remove one entry from any shard other than `home`
    fn evict_outside(&self, home: usize) -> Option<(K, V)> {
        let count = self.shards.len();
        (1..count).find_map(|offset| {
            let shard = &self.shards[(home + offset) & self.mask];
            let mut guard = shard.map.write();
            let victim = shard.pop_one(&mut guard)?;
            self.len.fetch_sub(1, Ordering::AcqRel);
            Some(victim)
        })
    }

    /// Remove a value
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_if(key, |_| true)
    }

    /// Remove a value only if `predicate` holds for it
    pub fn remove_if<Q>(&self, key: &Q, predicate: impl FnOnce(&V) -> bool) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let shard = &self.shards[self.shard_index(key)];
        let mut guard = shard.map.write();
        if !guard.get(key).map(predicate).unwrap_or(false) {
            return None;
        }
        let removed = guard.remove(key)?;
        shard.size_bytes.fetch_sub(removed.weight(), Ordering::Relaxed);
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(removed)
    }

    /// Clear all shards
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            let mut guard = shard.map.write();
            let dropped = guard.len();
            guard.clear();
            shard.size_bytes.store(0, Ordering::Relaxed);
            self.len.fetch_sub(dropped, Ordering::AcqRel);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    struct Blob(Vec<u8>);

    impl Weighted for Blob {
        fn weight(&self) -> u64 {
            self.0.len() as u64
        }
    }

    #[test]
    fn test_shard_count_rounds_to_power_of_two() {
        let map: ShardedMap<String, Blob> = ShardedMap::new(10, 4);
        assert_eq!(map.shard_count(), 16);
        assert_eq!(map.capacity(), 4);

        let map: ShardedMap<String, Blob> = ShardedMap::new(0, 0);
        assert_eq!(map.shard_count(), 1);
        assert_eq!(map.capacity(), 1);
    }

    #[test]
    fn test_insert_get_remove_tracks_size() {
        let map: ShardedMap<String, Blob> = ShardedMap::new(4, 16);
        map.insert("a".into(), Blob(vec![0; 10]));
        map.insert("b".into(), Blob(vec![0; 5]));
        assert_eq!(map.len(), 2);
        assert_eq!(map.size_bytes(), 15);

        let replaced = map.insert("a".into(), Blob(vec![0; 2])).replaced;
        assert_eq!(replaced, Some(Blob(vec![0; 10])));
        assert_eq!(map.len(), 2);
        assert_eq!(map.size_bytes(), 7);

        assert!(map.remove("b").is_some());
        assert!(map.remove("b").is_none());
        assert_eq!(map.len(), 1);
        assert_eq!(map.size_bytes(), 2);
        assert_eq!(map.get("a"), Some(Blob(vec![0; 2])));
    }

    #[test]
    fn test_map_fills_to_capacity_before_evicting() {
        // Far more shards than entries: the bound is still the whole capacity
        let map: ShardedMap<u32, Blob> = ShardedMap::new(16, 10);
        for i in 0..10 {
            assert!(map.insert(i, Blob(vec![1])).evicted.is_none());
        }
        assert_eq!(map.len(), 10);

        let mut evictions = 0;
        for i in 10..40 {
            if map.insert(i, Blob(vec![1])).evicted.is_some() {
                evictions += 1;
            }
            assert_eq!(map.len(), 10);
        }
        assert_eq!(evictions, 30);
        assert_eq!(map.size_bytes(), 10);
    }

    #[test]
    fn test_colliding_keys_evict_exactly_one() {
        // One shard holds every key, the other stays empty
        let map: ShardedMap<u32, Blob> = ShardedMap::new(2, 2);
        let same_shard: Vec<u32> = (0..64)
            .filter(|k| map.shard_index(k) == map.shard_index(&0u32))
            .take(3)
            .collect();

        map.insert(same_shard[0], Blob(vec![1]));
        map.insert(same_shard[1], Blob(vec![1]));
        assert_eq!(map.len(), 2);

        let insertion = map.insert(same_shard[2], Blob(vec![1]));
        let (victim, _) = insertion.evicted.expect("one entry evicted");
        assert!(victim == same_shard[0] || victim == same_shard[1]);
        assert_eq!(map.len(), 2);
        assert!(map.get(&same_shard[2]).is_some());
    }

    #[test]
    fn test_new_key_in_empty_shard_evicts_from_another() {
        let map: ShardedMap<u32, Blob> = ShardedMap::new(2, 1);
        let home = map.shard_index(&0u32);
        let other = (1..64u32)
            .find(|k| map.shard_index(k) != home)
            .expect("key in the other shard");

        map.insert(0, Blob(vec![1]));
        let insertion = map.insert(other, Blob(vec![2]));

        assert_eq!(insertion.evicted.map(|(k, _)| k), Some(0));
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&other), Some(Blob(vec![2])));
        assert_eq!(map.size_bytes(), 1);
    }

    #[test]
    fn test_clear_resets_len() {
        let map: ShardedMap<u32, Blob> = ShardedMap::new(4, 8);
        for i in 0..8 {
            map.insert(i, Blob(vec![1]));
        }
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.size_bytes(), 0);
        map.insert(100, Blob(vec![1]));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_remove_if() {
        let map: ShardedMap<u32, Blob> = ShardedMap::new(2, 8);
        map.insert(1, Blob(vec![1, 2]));
        assert!(map.remove_if(&1, |b| b.0.len() > 5).is_none());
        assert!(map.remove_if(&1, |b| b.0.len() == 2).is_some());
        assert!(map.is_empty());
    }

    #[test]
    fn test_concurrent_inserts_respect_capacity() {
        let map: Arc<ShardedMap<u32, Blob>> = Arc::new(ShardedMap::new(8, 16));
        let handles: Vec<_> = (0..4u32)
            .map(|t| {
                let map = map.clone();
                std::thread::spawn(move || {
                    for i in 0..500 {
                        map.insert(t * 1000 + i, Blob(vec![1]));
                        assert!(map.len() <= 16);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(map.len(), 16);
    }
}

//! Byte-Oriented L1 Store
//!
//! L1 variant for high-churn entities: values are held as pre-encoded
//! `Bytes` with a per-entry TTL, so a hit costs a refcount bump instead of a
//! deep clone and no per-entry object graph is allocated.
//!
//! # Design
//!
//! - `ShardedMap` with one entry bound for the whole store; a new key at a
//!   full store evicts exactly one arbitrary resident entry
//! - Expired entries read as misses and are removed lazily
//! - [`EncodedL1`] adapts the store to the typed [`L1Tier`] contract; the
//!   typed value is decoded only on a hit

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::warn;

use super::key::CacheKey;
use super::l1::{hit_ratio, L1Stats, L1Tier};
use super::shard::{ShardedMap, Weighted};
use super::DEFAULT_BYTE_SHARDS;
use crate::codec::Codec;

/// Pre-encoded entry
#[derive(Debug, Clone)]
pub struct ByteEntry {
    data: Bytes,
    expires_at: Option<Instant>,
}

impl ByteEntry {
    fn new(data: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    #[inline]
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

impl Weighted for ByteEntry {
    fn weight(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Bounded, TTL-aware byte cache
pub struct ByteCache {
    map: ShardedMap<String, ByteEntry>,
    capacity: usize,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ByteCache {
    /// Create a store with the default shard count
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self::with_shards(capacity, ttl, DEFAULT_BYTE_SHARDS)
    }

    /// Create a store with an explicit shard count
    pub fn with_shards(capacity: usize, ttl: Option<Duration>, shards: usize) -> Self {
        let map = ShardedMap::new(shards, capacity);
        Self {
            capacity: map.capacity(),
            map,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Get the encoded payload for a key
    pub fn get(&self, key: &str) -> Option<Bytes> {
        match self.map.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                // Another writer may have refreshed the entry since the read
                if self
                    .map
                    .remove_if(key, |e| e.is_expired(Instant::now()))
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.data)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store an encoded payload
    pub fn set(&self, key: String, data: Bytes) {
        let insertion = self.map.insert(key, ByteEntry::new(data, self.ttl));
        if insertion.evicted.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove a key
    pub fn remove(&self, key: &str) -> bool {
        self.map.remove(key).is_some()
    }

    /// Clear the store
    pub fn flush(&self) {
        self.map.clear();
    }

    /// Get number of entries
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes held across all shards
    pub fn size_bytes(&self) -> u64 {
        self.map.size_bytes()
    }

    /// Entries dropped because their TTL elapsed
    pub fn expirations(&self) -> u64 {
        self.expirations.load(Ordering::Relaxed)
    }

    /// Get store statistics
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

/// Typed view over a [`ByteCache`]: encodes on `set`, decodes on `get`
pub struct EncodedL1<V> {
    store: ByteCache,
    _marker: PhantomData<fn() -> V>,
}

impl<V> EncodedL1<V> {
    pub fn new(store: ByteCache) -> Self {
        Self {
            store,
            _marker: PhantomData,
        }
    }

    /// Underlying byte store
    pub fn store(&self) -> &ByteCache {
        &self.store
    }
}

impl<V: Codec> L1Tier<V> for EncodedL1<V> {
    fn get(&self, key: &CacheKey) -> Option<V> {
        let rendered = key.to_string();
        let data = self.store.get(&rendered)?;
        match V::decode(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %rendered, error = %e, "dropping undecodable L1 entry");
                self.store.remove(&rendered);
                None
            }
        }
    }

    fn set(&self, key: CacheKey, value: V) {
        match value.encode() {
            Ok(data) => self.store.set(key.to_string(), data),
            Err(e) => {
                // Never leave an older value reachable under this key
                warn!(key = %key, error = %e, "record not cacheable in L1");
                self.store.remove(&key.to_string());
            }
        }
    }

    fn remove(&self, key: &CacheKey) -> bool {
        self.store.remove(&key.to_string())
    }

    fn flush(&self) {
        self.store.flush()
    }

    fn len(&self) -> usize {
        self.store.len()
    }

    fn capacity(&self) -> usize {
        self.store.capacity()
    }

    fn stats(&self) -> L1Stats {
        self.store.stats()
    }
}

// =============================================================================
// Tests
// =============================================================================

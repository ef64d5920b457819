//! L2 Cache - Shared Key/Value Store Adapter
//!
//! Thin translation layer over a network-accessible store holding encoded
//! records with a server-side TTL.
//!
//! # Failure Semantics
//!
//! Every operation runs under a deadline. A timeout or transport error on
//! `get` reads as "not found"; on `set`/`del` it is logged and swallowed.
//! Cache population and invalidation are best-effort relative to the origin.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Backing store trait
#[async_trait]
pub trait L2Store: Send + Sync {
    /// Fetch raw bytes for a key
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store bytes with a TTL
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Delete a key
    async fn del(&self, key: &str) -> Result<()>;

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;
}

/// L2 adapter statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct L2Stats {
    pub gets: u64,
    pub sets: u64,
    pub dels: u64,
    pub timeouts: u64,
    pub errors: u64,
}

#[derive(Debug, Default)]
struct L2Counters {
    gets: AtomicU64,
    sets: AtomicU64,
    dels: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
}

/// Deadline-bound, failure-swallowing adapter over an [`L2Store`]
#[derive(Clone)]
pub struct L2Cache {
    store: Arc<dyn L2Store>,
    timeout: Duration,
    counters: Arc<L2Counters>,
}

impl L2Cache {
    /// Wrap a store with a per-operation deadline
    pub fn new(store: Arc<dyn L2Store>, timeout: Duration) -> Self {
        Self {
            store,
            timeout,
            counters: Arc::new(L2Counters::default()),
        }
    }

    /// In-memory store (local mode and tests)
    pub fn in_memory(timeout: Duration) -> Self {
        Self::new(Arc::new(InMemoryL2Store::new()), timeout)
    }

    /// Fetch bytes; any failure reads as a miss
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.counters.gets.fetch_add(1, Ordering::Relaxed);
        match tokio::time::timeout(self.timeout, self.store.get(key)).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, backend = self.store.backend(), "L2 GET failed, treating as miss");
                None
            }
            Err(_) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, timeout_ms = self.timeout.as_millis() as u64, "L2 GET timed out, treating as miss");
                None
            }
        }
    }

    /// Store bytes; failures are logged and swallowed
    pub async fn set(&self, key: &str, value: Bytes, ttl: Duration) {
        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        let outcome = tokio::time::timeout(self.timeout, self.store.set(key, value, ttl)).await;
        self.swallow("SET", key, outcome);
    }

    /// Delete a key; failures are logged and swallowed
    pub async fn del(&self, key: &str) {
        self.counters.dels.fetch_add(1, Ordering::Relaxed);
        let outcome = tokio::time::timeout(self.timeout, self.store.del(key)).await;
        self.swallow("DEL", key, outcome);
    }

    fn swallow(
        &self,
        op: &'static str,
        key: &str,
        outcome: std::result::Result<Result<()>, tokio::time::error::Elapsed>,
    ) {
        match outcome {
            Ok(Ok(())) => debug!(key = %key, op, "L2 write applied"),
            Ok(Err(e)) => {
                self.counters.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, op, error = %e, backend = self.store.backend(), "L2 write failed, ignoring");
            }
            Err(_) => {
                self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, op, timeout_ms = self.timeout.as_millis() as u64, "L2 write timed out, ignoring");
            }
        }
    }

    /// Backend name
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Get adapter statistics
    pub fn stats(&self) -> L2Stats {
        L2Stats {
            gets: self.counters.gets.load(Ordering::Relaxed),
            sets: self.counters.sets.load(Ordering::Relaxed),
            dels: self.counters.dels.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            errors: self.counters.errors.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Injected behaviour for the in-memory store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Operations succeed
    #[default]
    Healthy,
    /// Every operation returns a transport error
    Unavailable,
    /// Every operation sleeps this long before completing
    Stalled(Duration),
}

/// In-memory L2 store with TTL and injectable failures.
/// Uses DashMap for lock-free concurrent access.
#[derive(Default)]
pub struct InMemoryL2Store {
    entries: DashMap<String, (Bytes, Instant)>,
    mode: RwLock<FailureMode>,
}

impl InMemoryL2Store {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch failure mode
    pub fn set_failure_mode(&self, mode: FailureMode) {
        *self.mode.write() = mode;
    }

    /// Write raw bytes, bypassing failure injection (test seeding)
    pub fn insert_raw(&self, key: &str, value: Bytes, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    /// Whether a live entry exists, bypassing failure injection
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.1 > Instant::now())
    }

    /// Number of stored entries (including not yet purged expired ones)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    async fn gate(&self) -> Result<()> {
        let mode = *self.mode.read();
        match mode {
            FailureMode::Healthy => Ok(()),
            FailureMode::Unavailable => {
                Err(Error::CacheTransport("in-memory L2 unavailable".to_string()))
            }
            FailureMode::Stalled(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl L2Store for InMemoryL2Store {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        self.gate().await?;
        let now = Instant::now();
        let found = self
            .entries
            .get(key)
            .map(|entry| (entry.0.clone(), entry.1 > now));
        match found {
            Some((data, true)) => Ok(Some(data)),
            Some((_, false)) => {
                self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.gate().await?;
        self.insert_raw(key, value, ttl);
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        self.gate().await?;
        self.entries.remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn adapter() -> (Arc<InMemoryL2Store>, L2Cache) {
        let store = Arc::new(InMemoryL2Store::new());
        let cache = L2Cache::new(store.clone(), Duration::from_millis(50));
        (store, cache)
    }

    #[tokio::test]
    async fn test_set_get_del() {
        let (_, l2) = adapter();
        l2.set("thread:1", Bytes::from_static(b"abc"), Duration::from_secs(60))
            .await;
        assert_eq!(l2.get("thread:1").await, Some(Bytes::from_static(b"abc")));

        l2.del("thread:1").await;
        assert_eq!(l2.get("thread:1").await, None);

        let stats = l2.stats();
        assert_eq!(stats.gets, 2);
        assert_eq!(stats.sets, 1);
        assert_eq!(stats.dels, 1);
        assert_eq!(stats.errors, 0);
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let (store, l2) = adapter();
        l2.set("tag:1", Bytes::from_static(b"x"), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(l2.get("tag:1").await, None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_transport_error_reads_as_miss() {
        let (store, l2) = adapter();
        store.insert_raw("user:1", Bytes::from_static(b"x"), Duration::from_secs(60));
        store.set_failure_mode(FailureMode::Unavailable);

        assert_eq!(l2.get("user:1").await, None);
        l2.set("user:2", Bytes::from_static(b"y"), Duration::from_secs(60))
            .await;
        l2.del("user:1").await;

        assert_eq!(l2.stats().errors, 3);
        // The failed DEL left the entry in place
        assert!(store.contains("user:1"));
        assert!(!store.contains("user:2"));
    }

    #[tokio::test]
    async fn test_stalled_store_times_out() {
        let (store, l2) = adapter();
        store.insert_raw("forum:1", Bytes::from_static(b"x"), Duration::from_secs(60));
        store.set_failure_mode(FailureMode::Stalled(Duration::from_millis(500)));

        let started = Instant::now();
        assert_eq!(l2.get("forum:1").await, None);
        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(l2.stats().timeouts, 1);
    }
}

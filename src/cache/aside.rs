//! Cache-Aside Orchestrator
//!
//! One instance per entity type. Reads go L1 → L2 → coalesced origin fetch
//! with backfill; writes invalidate both tiers after the origin mutation.
//!
//! Cache-tier failures never reach the caller: an L2 transport failure or an
//! undecodable payload is a miss, and the origin answers instead.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::coalescer::Coalescer;
use super::key::{CacheKey, EntityKind};
use super::l1::L1Tier;
use super::l2::L2Cache;
use super::metrics::{CacheMetrics, MetricsSnapshot};
use crate::codec::Codec;
use crate::error::Result;

/// A record that can live in the cache tiers
pub trait CachedRecord: Codec + Clone + Send + Sync + 'static {
    /// Entity type, selects the key prefix
    const ENTITY: EntityKind;

    /// Primary id at origin
    fn cache_id(&self) -> i64;

    /// Canonical cache key
    fn cache_key(&self) -> CacheKey {
        CacheKey::new(Self::ENTITY, self.cache_id())
    }
}

/// Per-entity cache-aside orchestrator
pub struct CacheAside<V> {
    l1: Arc<dyn L1Tier<V>>,
    l2: L2Cache,
    coalescer: Coalescer<Option<V>>,
    ttl: Duration,
    metrics: Arc<CacheMetrics>,
}

impl<V: CachedRecord> CacheAside<V> {
    /// Assemble an orchestrator from explicitly constructed tiers
    pub fn new(
        l1: Arc<dyn L1Tier<V>>,
        l2: L2Cache,
        ttl: Duration,
        metrics: Arc<CacheMetrics>,
    ) -> Self {
        Self {
            l1,
            l2,
            coalescer: Coalescer::new(),
            ttl,
            metrics,
        }
    }

    /// Read-through lookup.
    ///
    /// `fetch` runs at most once per key across concurrent callers that miss
    /// both tiers. `Ok(None)` (absent at origin) is returned without caching.
    pub async fn get_or_fetch<F, Fut>(&self, id: i64, fetch: F) -> Result<Option<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<V>>>,
    {
        let key = CacheKey::new(V::ENTITY, id);
        if let Some(found) = self.lookup(key).await {
            return Ok(Some(found));
        }

        let rendered = key.to_string();
        let mut led = false;
        let outcome = self
            .coalescer
            .run(&rendered, || {
                led = true;
                async {
                    self.metrics.record_origin_fetch();
                    match fetch().await {
                        Ok(Some(record)) => {
                            self.populate(key, &rendered, &record).await;
                            debug!(key = %key, "Origin fetch backfilled");
                            Ok(Some(record))
                        }
                        Ok(None) => {
                            debug!(key = %key, "Absent at origin");
                            Ok(None)
                        }
                        Err(e) => {
                            self.metrics.record_origin_error();
                            Err(e)
                        }
                    }
                }
            })
            .await;

        if !led {
            self.metrics.record_coalesced();
        }
        outcome
    }

    /// Cache-only lookup: L1, then L2 with L1 backfill
    pub async fn lookup(&self, key: CacheKey) -> Option<V> {
        if let Some(found) = self.l1.get(&key) {
            self.metrics.record_l1_hit();
            debug!(key = %key, "L1 hit");
            return Some(found);
        }
        self.metrics.record_l1_miss();

        let rendered = key.to_string();
        let decoded = match self.l2.get(&rendered).await {
            Some(bytes) => match V::decode(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    self.metrics.record_codec_error();
                    warn!(key = %key, error = %e, "Undecodable L2 payload, treating as miss");
                    None
                }
            },
            None => None,
        };

        match decoded {
            Some(record) => {
                self.metrics.record_l2_hit();
                debug!(key = %key, "L2 hit");
                self.l1.set(key, record.clone());
                Some(record)
            }
            None => {
                self.metrics.record_l2_miss();
                None
            }
        }
    }

    /// Write a freshly read record into both tiers
    pub async fn prime(&self, record: &V) {
        let key = record.cache_key();
        self.populate(key, &key.to_string(), record).await;
    }

    async fn populate(&self, key: CacheKey, rendered: &str, record: &V) {
        match record.encode() {
            Ok(bytes) => self.l2.set(rendered, bytes, self.ttl).await,
            Err(e) => warn!(key = %key, error = %e, "Record not encodable, skipping L2"),
        }
        self.l1.set(key, record.clone());
    }

    /// Drop the canonical key from L1, then from L2.
    ///
    /// Returns once the L2 delete completed or hit its deadline.
    pub async fn invalidate(&self, id: i64) {
        let key = CacheKey::new(V::ENTITY, id);
        self.l1.remove(&key);
        self.l2.del(&key.to_string()).await;
        self.metrics.record_invalidation();
        debug!(key = %key, "Invalidated");
    }

    /// Clear the entire L1 tier for this entity
    pub fn flush(&self) {
        let dropped = self.l1.len();
        self.l1.flush();
        self.metrics.record_flush();
        let entity = V::ENTITY;
        info!(entity = %entity, dropped, "L1 flushed");
    }

    /// Counters plus tier occupancy
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut snapshot = self.metrics.snapshot();
        let l2 = self.l2.stats();
        snapshot.l1_entries = self.l1.len() as u64;
        snapshot.l2_transport_errors = l2.errors + l2.timeouts;
        snapshot
    }

    pub fn l1(&self) -> &dyn L1Tier<V> {
        self.l1.as_ref()
    }

    pub fn l2(&self) -> &L2Cache {
        &self.l2
    }

    pub fn coalescer(&self) -> &Coalescer<Option<V>> {
        &self.coalescer
    }

    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }
}

// =============================================================================
// Tests
// =============================================================================

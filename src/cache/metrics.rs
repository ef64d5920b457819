//! Cache Metrics Collection
//!
//! Per-entity counters for the cache-aside read and write paths, plus a
//! Prometheus export for the admin endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use prometheus::{IntGaugeVec, Opts, Registry};
use serde::Serialize;

use super::key::EntityKind;
use super::l1::hit_ratio;

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    // L1
    l1_hits: AtomicU64,
    l1_misses: AtomicU64,

    // L2
    l2_hits: AtomicU64,
    l2_misses: AtomicU64,
    codec_errors: AtomicU64,

    // Origin
    origin_fetches: AtomicU64,
    origin_errors: AtomicU64,
    coalesced: AtomicU64,

    // Write path
    invalidations: AtomicU64,
    flushes: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_l1_hit(&self) {
        self.l1_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l1_miss(&self) {
        self.l1_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_hit(&self) {
        self.l2_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_l2_miss(&self) {
        self.l2_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_codec_error(&self) {
        self.codec_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_origin_fetch(&self) {
        self.origin_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_origin_error(&self) {
        self.origin_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// A caller was served by another caller's origin fetch
    pub fn record_coalesced(&self) {
        self.coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        let l1_hits = self.l1_hits.load(Ordering::Relaxed);
        let l1_misses = self.l1_misses.load(Ordering::Relaxed);
        let l2_hits = self.l2_hits.load(Ordering::Relaxed);
        let l2_misses = self.l2_misses.load(Ordering::Relaxed);

        MetricsSnapshot {
            l1_hits,
            l1_misses,
            l1_hit_ratio: hit_ratio(l1_hits, l1_misses),
            l1_entries: 0,
            l2_hits,
            l2_misses,
            l2_hit_ratio: hit_ratio(l2_hits, l2_misses),
            l2_transport_errors: 0,
            codec_errors: self.codec_errors.load(Ordering::Relaxed),
            origin_fetches: self.origin_fetches.load(Ordering::Relaxed),
            origin_errors: self.origin_errors.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        for counter in [
            &self.l1_hits,
            &self.l1_misses,
            &self.l2_hits,
            &self.l2_misses,
            &self.codec_errors,
            &self.origin_fetches,
            &self.origin_errors,
            &self.coalesced,
            &self.invalidations,
            &self.flushes,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Plain copy of an orchestrator's counters.
///
/// `l1_entries` and `l2_transport_errors` are filled in by the orchestrator
/// from its tiers; [`CacheMetrics::snapshot`] leaves them at zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub l1_hits: u64,
    pub l1_misses: u64,
    pub l1_hit_ratio: f64,
    pub l1_entries: u64,
    pub l2_hits: u64,
    pub l2_misses: u64,
    pub l2_hit_ratio: f64,
    pub l2_transport_errors: u64,
    pub codec_errors: u64,
    pub origin_fetches: u64,
    pub origin_errors: u64,
    pub coalesced: u64,
    pub invalidations: u64,
    pub flushes: u64,
}

impl MetricsSnapshot {
    fn counters(&self) -> [(&'static str, u64); 12] {
        [
            ("l1_hits", self.l1_hits),
            ("l1_misses", self.l1_misses),
            ("l1_entries", self.l1_entries),
            ("l2_hits", self.l2_hits),
            ("l2_misses", self.l2_misses),
            ("l2_transport_errors", self.l2_transport_errors),
            ("codec_errors", self.codec_errors),
            ("origin_fetches", self.origin_fetches),
            ("origin_errors", self.origin_errors),
            ("coalesced", self.coalesced),
            ("invalidations", self.invalidations),
            ("flushes", self.flushes),
        ]
    }
}

// =============================================================================
// Prometheus Export
// =============================================================================

/// Registry served on `/metrics`
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static CACHE_GAUGES: Lazy<Option<IntGaugeVec>> = Lazy::new(|| {
    let gauges = IntGaugeVec::new(
        Opts::new("cache", "Cache-aside counters by entity").namespace("boardcache"),
        &["entity", "counter"],
    )
    .ok()?;
    REGISTRY.register(Box::new(gauges.clone())).ok()?;
    Some(gauges)
});

/// Publish a snapshot into the Prometheus registry
pub fn export(entity: EntityKind, snapshot: &MetricsSnapshot) {
    let Some(gauges) = CACHE_GAUGES.as_ref() else {
        return;
    };
    for (name, value) in snapshot.counters() {
        gauges
            .with_label_values(&[entity.prefix(), name])
            .set(value as i64);
    }
}

/// Render the registry in Prometheus text format
pub fn render() -> String {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_ratios() {
        let metrics = CacheMetrics::new();
        metrics.record_l1_hit();
        metrics.record_l1_hit();
        metrics.record_l1_hit();
        metrics.record_l1_miss();
        metrics.record_l2_miss();
        metrics.record_origin_fetch();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.l1_hits, 3);
        assert!((snapshot.l1_hit_ratio - 0.75).abs() < 1e-9);
        assert_eq!(snapshot.l2_hit_ratio, 0.0);
        assert_eq!(snapshot.origin_fetches, 1);
    }

    #[test]
    fn test_reset() {
        let metrics = CacheMetrics::new();
        metrics.record_invalidation();
        metrics.record_flush();
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_export_renders_labelled_gauges() {
        let snapshot = MetricsSnapshot {
            origin_fetches: 17,
            ..Default::default()
        };
        export(EntityKind::Tag, &snapshot);

        let text = render();
        assert!(text.contains("boardcache_cache"));
        assert!(text.lines().any(|line| {
            line.contains(r#"counter="origin_fetches""#)
                && line.contains(r#"entity="tag""#)
                && line.ends_with(" 17")
        }));
    }
}

//! Multi-Tier Read-Through Cache
//!
//! Sits between every domain service and its origin repository.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                 CacheAside<V> (one per entity type)                  │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  L1 (process-local)     │  L2 (shared, TTL)     │  Origin            │
//! │  ┌──────────────────┐   │  ┌────────────────┐   │  ┌──────────────┐  │
//! │  │ BoundedCache     │   │  │ L2Cache        │   │  │ Coalescer    │  │
//! │  │  (thread, forum) │   │  │  + deadline    │   │  │  (1 fetch    │  │
//! │  │ EncodedL1        │   │  │ Redis / memory │   │  │   per key)   │  │
//! │  │  (tag, user)     │   │  │ encoded bytes  │   │  │ Repository   │  │
//! │  └──────────────────┘   │  └────────────────┘   │  └──────────────┘  │
//! │          ▲              │          ▲            │         │          │
//! │          └──────────────┴──────────┴────────────┴─────────┘          │
//! │                          backfill on miss                            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - At most one origin fetch in flight per key within a process
//! - L1 never holds more entries than its configured capacity
//! - Writes invalidate L1 and L2 before returning
//! - L2 and codec failures degrade to a miss
//!
//! L1 invalidation is not broadcast to other processes; their L1 entries
//! stay live until flushed or overwritten.

mod aside;
mod byte_store;
mod coalescer;
mod key;
mod l1;
mod l2;
pub mod metrics;
mod redis_store;
mod shard;

pub use aside::{CacheAside, CachedRecord};
pub use byte_store::{ByteCache, EncodedL1};
pub use coalescer::Coalescer;
pub use key::{CacheKey, EntityKind};
pub use l1::{BoundedCache, L1Stats, L1Tier};
pub use l2::{FailureMode, InMemoryL2Store, L2Cache, L2Stats, L2Store};
pub use metrics::{CacheMetrics, MetricsSnapshot};
pub use redis_store::RedisL2Store;
pub use shard::{ShardedMap, Weighted};

use std::time::Duration;

/// Default L1 capacity (entries per entity type)
pub const DEFAULT_L1_CAPACITY: usize = 10_000;

/// Default L2 TTL
pub const DEFAULT_L2_TTL: Duration = Duration::from_secs(3600);

/// Default deadline for one L2 operation
pub const DEFAULT_L2_TIMEOUT: Duration = Duration::from_millis(200);

/// Default shard count for byte-oriented L1 stores
pub const DEFAULT_BYTE_SHARDS: usize = 16;

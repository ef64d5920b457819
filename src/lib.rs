//! Boardcache - Forum Content Backend Core
//!
//! Domain services for forum threads, forums, tags and users, fronted by a
//! multi-tier read-through cache.
//!
//! # Architecture
//!
//! ```text
//! Services (thread/forum/tag/user)
//!     │
//!     ▼
//! CacheAside ── L1 (bounded, in-process) ── L2 (shared, TTL) ── Coalescer
//!     │
//!     ▼
//! Repositories (origin)
//! ```
//!
//! # Modules
//!
//! - [`cache`] - L1/L2 tiers, request coalescing, cache-aside orchestration
//! - [`codec`] - Binary record encoding for the cache tiers
//! - [`config`] - YAML configuration
//! - [`error`] - Error types
//! - [`model`] - Origin rows and cached record projections
//! - [`repository`] - Origin repository traits and in-memory implementations
//! - [`service`] - Per-entity services and their wiring

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod repository;
pub mod service;

// Re-export commonly used types
pub use cache::{CacheAside, CacheKey, Coalescer, EntityKind};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use service::{Services, ServicesBuilder};

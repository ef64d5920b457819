//! Entity Services
//!
//! The facade request handlers call. Each service owns one cache-aside
//! orchestrator and one origin repository; handlers never see the tiers.
//!
//! All orchestrators are built explicitly by [`ServicesBuilder`], so tests
//! and shards get isolated cache instances.

mod forum;
mod tag;
mod thread;
mod user;

pub use forum::ForumService;
pub use tag::TagService;
pub use thread::ThreadService;
pub use user::{NewUser, UserService};

use std::sync::Arc;

use tracing::info;

use crate::cache::{
    metrics, BoundedCache, ByteCache, CacheAside, CacheKey, CacheMetrics, CachedRecord,
    EncodedL1, EntityKind, InMemoryL2Store, L1Tier, L2Cache, L2Store, MetricsSnapshot,
};
use crate::config::CacheSettings;
use crate::error::{Error, Result};
use crate::model::{ForumRecord, TagRecord, ThreadRecord, UserRecord};
use crate::repository::{
    ForumRepository, MemoryForumRepository, MemoryTagRepository, MemoryThreadRepository,
    MemoryUserRepository, TagRepository, ThreadRepository, UserRepository,
};

/// Largest accepted page size
pub const MAX_PAGE_SIZE: usize = 100;

/// Longest accepted forum or tag name, in characters
pub const MAX_NAME_CHARS: usize = 50;

// =============================================================================
// Validation
// =============================================================================

pub(crate) fn validate_id(field: &str, id: i64) -> Result<()> {
    if id <= 0 {
        return Err(Error::Validation(format!("{} must be positive, got {}", field, id)));
    }
    Ok(())
}

pub(crate) fn validate_text(field: &str, value: &str, max_chars: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{} must not be empty", field)));
    }
    if value.chars().count() > max_chars {
        return Err(Error::Validation(format!(
            "{} must be at most {} characters",
            field, max_chars
        )));
    }
    Ok(())
}

/// Convert 1-based paging to `(offset, limit)`
pub(crate) fn paging(page: usize, page_size: usize) -> Result<(usize, usize)> {
    if page < 1 {
        return Err(Error::Validation("page must be >= 1".into()));
    }
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(Error::Validation(format!(
            "page_size must be between 1 and {}",
            MAX_PAGE_SIZE
        )));
    }
    let offset = (page - 1)
        .checked_mul(page_size)
        .ok_or_else(|| Error::Validation("page out of range".into()))?;
    Ok((offset, page_size))
}

/// Map a mutator's "row existed" flag to a not-found error
pub(crate) fn require_found(found: bool, entity: &'static str, id: i64) -> Result<()> {
    if found {
        Ok(())
    } else {
        Err(Error::not_found(entity, id))
    }
}

// =============================================================================
// Services
// =============================================================================

/// All entity services of one process
#[derive(Clone)]
pub struct Services {
    pub threads: Arc<ThreadService>,
    pub forums: Arc<ForumService>,
    pub tags: Arc<TagService>,
    pub users: Arc<UserService>,
}

impl Services {
    /// Start building services over the given cache settings
    pub fn builder(settings: CacheSettings) -> ServicesBuilder {
        ServicesBuilder::new(settings)
    }

    /// Clear every entity's L1 tier
    pub fn flush_all(&self) {
        self.threads.flush_cache();
        self.forums.flush_cache();
        self.tags.flush_cache();
        self.users.flush_cache();
        info!("All L1 tiers flushed");
    }

    /// Per-entity cache counters
    pub fn snapshots(&self) -> Vec<(EntityKind, MetricsSnapshot)> {
        vec![
            (EntityKind::Thread, self.threads.cache().snapshot()),
            (EntityKind::Forum, self.forums.cache().snapshot()),
            (EntityKind::Tag, self.tags.cache().snapshot()),
            (EntityKind::User, self.users.cache().snapshot()),
        ]
    }

    /// Publish current counters to the Prometheus registry
    pub fn export_metrics(&self) {
        for (entity, snapshot) in self.snapshots() {
            metrics::export(entity, &snapshot);
        }
    }
}

/// Wires repositories and cache tiers into [`Services`].
///
/// Anything not supplied falls back to an in-memory implementation.
pub struct ServicesBuilder {
    settings: CacheSettings,
    l2_store: Option<Arc<dyn L2Store>>,
    thread_repo: Option<Arc<dyn ThreadRepository>>,
    forum_repo: Option<Arc<dyn ForumRepository>>,
    tag_repo: Option<Arc<dyn TagRepository>>,
    user_repo: Option<Arc<dyn UserRepository>>,
}

impl ServicesBuilder {
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings,
            l2_store: None,
            thread_repo: None,
            forum_repo: None,
            tag_repo: None,
            user_repo: None,
        }
    }

    pub fn l2_store(mut self, store: Arc<dyn L2Store>) -> Self {
        self.l2_store = Some(store);
        self
    }

    pub fn thread_repository(mut self, repo: Arc<dyn ThreadRepository>) -> Self {
        self.thread_repo = Some(repo);
        self
    }

    pub fn forum_repository(mut self, repo: Arc<dyn ForumRepository>) -> Self {
        self.forum_repo = Some(repo);
        self
    }

    pub fn tag_repository(mut self, repo: Arc<dyn TagRepository>) -> Self {
        self.tag_repo = Some(repo);
        self
    }

    pub fn user_repository(mut self, repo: Arc<dyn UserRepository>) -> Self {
        self.user_repo = Some(repo);
        self
    }

    fn aside<V: CachedRecord>(
        &self,
        store: &Arc<dyn L2Store>,
        l1: Arc<dyn L1Tier<V>>,
    ) -> CacheAside<V> {
        CacheAside::new(
            l1,
            L2Cache::new(store.clone(), self.settings.l2_timeout()),
            self.settings.l2_ttl(),
            Arc::new(CacheMetrics::new()),
        )
    }

    fn byte_tier<V: CachedRecord>(&self) -> Arc<dyn L1Tier<V>> {
        Arc::new(EncodedL1::new(ByteCache::with_shards(
            self.settings.l1_capacity,
            Some(self.settings.l2_ttl()),
            self.settings.byte_shards,
        )))
    }

    pub fn build(self) -> Services {
        let store = self
            .l2_store
            .clone()
            .unwrap_or_else(|| Arc::new(InMemoryL2Store::new()));
        let capacity = self.settings.l1_capacity;

        let threads = ThreadService::new(
            self.thread_repo
                .clone()
                .unwrap_or_else(|| Arc::new(MemoryThreadRepository::new())),
            self.aside(
                &store,
                Arc::new(BoundedCache::<CacheKey, ThreadRecord>::new(capacity)),
            ),
        );
        let forums = ForumService::new(
            self.forum_repo
                .clone()
                .unwrap_or_else(|| Arc::new(MemoryForumRepository::new())),
            self.aside(
                &store,
                Arc::new(BoundedCache::<CacheKey, ForumRecord>::new(capacity)),
            ),
        );
        let tags = TagService::new(
            self.tag_repo
                .clone()
                .unwrap_or_else(|| Arc::new(MemoryTagRepository::new())),
            self.aside(&store, self.byte_tier::<TagRecord>()),
        );
        let users = UserService::new(
            self.user_repo
                .clone()
                .unwrap_or_else(|| Arc::new(MemoryUserRepository::new())),
            self.aside(&store, self.byte_tier::<UserRecord>()),
        );

        info!(
            l1_capacity = capacity,
            l2_ttl_secs = self.settings.l2_ttl_secs,
            l2_backend = store.backend(),
            "Services built"
        );

        Services {
            threads: Arc::new(threads),
            forums: Arc::new(forums),
            tags: Arc::new(tags),
            users: Arc::new(users),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Cache Keys
//!
//! A key is an entity prefix plus the entity's primary id. The rendered form
//! (`thread:42`) is what L2 and the coalescer see; L1 tiers may key on the
//! structured value directly.

use std::fmt;

/// Cacheable entity types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Thread,
    Forum,
    Tag,
    User,
}

impl EntityKind {
    /// Key prefix
    pub const fn prefix(self) -> &'static str {
        match self {
            EntityKind::Thread => "thread",
            EntityKind::Forum => "forum",
            EntityKind::Tag => "tag",
            EntityKind::User => "user",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Canonical cache key for one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    entity: EntityKind,
    id: i64,
}

impl CacheKey {
    /// Create a new cache key
    pub const fn new(entity: EntityKind, id: i64) -> Self {
        Self { entity, id }
    }

    pub const fn thread(tid: i64) -> Self {
        Self::new(EntityKind::Thread, tid)
    }

    pub const fn forum(fid: i32) -> Self {
        Self::new(EntityKind::Forum, fid as i64)
    }

    pub const fn tag(tag_id: i32) -> Self {
        Self::new(EntityKind::Tag, tag_id as i64)
    }

    pub const fn user(uid: i64) -> Self {
        Self::new(EntityKind::User, uid)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity.prefix(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rendering() {
        assert_eq!(CacheKey::thread(42).to_string(), "thread:42");
        assert_eq!(CacheKey::forum(3).to_string(), "forum:3");
        assert_eq!(CacheKey::tag(9).to_string(), "tag:9");
        assert_eq!(CacheKey::user(-1).to_string(), "user:-1");
    }

    #[test]
    fn test_identical_logical_keys_render_identically() {
        let a = CacheKey::new(EntityKind::Forum, 12);
        let b = CacheKey::forum(12);
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
        assert_ne!(CacheKey::forum(12).to_string(), CacheKey::tag(12).to_string());
    }
}

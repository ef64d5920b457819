//! Origin Repositories
//!
//! The authoritative store behind the cache tiers. Services talk to these
//! traits only; the cache never reimplements persistence.
//!
//! Mutators return `Ok(false)` when the targeted row does not exist.

pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{
    ForumCounter, ForumRow, TagCounter, TagRow, ThreadCounter, ThreadRow, UserRow,
};

pub use memory::{
    MemoryForumRepository, MemoryTagRepository, MemoryThreadRepository, MemoryUserRepository,
    Probe,
};

/// Thread origin
#[async_trait]
pub trait ThreadRepository: Send + Sync {
    async fn get_by_id(&self, tid: i64) -> Result<Option<ThreadRow>>;

    async fn get_all(&self) -> Result<Vec<ThreadRow>>;

    /// Threads of one forum, most recent activity first
    async fn list_by_forum(&self, fid: i32, offset: usize, limit: usize) -> Result<Vec<ThreadRow>>;

    /// Insert a row; a zero `tid` is assigned by the store
    async fn create(&self, row: ThreadRow) -> Result<i64>;

    async fn update(&self, row: &ThreadRow) -> Result<bool>;

    async fn delete(&self, tid: i64) -> Result<bool>;

    async fn increment_counter(&self, tid: i64, counter: ThreadCounter, delta: i32)
        -> Result<bool>;
}

/// Forum origin
#[async_trait]
pub trait ForumRepository: Send + Sync {
    async fn get_by_id(&self, fid: i32) -> Result<Option<ForumRow>>;

    /// All forums by display order
    async fn get_all(&self) -> Result<Vec<ForumRow>>;

    async fn get_by_parent(&self, parent: i32) -> Result<Vec<ForumRow>>;

    async fn create(&self, row: ForumRow) -> Result<i32>;

    async fn update(&self, row: &ForumRow) -> Result<bool>;

    async fn delete(&self, fid: i32) -> Result<bool>;

    async fn increment_counter(&self, fid: i32, counter: ForumCounter, delta: i32)
        -> Result<bool>;
}

/// Tag origin, including the thread/tag link table
#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn get_by_id(&self, tag_id: i32) -> Result<Option<TagRow>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<TagRow>>;

    /// All tags, most used first
    async fn get_all(&self) -> Result<Vec<TagRow>>;

    /// Top tags by thread count, then views
    async fn get_hot(&self, limit: usize) -> Result<Vec<TagRow>>;

    async fn get_by_thread(&self, tid: i64) -> Result<Vec<TagRow>>;

    async fn create(&self, row: TagRow) -> Result<i32>;

    async fn update(&self, row: &TagRow) -> Result<bool>;

    /// Delete a tag and its thread links
    async fn delete(&self, tag_id: i32) -> Result<bool>;

    async fn increment_counter(&self, tag_id: i32, counter: TagCounter, delta: i32)
        -> Result<bool>;

    /// Link a tag to a thread; `false` if already linked
    async fn attach_to_thread(&self, tid: i64, tag_id: i32) -> Result<bool>;

    /// Unlink a tag from a thread; `false` if not linked
    async fn detach_from_thread(&self, tid: i64, tag_id: i32) -> Result<bool>;
}

/// User origin
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_by_id(&self, uid: i64) -> Result<Option<UserRow>>;

    /// Rows for the given ids, absent ids skipped
    async fn get_by_ids(&self, uids: &[i64]) -> Result<Vec<UserRow>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<UserRow>>;

    /// All users by id
    async fn get_all(&self) -> Result<Vec<UserRow>>;

    async fn create(&self, row: UserRow) -> Result<i64>;

    async fn update(&self, row: &UserRow) -> Result<bool>;

    async fn delete(&self, uid: i64) -> Result<bool>;

    async fn touch_lastvisit(&self, uid: i64, timestamp: i64) -> Result<bool>;
}

//! In-Memory Repositories
//!
//! DashMap-backed origin stores for local mode and tests. Each repository
//! carries a [`Probe`] that counts calls per operation and can inject
//! latency or failures.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;

use super::{ForumRepository, TagRepository, ThreadRepository, UserRepository};
use crate::error::{Error, Result};
use crate::model::{
    unix_now, ForumCounter, ForumRow, TagCounter, TagRow, ThreadCounter, ThreadRow, UserRow,
};

// =============================================================================
// Probe
// =============================================================================

/// Call counting and fault injection
#[derive(Debug, Default)]
pub struct Probe {
    calls: DashMap<&'static str, u64>,
    latency: RwLock<Option<Duration>>,
    failing: AtomicBool,
}

impl Probe {
    /// Calls recorded for one operation
    pub fn calls(&self, op: &str) -> u64 {
        self.calls.get(op).map(|count| *count).unwrap_or(0)
    }

    /// Calls recorded across all operations
    pub fn total_calls(&self) -> u64 {
        self.calls.iter().map(|entry| *entry.value()).sum()
    }

    pub fn reset_calls(&self) {
        self.calls.clear();
    }

    /// Delay every operation by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Make every operation fail with an origin error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    async fn enter(&self, op: &'static str) -> Result<()> {
        *self.calls.entry(op).or_insert(0) += 1;

        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Origin(format!("injected failure in {}", op)));
        }
        Ok(())
    }
}

fn page<T>(rows: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    rows.into_iter().skip(offset).take(limit).collect()
}

// =============================================================================
// Threads
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryThreadRepository {
    rows: DashMap<i64, ThreadRow>,
    next_id: AtomicI64,
    probe: Probe,
}

impl MemoryThreadRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }
}

#[async_trait]
impl ThreadRepository for MemoryThreadRepository {
    async fn get_by_id(&self, tid: i64) -> Result<Option<ThreadRow>> {
        self.probe.enter("get_by_id").await?;
        Ok(self.rows.get(&tid).map(|row| row.value().clone()))
    }

    async fn get_all(&self) -> Result<Vec<ThreadRow>> {
        self.probe.enter("get_all").await?;
        let mut rows: Vec<ThreadRow> = self.rows.iter().map(|row| row.value().clone()).collect();
        rows.sort_by_key(|row| row.tid);
        Ok(rows)
    }

    async fn list_by_forum(&self, fid: i32, offset: usize, limit: usize) -> Result<Vec<ThreadRow>> {
        self.probe.enter("list_by_forum").await?;
        let mut rows: Vec<ThreadRow> = self
            .rows
            .iter()
            .filter(|row| row.fid == fid)
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by(|a, b| b.lastpost.cmp(&a.lastpost).then(b.tid.cmp(&a.tid)));
        Ok(page(rows, offset, limit))
    }

    async fn create(&self, mut row: ThreadRow) -> Result<i64> {
        self.probe.enter("create").await?;
        if row.tid == 0 {
            row.tid = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        } else {
            self.next_id.fetch_max(row.tid, Ordering::SeqCst);
        }
        let tid = row.tid;
        self.rows.insert(tid, row);
        Ok(tid)
    }

    async fn update(&self, row: &ThreadRow) -> Result<bool> {
        self.probe.enter("update").await?;
        match self.rows.get_mut(&row.tid) {
            Some(mut stored) => {
                *stored = ThreadRow {
                    updated_at: Utc::now(),
                    ..row.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, tid: i64) -> Result<bool> {
        self.probe.enter("delete").await?;
        Ok(self.rows.remove(&tid).is_some())
    }

    async fn increment_counter(
        &self,
        tid: i64,
        counter: ThreadCounter,
        delta: i32,
    ) -> Result<bool> {
        self.probe.enter("increment_counter").await?;
        let Some(mut row) = self.rows.get_mut(&tid) else {
            return Ok(false);
        };
        match counter {
            ThreadCounter::Views => row.views = row.views.saturating_add(delta),
            ThreadCounter::Replies => {
                row.replies = row.replies.saturating_add(delta);
                row.lastpost = unix_now();
            }
        }
        row.updated_at = Utc::now();
        Ok(true)
    }
}

// =============================================================================
// Forums
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryForumRepository {
    rows: DashMap<i32, ForumRow>,
    next_id: AtomicI32,
    probe: Probe,
}

impl MemoryForumRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    fn sorted(&self, filter: impl Fn(&ForumRow) -> bool) -> Vec<ForumRow> {
        let mut rows: Vec<ForumRow> = self
            .rows
            .iter()
            .filter(|row| filter(row.value()))
            .map(|row| row.value().clone())
            .collect();
        rows.sort_by_key(|row| (row.display_order, row.fid));
        rows
    }
}

#[async_trait]
impl ForumRepository for MemoryForumRepository {
    async fn get_by_id(&self, fid: i32) -> Result<Option<ForumRow>> {
        self.probe.enter("get_by_id").await?;
        Ok(self.rows.get(&fid).map(|row| row.value().clone()))
    }

    async fn get_all(&self) -> Result<Vec<ForumRow>> {
        self.probe.enter("get_all").await?;
        Ok(self.sorted(|_| true))
    }

    async fn get_by_parent(&self, parent: i32) -> Result<Vec<ForumRow>> {
        self.probe.enter("get_by_parent").await?;
        Ok(self.sorted(|row| row.parent == parent))
    }

    async fn create(&self, mut row: ForumRow) -> Result<i32> {
        self.probe.enter("create").await?;
        if row.fid == 0 {
            row.fid = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        } else {
            self.next_id.fetch_max(row.fid, Ordering::SeqCst);
        }
        let fid = row.fid;
        self.rows.insert(fid, row);
        Ok(fid)
    }

    async fn update(&self, row: &ForumRow) -> Result<bool> {
        self.probe.enter("update").await?;
        match self.rows.get_mut(&row.fid) {
            Some(mut stored) => {
                *stored = ForumRow {
                    updated_at: Utc::now(),
                    ..row.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, fid: i32) -> Result<bool> {
        self.probe.enter("delete").await?;
        Ok(self.rows.remove(&fid).is_some())
    }

    async fn increment_counter(
        &self,
        fid: i32,
        counter: ForumCounter,
        delta: i32,
    ) -> Result<bool> {
        self.probe.enter("increment_counter").await?;
        let Some(mut row) = self.rows.get_mut(&fid) else {
            return Ok(false);
        };
        let field = match counter {
            ForumCounter::Threads => &mut row.threads,
            ForumCounter::Today => &mut row.today,
            ForumCounter::Posts => &mut row.posts,
        };
        *field = field.saturating_add(delta);
        row.updated_at = Utc::now();
        Ok(true)
    }
}

// =============================================================================
// Tags
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryTagRepository {
    rows: DashMap<i32, TagRow>,
    /// tid -> linked tag ids
    links: DashMap<i64, Vec<i32>>,
    next_id: AtomicI32,
    probe: Probe,
}

impl MemoryTagRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }

    fn by_popularity(mut rows: Vec<TagRow>) -> Vec<TagRow> {
        rows.sort_by(|a, b| {
            b.threads
                .cmp(&a.threads)
                .then(b.views.cmp(&a.views))
                .then(a.tag_id.cmp(&b.tag_id))
        });
        rows
    }
}

#[async_trait]
impl TagRepository for MemoryTagRepository {
    async fn get_by_id(&self, tag_id: i32) -> Result<Option<TagRow>> {
        self.probe.enter("get_by_id").await?;
        Ok(self.rows.get(&tag_id).map(|row| row.value().clone()))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<TagRow>> {
        self.probe.enter("get_by_name").await?;
        Ok(self
            .rows
            .iter()
            .find(|row| row.name == name)
            .map(|row| row.value().clone()))
    }

    async fn get_all(&self) -> Result<Vec<TagRow>> {
        self.probe.enter("get_all").await?;
        Ok(Self::by_popularity(
            self.rows.iter().map(|row| row.value().clone()).collect(),
        ))
    }

    async fn get_hot(&self, limit: usize) -> Result<Vec<TagRow>> {
        self.probe.enter("get_hot").await?;
        let rows = Self::by_popularity(self.rows.iter().map(|row| row.value().clone()).collect());
        Ok(page(rows, 0, limit))
    }

    async fn get_by_thread(&self, tid: i64) -> Result<Vec<TagRow>> {
        self.probe.enter("get_by_thread").await?;
        let tag_ids = self
            .links
            .get(&tid)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        let rows = tag_ids
            .iter()
            .filter_map(|tag_id| self.rows.get(tag_id).map(|row| row.value().clone()))
            .collect();
        Ok(Self::by_popularity(rows))
    }

    async fn create(&self, mut row: TagRow) -> Result<i32> {
        self.probe.enter("create").await?;
        if row.tag_id == 0 {
            row.tag_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        } else {
            self.next_id.fetch_max(row.tag_id, Ordering::SeqCst);
        }
        let tag_id = row.tag_id;
        self.rows.insert(tag_id, row);
        Ok(tag_id)
    }

    async fn update(&self, row: &TagRow) -> Result<bool> {
        self.probe.enter("update").await?;
        match self.rows.get_mut(&row.tag_id) {
            Some(mut stored) => {
                *stored = TagRow {
                    updated_at: Utc::now(),
                    ..row.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, tag_id: i32) -> Result<bool> {
        self.probe.enter("delete").await?;
        let removed = self.rows.remove(&tag_id).is_some();
        if removed {
            self.links
                .iter_mut()
                .for_each(|mut ids| ids.retain(|id| *id != tag_id));
        }
        Ok(removed)
    }

    async fn increment_counter(
        &self,
        tag_id: i32,
        counter: TagCounter,
        delta: i32,
    ) -> Result<bool> {
        self.probe.enter("increment_counter").await?;
        let Some(mut row) = self.rows.get_mut(&tag_id) else {
            return Ok(false);
        };
        match counter {
            TagCounter::Threads => row.threads = row.threads.saturating_add(delta).max(0),
            TagCounter::Views => row.views = row.views.saturating_add(delta),
        }
        row.updated_at = Utc::now();
        Ok(true)
    }

    async fn attach_to_thread(&self, tid: i64, tag_id: i32) -> Result<bool> {
        self.probe.enter("attach_to_thread").await?;
        let mut ids = self.links.entry(tid).or_default();
        if ids.contains(&tag_id) {
            return Ok(false);
        }
        ids.push(tag_id);
        Ok(true)
    }

    async fn detach_from_thread(&self, tid: i64, tag_id: i32) -> Result<bool> {
        self.probe.enter("detach_from_thread").await?;
        let Some(mut ids) = self.links.get_mut(&tid) else {
            return Ok(false);
        };
        let before = ids.len();
        ids.retain(|id| *id != tag_id);
        Ok(ids.len() != before)
    }
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    rows: DashMap<i64, UserRow>,
    next_id: AtomicI64,
    probe: Probe,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> &Probe {
        &self.probe
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn get_by_id(&self, uid: i64) -> Result<Option<UserRow>> {
        self.probe.enter("get_by_id").await?;
        Ok(self.rows.get(&uid).map(|row| row.value().clone()))
    }

    async fn get_by_ids(&self, uids: &[i64]) -> Result<Vec<UserRow>> {
        self.probe.enter("get_by_ids").await?;
        Ok(uids
            .iter()
            .filter_map(|uid| self.rows.get(uid).map(|row| row.value().clone()))
            .collect())
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.probe.enter("get_by_username").await?;
        Ok(self
            .rows
            .iter()
            .find(|row| row.username == username)
            .map(|row| row.value().clone()))
    }

    async fn get_all(&self) -> Result<Vec<UserRow>> {
        self.probe.enter("get_all").await?;
        let mut rows: Vec<UserRow> = self.rows.iter().map(|row| row.value().clone()).collect();
        rows.sort_by_key(|row| row.uid);
        Ok(rows)
    }

    async fn create(&self, mut row: UserRow) -> Result<i64> {
        self.probe.enter("create").await?;
        if row.uid == 0 {
            row.uid = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        } else {
            self.next_id.fetch_max(row.uid, Ordering::SeqCst);
        }
        let uid = row.uid;
        self.rows.insert(uid, row);
        Ok(uid)
    }

    async fn update(&self, row: &UserRow) -> Result<bool> {
        self.probe.enter("update").await?;
        match self.rows.get_mut(&row.uid) {
            Some(mut stored) => {
                *stored = UserRow {
                    updated_at: Utc::now(),
                    ..row.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, uid: i64) -> Result<bool> {
        self.probe.enter("delete").await?;
        Ok(self.rows.remove(&uid).is_some())
    }

    async fn touch_lastvisit(&self, uid: i64, timestamp: i64) -> Result<bool> {
        self.probe.enter("touch_lastvisit").await?;
        let Some(mut row) = self.rows.get_mut(&uid) else {
            return Ok(false);
        };
        row.lastvisit = timestamp;
        Ok(true)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn thread_row(fid: i32, lastpost: i64) -> ThreadRow {
        let now = Utc::now();
        ThreadRow {
            tid: 0,
            fid,
            uid: 1,
            subject: format!("posted at {}", lastpost),
            views: 0,
            replies: 0,
            dateline: lastpost,
            lastpost,
            status: 0,
            message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn tag_row(name: &str, threads: i32, views: i32) -> TagRow {
        let now = Utc::now();
        TagRow {
            tag_id: 0,
            name: name.to_string(),
            slug: name.to_lowercase(),
            threads,
            views,
            status: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_ids_are_assigned_monotonically() {
        let repo = MemoryThreadRepository::new();
        let a = repo.create(thread_row(1, 10)).await.unwrap();
        let b = repo.create(thread_row(1, 20)).await.unwrap();
        assert_eq!((a, b), (1, 2));

        let explicit = ThreadRow {
            tid: 100,
            ..thread_row(1, 30)
        };
        assert_eq!(repo.create(explicit).await.unwrap(), 100);
        assert_eq!(repo.create(thread_row(1, 40)).await.unwrap(), 101);
    }

    #[tokio::test]
    async fn test_list_by_forum_orders_by_last_post() {
        let repo = MemoryThreadRepository::new();
        repo.create(thread_row(1, 10)).await.unwrap();
        repo.create(thread_row(1, 30)).await.unwrap();
        repo.create(thread_row(2, 50)).await.unwrap();
        repo.create(thread_row(1, 20)).await.unwrap();

        let listed = repo.list_by_forum(1, 0, 10).await.unwrap();
        let lastposts: Vec<i64> = listed.iter().map(|row| row.lastpost).collect();
        assert_eq!(lastposts, vec![30, 20, 10]);

        let second_page = repo.list_by_forum(1, 2, 2).await.unwrap();
        assert_eq!(second_page.len(), 1);
    }

    #[tokio::test]
    async fn test_mutators_report_missing_rows() {
        let repo = MemoryUserRepository::new();
        assert!(!repo.delete(9).await.unwrap());
        assert!(!repo.touch_lastvisit(9, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_tag_links_and_popularity() {
        let repo = MemoryTagRepository::new();
        let rust = repo.create(tag_row("Rust", 5, 1)).await.unwrap();
        let go = repo.create(tag_row("Go", 5, 9)).await.unwrap();
        let zig = repo.create(tag_row("Zig", 1, 0)).await.unwrap();

        assert!(repo.attach_to_thread(7, rust).await.unwrap());
        assert!(!repo.attach_to_thread(7, rust).await.unwrap());
        assert!(repo.attach_to_thread(7, zig).await.unwrap());

        let hot: Vec<i32> = repo
            .get_hot(2)
            .await
            .unwrap()
            .iter()
            .map(|t| t.tag_id)
            .collect();
        assert_eq!(hot, vec![go, rust]);

        assert!(repo.delete(zig).await.unwrap());
        let linked = repo.get_by_thread(7).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].tag_id, rust);

        assert!(repo.detach_from_thread(7, rust).await.unwrap());
        assert!(!repo.detach_from_thread(7, rust).await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_counts_and_injects_failures() {
        let repo = MemoryForumRepository::new();
        repo.get_by_id(1).await.unwrap();
        repo.get_by_id(2).await.unwrap();
        assert_eq!(repo.probe().calls("get_by_id"), 2);

        repo.probe().set_failing(true);
        assert_matches!(repo.get_all().await, Err(Error::Origin(_)));
        assert_eq!(repo.probe().total_calls(), 3);

        repo.probe().set_failing(false);
        repo.probe().reset_calls();
        assert_eq!(repo.probe().total_calls(), 0);
    }
}

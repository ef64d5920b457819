//! Forum service

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use super::{require_found, validate_id, validate_text, MAX_NAME_CHARS};
use crate::cache::CacheAside;
use crate::error::{Error, Result};
use crate::model::{ForumCounter, ForumRecord, ForumRow, ForumTreeNode};
use crate::repository::ForumRepository;

pub struct ForumService {
    repo: Arc<dyn ForumRepository>,
    cache: CacheAside<ForumRecord>,
}

impl ForumService {
    pub fn new(repo: Arc<dyn ForumRepository>, cache: CacheAside<ForumRecord>) -> Self {
        Self { repo, cache }
    }

    pub async fn get(&self, fid: i32) -> Result<Option<ForumRecord>> {
        validate_id("fid", fid as i64)?;
        self.cache
            .get_or_fetch(fid as i64, || async move {
                let row = self.repo.get_by_id(fid).await?;
                Ok(row.as_ref().map(ForumRecord::from))
            })
            .await
    }

    /// All forums by display order
    pub async fn list(&self) -> Result<Vec<ForumRecord>> {
        let rows = self.repo.get_all().await?;
        Ok(rows.iter().map(ForumRecord::from).collect())
    }

    /// Direct subforums of `fid`. Each child is primed into the cache.
    pub async fn children(&self, fid: i32) -> Result<Vec<ForumRecord>> {
        if fid < 0 {
            return Err(Error::Validation(format!("fid must be >= 0, got {}", fid)));
        }
        let rows = self.repo.get_by_parent(fid).await?;
        let children: Vec<ForumRecord> = rows.iter().map(ForumRecord::from).collect();
        for child in &children {
            self.cache.prime(child).await;
        }
        Ok(children)
    }

    /// Top-level forums with their descendants nested
    pub async fn tree(&self) -> Result<Vec<ForumTreeNode>> {
        Ok(build_tree(self.list().await?))
    }

    /// Create a forum under `parent` (0 for top level)
    pub async fn create(&self, name: &str, parent: i32) -> Result<ForumRecord> {
        validate_text("name", name, MAX_NAME_CHARS)?;
        if parent < 0 {
            return Err(Error::Validation(format!("parent must be >= 0, got {}", parent)));
        }

        let (path, depth) = if parent > 0 {
            let parent_row = self.repo.get_by_id(parent).await?.ok_or_else(|| {
                Error::Validation(format!("parent forum {} does not exist", parent))
            })?;
            (format!("{},{}", parent_row.path, parent), parent_row.depth + 1)
        } else {
            ("0".to_string(), 0)
        };

        let now = Utc::now();
        let mut row = ForumRow {
            fid: 0,
            name: name.trim().to_string(),
            parent,
            path,
            depth,
            display_order: 0,
            threads: 0,
            today: 0,
            posts: 0,
            status: 0,
            created_at: now,
            updated_at: now,
        };
        row.fid = self
            .repo
            .create(row.clone())
            .await
            .inspect_err(|e| error!(parent, error = %e, "Create forum failed"))?;

        self.cache.invalidate(row.fid as i64).await;
        info!(fid = row.fid, parent, "Forum created");
        Ok(ForumRecord::from(&row))
    }

    pub async fn update(&self, fid: i32, name: &str, status: u8) -> Result<()> {
        validate_id("fid", fid as i64)?;
        validate_text("name", name, MAX_NAME_CHARS)?;

        let mut row = self
            .repo
            .get_by_id(fid)
            .await?
            .ok_or_else(|| Error::not_found("forum", fid as i64))?;
        row.name = name.trim().to_string();
        row.status = status;

        let updated = self
            .repo
            .update(&row)
            .await
            .inspect_err(|e| error!(fid, error = %e, "Update forum failed"))?;
        require_found(updated, "forum", fid as i64)?;

        self.cache.invalidate(fid as i64).await;
        Ok(())
    }

    /// Delete a forum. Descendants keep stale paths, so the whole forum L1
    /// tier is flushed along with the key.
    pub async fn delete(&self, fid: i32) -> Result<()> {
        validate_id("fid", fid as i64)?;
        let deleted = self
            .repo
            .delete(fid)
            .await
            .inspect_err(|e| error!(fid, error = %e, "Delete forum failed"))?;
        require_found(deleted, "forum", fid as i64)?;

        self.cache.invalidate(fid as i64).await;
        self.cache.flush();
        info!(fid, "Forum deleted");
        Ok(())
    }

    /// A thread was posted in this forum. Its opening post counts too.
    pub async fn increment_threads(&self, fid: i32) -> Result<()> {
        validate_id("fid", fid as i64)?;
        let found = self
            .repo
            .increment_counter(fid, ForumCounter::Threads, 1)
            .await?;
        require_found(found, "forum", fid as i64)?;
        for counter in [ForumCounter::Today, ForumCounter::Posts] {
            self.repo.increment_counter(fid, counter, 1).await?;
        }
        self.cache.invalidate(fid as i64).await;
        Ok(())
    }

    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    pub fn cache(&self) -> &CacheAside<ForumRecord> {
        &self.cache
    }
}

/// Nest forums under their parents, preserving input order per level.
/// Forums whose parent is missing are dropped.
fn build_tree(forums: Vec<ForumRecord>) -> Vec<ForumTreeNode> {
    let mut by_parent: HashMap<i32, Vec<ForumRecord>> = HashMap::new();
    for forum in forums {
        by_parent.entry(forum.parent).or_default().push(forum);
    }
    attach_children(0, &mut by_parent)
}

fn attach_children(
    parent: i32,
    by_parent: &mut HashMap<i32, Vec<ForumRecord>>,
) -> Vec<ForumTreeNode> {
    // Each level is taken out of the map once, so malformed cycles terminate
    let level = by_parent.remove(&parent).unwrap_or_default();
    level
        .into_iter()
        .map(|forum| ForumTreeNode {
            children: attach_children(forum.fid, by_parent),
            forum,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{BoundedCache, CacheKey, CacheMetrics, L2Cache};
    use crate::repository::MemoryForumRepository;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn service() -> (Arc<MemoryForumRepository>, ForumService) {
        let repo = Arc::new(MemoryForumRepository::new());
        let cache = CacheAside::new(
            Arc::new(BoundedCache::<CacheKey, ForumRecord>::new(100)),
            L2Cache::in_memory(Duration::from_millis(50)),
            Duration::from_secs(60),
            Arc::new(CacheMetrics::new()),
        );
        (repo.clone(), ForumService::new(repo, cache))
    }

    #[tokio::test]
    async fn test_create_computes_path_and_depth() {
        let (_, svc) = service();
        let root = svc.create("Programming", 0).await.unwrap();
        let child = svc.create("Rust", root.fid).await.unwrap();
        let grandchild = svc.create("Async", child.fid).await.unwrap();

        assert_eq!((root.path.as_str(), root.depth), ("0", 0));
        assert_eq!(child.path, format!("0,{}", root.fid));
        assert_eq!(child.depth, 1);
        assert_eq!(grandchild.path, format!("0,{},{}", root.fid, child.fid));
        assert_eq!(grandchild.depth, 2);

        assert_matches!(svc.create("Orphan", 999).await, Err(Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_tree_nests_children() {
        let (_, svc) = service();
        let a = svc.create("A", 0).await.unwrap();
        let b = svc.create("B", 0).await.unwrap();
        let a1 = svc.create("A1", a.fid).await.unwrap();
        svc.create("A1x", a1.fid).await.unwrap();

        let tree = svc.tree().await.unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].forum.fid, a.fid);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].children.len(), 1);
        assert_eq!(tree[1].forum.fid, b.fid);
        assert!(tree[1].children.is_empty());
    }

    #[test]
    fn test_tree_tolerates_cycles() {
        let node = |fid, parent| ForumRecord {
            fid,
            name: format!("f{}", fid),
            parent,
            path: "0".into(),
            depth: 0,
            display_order: 0,
            threads: 0,
            today: 0,
            posts: 0,
            status: 0,
        };
        let tree = build_tree(vec![node(1, 0), node(2, 3), node(3, 2)]);
        assert_eq!(tree.len(), 1);
        assert!(tree[0].children.is_empty());
    }

    #[tokio::test]
    async fn test_delete_flushes_forum_tier() {
        let (_, svc) = service();
        let a = svc.create("A", 0).await.unwrap();
        let b = svc.create("B", 0).await.unwrap();
        svc.get(a.fid).await.unwrap();
        svc.get(b.fid).await.unwrap();
        assert_eq!(svc.cache().l1().len(), 2);

        svc.delete(a.fid).await.unwrap();
        assert!(svc.cache().l1().is_empty());
        assert_eq!(svc.get(a.fid).await.unwrap(), None);
        assert_matches!(svc.delete(a.fid).await, Err(Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_increment_threads_invalidates() {
        let (repo, svc) = service();
        let forum = svc.create("Busy", 0).await.unwrap();
        svc.get(forum.fid).await.unwrap();

        svc.increment_threads(forum.fid).await.unwrap();
        let fresh = svc.get(forum.fid).await.unwrap().unwrap();
        assert_eq!(fresh.threads, 1);
        assert_eq!(fresh.today, 1);
        assert_eq!(fresh.posts, 1);
        assert_eq!(repo.probe().calls("get_by_id"), 2);
    }

    #[tokio::test]
    async fn test_children_lists_direct_subforums_and_primes_cache() {
        let (repo, svc) = service();
        let root = svc.create("Root", 0).await.unwrap();
        let a = svc.create("A", root.fid).await.unwrap();
        let b = svc.create("B", root.fid).await.unwrap();
        svc.create("A1", a.fid).await.unwrap();

        let mut children: Vec<i32> = svc
            .children(root.fid)
            .await
            .unwrap()
            .iter()
            .map(|f| f.fid)
            .collect();
        children.sort();
        assert_eq!(children, vec![a.fid, b.fid]);

        let top: Vec<i32> = svc.children(0).await.unwrap().iter().map(|f| f.fid).collect();
        assert_eq!(top, vec![root.fid]);

        repo.probe().reset_calls();
        assert_eq!(svc.get(b.fid).await.unwrap().unwrap().name, "B");
        assert_eq!(repo.probe().calls("get_by_id"), 0);

        assert_matches!(svc.children(-1).await, Err(Error::Validation(_)));
    }
}

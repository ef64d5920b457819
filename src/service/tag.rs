//! Tag service
//!
//! Tags live in a byte-oriented L1 (high churn from thread tagging).

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use super::{require_found, validate_id, validate_text, MAX_NAME_CHARS, MAX_PAGE_SIZE};
use crate::cache::CacheAside;
use crate::error::{Error, Result};
use crate::model::{slugify, TagCounter, TagRecord, TagRow};
use crate::repository::TagRepository;

pub struct TagService {
    repo: Arc<dyn TagRepository>,
    cache: CacheAside<TagRecord>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>, cache: CacheAside<TagRecord>) -> Self {
        Self { repo, cache }
    }

    pub async fn get(&self, tag_id: i32) -> Result<Option<TagRecord>> {
        validate_id("tag_id", tag_id as i64)?;
        self.cache
            .get_or_fetch(tag_id as i64, || async move {
                let row = self.repo.get_by_id(tag_id).await?;
                Ok(row.as_ref().map(TagRecord::from))
            })
            .await
    }

    /// Lookup by exact name; the hit is primed into the id-keyed tiers
    pub async fn get_by_name(&self, name: &str) -> Result<Option<TagRecord>> {
        validate_text("name", name, MAX_NAME_CHARS)?;
        let Some(row) = self.repo.get_by_name(name.trim()).await? else {
            return Ok(None);
        };
        let record = TagRecord::from(&row);
        self.cache.prime(&record).await;
        Ok(Some(record))
    }

    /// All tags, most used first
    pub async fn list(&self) -> Result<Vec<TagRecord>> {
        let rows = self.repo.get_all().await?;
        Ok(rows.iter().map(TagRecord::from).collect())
    }

    pub async fn hot(&self, limit: usize) -> Result<Vec<TagRecord>> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        let rows = self.repo.get_hot(limit).await?;
        Ok(rows.iter().map(TagRecord::from).collect())
    }

    pub async fn by_thread(&self, tid: i64) -> Result<Vec<TagRecord>> {
        validate_id("tid", tid)?;
        let rows = self.repo.get_by_thread(tid).await?;
        Ok(rows.iter().map(TagRecord::from).collect())
    }

    /// Create a tag, or return the existing one with the same name
    pub async fn create(&self, name: &str) -> Result<TagRecord> {
        validate_text("name", name, MAX_NAME_CHARS)?;
        let name = name.trim();

        if let Some(existing) = self.repo.get_by_name(name).await? {
            debug!(tag_id = existing.tag_id, name, "Tag already exists");
            return Ok(TagRecord::from(&existing));
        }

        let slug = slug_for(name)?;
        let now = Utc::now();
        let mut row = TagRow {
            tag_id: 0,
            name: name.to_string(),
            slug,
            threads: 0,
            views: 0,
            status: 0,
            created_at: now,
            updated_at: now,
        };
        row.tag_id = self
            .repo
            .create(row.clone())
            .await
            .inspect_err(|e| error!(name, error = %e, "Create tag failed"))?;

        self.cache.invalidate(row.tag_id as i64).await;
        info!(tag_id = row.tag_id, name, "Tag created");
        Ok(TagRecord::from(&row))
    }

    pub async fn update(&self, tag_id: i32, name: &str, status: u8) -> Result<()> {
        validate_id("tag_id", tag_id as i64)?;
        validate_text("name", name, MAX_NAME_CHARS)?;

        let mut row = self
            .repo
            .get_by_id(tag_id)
            .await?
            .ok_or_else(|| Error::not_found("tag", tag_id as i64))?;
        row.name = name.trim().to_string();
        row.slug = slug_for(&row.name)?;
        row.status = status;

        let updated = self
            .repo
            .update(&row)
            .await
            .inspect_err(|e| error!(tag_id, error = %e, "Update tag failed"))?;
        require_found(updated, "tag", tag_id as i64)?;

        self.cache.invalidate(tag_id as i64).await;
        Ok(())
    }

    pub async fn delete(&self, tag_id: i32) -> Result<()> {
        validate_id("tag_id", tag_id as i64)?;
        let deleted = self
            .repo
            .delete(tag_id)
            .await
            .inspect_err(|e| error!(tag_id, error = %e, "Delete tag failed"))?;
        require_found(deleted, "tag", tag_id as i64)?;

        self.cache.invalidate(tag_id as i64).await;
        info!(tag_id, "Tag deleted");
        Ok(())
    }

    /// Tag a thread by name, creating the tag on first use
    pub async fn attach_to_thread(&self, tid: i64, name: &str) -> Result<TagRecord> {
        validate_id("tid", tid)?;
        let tag = self.create(name).await?;

        if self.repo.attach_to_thread(tid, tag.tag_id).await? {
            let found = self
                .repo
                .increment_counter(tag.tag_id, TagCounter::Threads, 1)
                .await?;
            require_found(found, "tag", tag.tag_id as i64)?;
            self.cache.invalidate(tag.tag_id as i64).await;
            debug!(tid, tag_id = tag.tag_id, "Tag attached");
        }

        Ok(tag)
    }

    pub async fn detach_from_thread(&self, tid: i64, tag_id: i32) -> Result<()> {
        validate_id("tid", tid)?;
        validate_id("tag_id", tag_id as i64)?;

        if self.repo.detach_from_thread(tid, tag_id).await? {
            self.repo
                .increment_counter(tag_id, TagCounter::Threads, -1)
                .await?;
            self.cache.invalidate(tag_id as i64).await;
            debug!(tid, tag_id, "Tag detached");
        }
        Ok(())
    }

    pub async fn increment_views(&self, tag_id: i32) -> Result<()> {
        validate_id("tag_id", tag_id as i64)?;
        let found = self
            .repo
            .increment_counter(tag_id, TagCounter::Views, 1)
            .await?;
        require_found(found, "tag", tag_id as i64)?;
        self.cache.invalidate(tag_id as i64).await;
        Ok(())
    }

    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    pub fn cache(&self) -> &CacheAside<TagRecord> {
        &self.cache
    }
}

fn slug_for(name: &str) -> Result<String> {
    let slug = slugify(name);
    if slug.is_empty() {
        return Err(Error::Validation(format!(
            "tag name {:?} has no usable characters",
            name
        )));
    }
    Ok(slug)
}

//! Thread service

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};

use super::{paging, require_found, validate_id, validate_text};
use crate::cache::CacheAside;
use crate::error::{Error, Result};
use crate::model::{unix_now, ThreadCounter, ThreadListItem, ThreadRecord, ThreadRow};
use crate::repository::ThreadRepository;

/// Longest accepted subject, in characters
pub const MAX_SUBJECT_CHARS: usize = 200;

/// Longest accepted message body, in bytes (u16 length prefix on the wire)
pub const MAX_MESSAGE_BYTES: usize = u16::MAX as usize;

pub struct ThreadService {
    repo: Arc<dyn ThreadRepository>,
    cache: CacheAside<ThreadRecord>,
}

impl ThreadService {
    pub fn new(repo: Arc<dyn ThreadRepository>, cache: CacheAside<ThreadRecord>) -> Self {
        Self { repo, cache }
    }

    /// Read-through lookup of one thread with its message
    pub async fn get(&self, tid: i64) -> Result<Option<ThreadRecord>> {
        validate_id("tid", tid)?;
        self.cache
            .get_or_fetch(tid, || async move {
                let row = self.repo.get_by_id(tid).await?;
                Ok(row.as_ref().map(ThreadRecord::from))
            })
            .await
    }

    /// Threads of a forum, newest activity first; `fid` 0 lists every
    /// forum. Not cached.
    pub async fn list(&self, fid: i32, page: usize, page_size: usize) -> Result<Vec<ThreadListItem>> {
        if fid != 0 {
            validate_id("fid", fid as i64)?;
        }
        let (offset, limit) = paging(page, page_size)?;

        let rows = if fid == 0 {
            let mut rows = self.repo.get_all().await?;
            rows.sort_by(|a, b| b.lastpost.cmp(&a.lastpost).then(b.tid.cmp(&a.tid)));
            rows.into_iter().skip(offset).take(limit).collect()
        } else {
            self.repo.list_by_forum(fid, offset, limit).await?
        };
        Ok(rows.iter().map(ThreadListItem::from).collect())
    }

    pub async fn create(
        &self,
        fid: i32,
        uid: i64,
        subject: &str,
        message: &str,
    ) -> Result<ThreadRecord> {
        validate_id("fid", fid as i64)?;
        validate_id("uid", uid)?;
        validate_text("subject", subject, MAX_SUBJECT_CHARS)?;
        if message.len() > MAX_MESSAGE_BYTES {
            return Err(Error::Validation(format!(
                "message must be at most {} bytes",
                MAX_MESSAGE_BYTES
            )));
        }

        let now = Utc::now();
        let mut row = ThreadRow {
            tid: 0,
            fid,
            uid,
            subject: subject.trim().to_string(),
            views: 0,
            replies: 0,
            dateline: now.timestamp(),
            lastpost: now.timestamp(),
            status: 0,
            message: message.to_string(),
            created_at: now,
            updated_at: now,
        };
        row.tid = self
            .repo
            .create(row.clone())
            .await
            .inspect_err(|e| error!(fid, uid, error = %e, "Create thread failed"))?;

        self.cache.invalidate(row.tid).await;
        info!(tid = row.tid, fid, "Thread created");
        Ok(ThreadRecord::from(&row))
    }

    pub async fn update(&self, tid: i64, subject: &str, status: u8) -> Result<()> {
        validate_id("tid", tid)?;
        validate_text("subject", subject, MAX_SUBJECT_CHARS)?;

        let mut row = self
            .repo
            .get_by_id(tid)
            .await?
            .ok_or_else(|| Error::not_found("thread", tid))?;
        row.subject = subject.trim().to_string();
        row.status = status;
        row.lastpost = unix_now();

        let updated = self
            .repo
            .update(&row)
            .await
            .inspect_err(|e| error!(tid, error = %e, "Update thread failed"))?;
        require_found(updated, "thread", tid)?;

        self.cache.invalidate(tid).await;
        Ok(())
    }

    pub async fn delete(&self, tid: i64) -> Result<()> {
        validate_id("tid", tid)?;
        let deleted = self
            .repo
            .delete(tid)
            .await
            .inspect_err(|e| error!(tid, error = %e, "Delete thread failed"))?;
        require_found(deleted, "thread", tid)?;

        self.cache.invalidate(tid).await;
        info!(tid, "Thread deleted");
        Ok(())
    }

    pub async fn increment_views(&self, tid: i64) -> Result<()> {
        self.increment(tid, ThreadCounter::Views).await
    }

    /// Bump the reply counter and last-post time
    pub async fn increment_replies(&self, tid: i64) -> Result<()> {
        self.increment(tid, ThreadCounter::Replies).await
    }

    async fn increment(&self, tid: i64, counter: ThreadCounter) -> Result<()> {
        validate_id("tid", tid)?;
        let found = self.repo.increment_counter(tid, counter, 1).await?;
        require_found(found, "thread", tid)?;
        self.cache.invalidate(tid).await;
        Ok(())
    }

    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    pub fn cache(&self) -> &CacheAside<ThreadRecord> {
        &self.cache
    }
}

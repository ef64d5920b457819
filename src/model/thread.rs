//! Thread entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CachedRecord, EntityKind};

/// Thread row as stored at origin (thread header joined with its content)
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadRow {
    pub tid: i64,
    pub fid: i32,
    pub uid: i64,
    pub subject: String,
    pub views: i32,
    pub replies: i32,
    pub dateline: i64,
    pub lastpost: i64,
    pub status: u8,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cached thread projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRecord {
    pub tid: i64,
    pub fid: i32,
    pub uid: i64,
    pub subject: String,
    pub views: i32,
    pub replies: i32,
    pub dateline: i64,
    pub lastpost: i64,
    pub status: u8,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub message: String,
}

impl From<&ThreadRow> for ThreadRecord {
    fn from(row: &ThreadRow) -> Self {
        Self {
            tid: row.tid,
            fid: row.fid,
            uid: row.uid,
            subject: row.subject.clone(),
            views: row.views,
            replies: row.replies,
            dateline: row.dateline,
            lastpost: row.lastpost,
            status: row.status,
            message: row.message.clone(),
        }
    }
}

impl CachedRecord for ThreadRecord {
    const ENTITY: EntityKind = EntityKind::Thread;

    fn cache_id(&self) -> i64 {
        self.tid
    }
}

/// Thread list entry (no message body, never cached)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadListItem {
    pub tid: i64,
    pub fid: i32,
    pub uid: i64,
    pub subject: String,
    pub views: i32,
    pub replies: i32,
    pub dateline: i64,
    pub lastpost: i64,
    pub status: u8,
}

impl From<&ThreadRow> for ThreadListItem {
    fn from(row: &ThreadRow) -> Self {
        Self {
            tid: row.tid,
            fid: row.fid,
            uid: row.uid,
            subject: row.subject.clone(),
            views: row.views,
            replies: row.replies,
            dateline: row.dateline,
            lastpost: row.lastpost,
            status: row.status,
        }
    }
}

/// Origin-side counters on a thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadCounter {
    Views,
    Replies,
}

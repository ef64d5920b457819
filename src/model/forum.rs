//! Forum entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CachedRecord, EntityKind};

/// Forum row as stored at origin
#[derive(Debug, Clone, PartialEq)]
pub struct ForumRow {
    pub fid: i32,
    pub name: String,
    /// Parent forum id, 0 for a top-level forum
    pub parent: i32,
    /// Ancestor chain, e.g. "0,1,2"
    pub path: String,
    pub depth: i32,
    pub display_order: i32,
    pub threads: i32,
    pub today: i32,
    pub posts: i32,
    pub status: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cached forum projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumRecord {
    pub fid: i32,
    pub name: String,
    pub parent: i32,
    pub path: String,
    pub depth: i32,
    pub display_order: i32,
    pub threads: i32,
    pub today: i32,
    pub posts: i32,
    pub status: u8,
}

impl From<&ForumRow> for ForumRecord {
    fn from(row: &ForumRow) -> Self {
        Self {
            fid: row.fid,
            name: row.name.clone(),
            parent: row.parent,
            path: row.path.clone(),
            depth: row.depth,
            display_order: row.display_order,
            threads: row.threads,
            today: row.today,
            posts: row.posts,
            status: row.status,
        }
    }
}

impl CachedRecord for ForumRecord {
    const ENTITY: EntityKind = EntityKind::Forum;

    fn cache_id(&self) -> i64 {
        self.fid as i64
    }
}

/// Forum with nested children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumTreeNode {
    #[serde(flatten)]
    pub forum: ForumRecord,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<ForumTreeNode>,
}

/// Origin-side counters on a forum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForumCounter {
    Threads,
    Today,
    Posts,
}

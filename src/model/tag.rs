//! Tag entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CachedRecord, EntityKind};

/// Tag row as stored at origin
#[derive(Debug, Clone, PartialEq)]
pub struct TagRow {
    pub tag_id: i32,
    pub name: String,
    pub slug: String,
    pub threads: i32,
    pub views: i32,
    pub status: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cached tag projection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub tag_id: i32,
    pub name: String,
    pub slug: String,
    pub threads: i32,
    pub views: i32,
    pub status: u8,
}

impl From<&TagRow> for TagRecord {
    fn from(row: &TagRow) -> Self {
        Self {
            tag_id: row.tag_id,
            name: row.name.clone(),
            slug: row.slug.clone(),
            threads: row.threads,
            views: row.views,
            status: row.status,
        }
    }
}

impl CachedRecord for TagRecord {
    const ENTITY: EntityKind = EntityKind::Tag;

    fn cache_id(&self) -> i64 {
        self.tag_id as i64
    }
}

/// Origin-side counters on a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagCounter {
    Threads,
    Views,
}

/// URL slug for a tag name: ASCII alphanumerics lowercased, runs of anything
/// else collapsed to a single '-'. Non-ASCII names keep their characters.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

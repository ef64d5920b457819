//! User entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::{CachedRecord, EntityKind};

/// User row as stored at origin
#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub uid: i64,
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub avatar: String,
    /// 0 = member, 1 = administrator
    pub role: u8,
    /// 0 = active, 1 = disabled
    pub status: u8,
    pub dateline: i64,
    pub lastvisit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Cached user projection (no credentials)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: i64,
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub avatar: String,
    pub role: u8,
    pub status: u8,
    pub dateline: i64,
    pub lastvisit: i64,
}

impl From<&UserRow> for UserRecord {
    fn from(row: &UserRow) -> Self {
        Self {
            uid: row.uid,
            username: row.username.clone(),
            email: row.email.clone(),
            avatar: row.avatar.clone(),
            role: row.role,
            status: row.status,
            dateline: row.dateline,
            lastvisit: row.lastvisit,
        }
    }
}

impl CachedRecord for UserRecord {
    const ENTITY: EntityKind = EntityKind::User;

    fn cache_id(&self) -> i64 {
        self.uid
    }
}

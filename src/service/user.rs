//! User service

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, error, info};

use super::{paging, require_found, validate_id, validate_text};
use crate::cache::{CacheAside, CacheKey};
use crate::error::{Error, Result};
use crate::model::{unix_now, UserRecord, UserRow};
use crate::repository::UserRepository;

/// Longest accepted username, in characters
pub const MAX_USERNAME_CHARS: usize = 32;

/// Longest accepted email, in characters
pub const MAX_EMAIL_CHARS: usize = 60;

/// Longest accepted avatar URL, in characters
pub const MAX_AVATAR_CHARS: usize = 500;

/// Most ids accepted by one batch lookup
pub const MAX_BATCH: usize = 100;

/// Fields for a new account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    /// Already hashed by the auth layer
    pub password_hash: String,
    pub email: String,
}

pub struct UserService {
    repo: Arc<dyn UserRepository>,
    cache: CacheAside<UserRecord>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, cache: CacheAside<UserRecord>) -> Self {
        Self { repo, cache }
    }

    pub async fn get(&self, uid: i64) -> Result<Option<UserRecord>> {
        validate_id("uid", uid)?;
        self.cache
            .get_or_fetch(uid, || async move {
                let row = self.repo.get_by_id(uid).await?;
                Ok(row.as_ref().map(UserRecord::from))
            })
            .await
    }

    /// Batch lookup. Cached users come from L1/L2; the rest are read with one
    /// origin call and backfilled. Absent users are omitted.
    pub async fn get_many(&self, uids: &[i64]) -> Result<HashMap<i64, UserRecord>> {
        if uids.len() > MAX_BATCH {
            return Err(Error::Validation(format!(
                "at most {} ids per batch",
                MAX_BATCH
            )));
        }
        for uid in uids {
            validate_id("uid", *uid)?;
        }

        let mut unique = Vec::with_capacity(uids.len());
        for &uid in uids {
            if !unique.contains(&uid) {
                unique.push(uid);
            }
        }

        let cached = join_all(
            unique
                .iter()
                .map(|&uid| self.cache.lookup(CacheKey::user(uid))),
        )
        .await;

        let mut found = HashMap::with_capacity(unique.len());
        let mut missing = Vec::new();
        for (uid, user) in unique.into_iter().zip(cached) {
            match user {
                Some(user) => {
                    found.insert(uid, user);
                }
                None => missing.push(uid),
            }
        }

        if !missing.is_empty() {
            self.cache.metrics().record_origin_fetch();
            let rows = self.repo.get_by_ids(&missing).await.inspect_err(|_| {
                self.cache.metrics().record_origin_error();
            })?;
            for row in &rows {
                let user = UserRecord::from(row);
                self.cache.prime(&user).await;
                found.insert(user.uid, user);
            }
            debug!(requested = uids.len(), fetched = rows.len(), "Batch user backfill");
        }

        Ok(found)
    }

    /// Users by id. Not cached.
    pub async fn list(&self, page: usize, page_size: usize) -> Result<Vec<UserRecord>> {
        let (offset, limit) = paging(page, page_size)?;
        let rows = self.repo.get_all().await?;
        Ok(rows
            .iter()
            .skip(offset)
            .take(limit)
            .map(UserRecord::from)
            .collect())
    }

    pub async fn create(&self, new_user: NewUser) -> Result<UserRecord> {
        validate_text("username", &new_user.username, MAX_USERNAME_CHARS)?;
        if new_user.password_hash.is_empty() {
            return Err(Error::Validation("password_hash must not be empty".into()));
        }
        validate_email(&new_user.email)?;

        let username = new_user.username.trim().to_string();
        if self.repo.get_by_username(&username).await?.is_some() {
            return Err(Error::Validation(format!(
                "username {} is already taken",
                username
            )));
        }

        let now = Utc::now();
        let mut row = UserRow {
            uid: 0,
            username,
            password_hash: new_user.password_hash,
            email: new_user.email,
            avatar: String::new(),
            role: 0,
            status: 0,
            dateline: now.timestamp(),
            lastvisit: now.timestamp(),
            created_at: now,
            updated_at: now,
        };
        row.uid = self
            .repo
            .create(row.clone())
            .await
            .inspect_err(|e| error!(error = %e, "Create user failed"))?;

        self.cache.invalidate(row.uid).await;
        info!(uid = row.uid, "User created");
        Ok(UserRecord::from(&row))
    }

    pub async fn update(&self, uid: i64, email: &str, avatar: &str, status: u8) -> Result<()> {
        validate_id("uid", uid)?;
        validate_email(email)?;
        if avatar.chars().count() > MAX_AVATAR_CHARS {
            return Err(Error::Validation(format!(
                "avatar must be at most {} characters",
                MAX_AVATAR_CHARS
            )));
        }

        let mut row = self
            .repo
            .get_by_id(uid)
            .await?
            .ok_or_else(|| Error::not_found("user", uid))?;
        row.email = email.to_string();
        row.avatar = avatar.to_string();
        row.status = status;

        let updated = self
            .repo
            .update(&row)
            .await
            .inspect_err(|e| error!(uid, error = %e, "Update user failed"))?;
        require_found(updated, "user", uid)?;

        self.cache.invalidate(uid).await;
        Ok(())
    }

    pub async fn delete(&self, uid: i64) -> Result<()> {
        validate_id("uid", uid)?;
        let deleted = self
            .repo
            .delete(uid)
            .await
            .inspect_err(|e| error!(uid, error = %e, "Delete user failed"))?;
        require_found(deleted, "user", uid)?;

        self.cache.invalidate(uid).await;
        info!(uid, "User deleted");
        Ok(())
    }

    /// Record a visit at the current time
    pub async fn touch_lastvisit(&self, uid: i64) -> Result<()> {
        validate_id("uid", uid)?;
        let found = self.repo.touch_lastvisit(uid, unix_now()).await?;
        require_found(found, "user", uid)?;
        self.cache.invalidate(uid).await;
        Ok(())
    }

    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    pub fn cache(&self) -> &CacheAside<UserRecord> {
        &self.cache
    }
}

fn validate_email(email: &str) -> Result<()> {
    if email.is_empty() {
        return Ok(());
    }
    if email.chars().count() > MAX_EMAIL_CHARS || !email.contains('@') {
        return Err(Error::Validation(format!("invalid email {:?}", email)));
    }
    Ok(())
}

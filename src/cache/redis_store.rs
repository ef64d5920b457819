//! Redis-backed L2 store
//!
//! Uses a `deadpool-redis` connection pool; values are stored with
//! `SET key value EX ttl`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use deadpool_redis::{Pool, Runtime};
use redis::AsyncCommands;
use tracing::info;

use super::l2::L2Store;
use crate::config::RedisSettings;
use crate::error::{Error, Result};

/// Shared L2 store on Redis
#[derive(Clone)]
pub struct RedisL2Store {
    pool: Pool,
}

impl RedisL2Store {
    /// Wrap an existing pool
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool from settings and verify one connection
    pub async fn connect(settings: &RedisSettings) -> Result<Self> {
        let timeout = Duration::from_millis(settings.timeout_ms);
        let mut config = deadpool_redis::Config::from_url(&settings.url);
        let pool_config = config.pool.get_or_insert_with(Default::default);
        pool_config.max_size = settings.pool_size;
        pool_config.timeouts.wait = Some(timeout);
        pool_config.timeouts.create = Some(timeout);
        pool_config.timeouts.recycle = Some(timeout);

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Config(format!("failed to create Redis pool: {}", e)))?;

        // Fail fast on an unreachable server
        pool.get().await?;
        info!(url = %settings.url, pool_size = settings.pool_size, "Connected to Redis");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl L2Store for RedisL2Store {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.pool.get().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let mut conn = self.pool.get().await?;
        // Redis rejects EX 0
        let ttl_secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value.as_ref(), ttl_secs).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }
}

//! Process configuration
//!
//! Loaded from an optional YAML file; every field has a default and the
//! binary's CLI flags override individual values after loading.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cache::{DEFAULT_BYTE_SHARDS, DEFAULT_L1_CAPACITY, DEFAULT_L2_TIMEOUT, DEFAULT_L2_TTL};
use crate::error::{Error, Result};

fn default_l1_capacity() -> usize {
    DEFAULT_L1_CAPACITY
}

fn default_l2_ttl_secs() -> u64 {
    DEFAULT_L2_TTL.as_secs()
}

fn default_l2_timeout_ms() -> u64 {
    DEFAULT_L2_TIMEOUT.as_millis() as u64
}

fn default_byte_shards() -> usize {
    DEFAULT_BYTE_SHARDS
}

fn default_pool_size() -> usize {
    16
}

fn default_redis_timeout_ms() -> u64 {
    500
}

fn default_admin_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// =============================================================================
// Sections
// =============================================================================

/// Cache tier sizing and deadlines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Max L1 entries per entity type
    #[serde(default = "default_l1_capacity")]
    pub l1_capacity: usize,

    /// L2 entry lifetime
    #[serde(default = "default_l2_ttl_secs")]
    pub l2_ttl_secs: u64,

    /// Deadline for a single L2 operation
    #[serde(default = "default_l2_timeout_ms")]
    pub l2_timeout_ms: u64,

    /// Shard count for byte-oriented L1 stores
    #[serde(default = "default_byte_shards")]
    pub byte_shards: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            l1_capacity: default_l1_capacity(),
            l2_ttl_secs: default_l2_ttl_secs(),
            l2_timeout_ms: default_l2_timeout_ms(),
            byte_shards: default_byte_shards(),
        }
    }
}

impl CacheSettings {
    pub fn l2_ttl(&self) -> Duration {
        Duration::from_secs(self.l2_ttl_secs)
    }

    pub fn l2_timeout(&self) -> Duration {
        Duration::from_millis(self.l2_timeout_ms)
    }
}

/// Shared L2 connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,

    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Pool wait/connect deadline
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

impl RedisSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool_size: default_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

/// Admin HTTP endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_admin_addr")]
    pub admin_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            admin_addr: default_admin_addr(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output logs as JSON
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// =============================================================================
// Application Config
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheSettings,

    /// L2 runs in-memory when absent
    #[serde(default)]
    pub redis: Option<RedisSettings>,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl AppConfig {
    /// Load from a YAML file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    /// Parse a YAML document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.cache.l1_capacity == 0 {
            return Err(Error::Config("cache.l1_capacity must be > 0".into()));
        }
        if self.cache.l2_ttl_secs == 0 {
            return Err(Error::Config("cache.l2_ttl_secs must be > 0".into()));
        }
        if self.cache.l2_timeout_ms == 0 {
            return Err(Error::Config("cache.l2_timeout_ms must be > 0".into()));
        }
        if self.cache.byte_shards == 0 {
            return Err(Error::Config("cache.byte_shards must be > 0".into()));
        }
        if let Some(redis) = &self.redis {
            if redis.url.is_empty() {
                return Err(Error::Config("redis.url must not be empty".into()));
            }
            if redis.pool_size == 0 {
                return Err(Error::Config("redis.pool_size must be > 0".into()));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.cache.l1_capacity, 10_000);
        assert_eq!(config.cache.l2_ttl(), Duration::from_secs(3600));
        assert_eq!(config.cache.l2_timeout(), Duration::from_millis(200));
        assert_eq!(config.cache.byte_shards, 16);
        assert!(config.redis.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = AppConfig::from_yaml(
            r#"
cache:
  l1_capacity: 500
redis:
  url: redis://cache.internal:6379
logging:
  json: true
"#,
        )
        .unwrap();

        assert_eq!(config.cache.l1_capacity, 500);
        assert_eq!(config.cache.l2_ttl_secs, 3600);
        let redis = config.redis.unwrap();
        assert_eq!(redis.url, "redis://cache.internal:6379");
        assert_eq!(redis.pool_size, 16);
        assert!(config.logging.json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = AppConfig::load("/nonexistent/boardcache.yaml").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        assert_matches!(
            AppConfig::from_yaml("cache: [1, 2"),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut config = AppConfig::default();
        config.cache.l1_capacity = 0;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = AppConfig::default();
        config.cache.l2_ttl_secs = 0;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = AppConfig::default();
        config.cache.l2_timeout_ms = 0;
        assert_matches!(config.validate(), Err(Error::Config(_)));

        let mut config = AppConfig::default();
        config.redis = Some(RedisSettings::new(""));
        assert_matches!(config.validate(), Err(Error::Config(_)));
    }
}

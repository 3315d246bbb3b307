use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::DEFAULT_HISTORY_LIMIT;

/// When a sliding TTL window is renewed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlidingReset {
    #[default]
    OnRead,
    OnWrite,
    OnReadAndWrite,
}

impl SlidingReset {
    pub fn applies_to_read(self) -> bool {
        matches!(self, Self::OnRead | Self::OnReadAndWrite)
    }

    pub fn applies_to_write(self) -> bool {
        matches!(self, Self::OnWrite | Self::OnReadAndWrite)
    }
}

/// How the Redis store obtains its connections
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionMode {
    /// Reuse an ambient connection pool supplied by the host application
    #[default]
    Shared,
    /// Build a dedicated pool from the host/port settings in this config
    Dedicated,
}

/// In-memory store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStoreConfig {
    /// Base TTL per entry; zero disables expiration
    #[serde(default = "default_memory_ttl")]
    pub ttl: Duration,
    /// Maximum total lifetime regardless of access; zero disables the cap
    #[serde(default)]
    pub absolute_ttl: Duration,
    /// LRU capacity, independent of TTL
    #[serde(default = "default_maximum_size")]
    pub maximum_size: usize,
    #[serde(default)]
    pub sliding_enabled: bool,
    #[serde(default)]
    pub sliding_reset: SlidingReset,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            ttl: default_memory_ttl(),
            absolute_ttl: Duration::ZERO,
            maximum_size: default_maximum_size(),
            sliding_enabled: false,
            sliding_reset: SlidingReset::default(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_memory_ttl() -> Duration {
    Duration::from_secs(3600)
}

fn default_maximum_size() -> usize {
    10_000
}

fn default_history_limit() -> usize {
    DEFAULT_HISTORY_LIMIT
}

/// Redis store configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Key namespace; must end with a delimiter (e.g. `fs:flow:`)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Base TTL in seconds; zero disables expiration
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    /// Maximum total lifetime in seconds; zero disables the cap
    #[serde(default)]
    pub absolute_ttl_seconds: u64,
    #[serde(default)]
    pub sliding_enabled: bool,
    #[serde(default)]
    pub sliding_reset: SlidingReset,
    #[serde(default)]
    pub mode: ConnectionMode,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub database: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Per-command timeout; zero disables
    #[serde(default)]
    pub command_timeout_ms: u64,
    /// Pool connection-establishment timeout; zero disables
    #[serde(default)]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_pool_max")]
    pub pool_max: usize,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            ttl_seconds: default_ttl_seconds(),
            absolute_ttl_seconds: 0,
            sliding_enabled: false,
            sliding_reset: SlidingReset::default(),
            mode: ConnectionMode::default(),
            host: default_host(),
            port: default_port(),
            database: 0,
            password: None,
            command_timeout_ms: 0,
            connect_timeout_ms: 0,
            pool_max: default_pool_max(),
            history_limit: default_history_limit(),
        }
    }
}

impl RedisStoreConfig {
    /// Connection URL for dedicated mode.
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.database
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.database),
        }
    }
}

impl std::fmt::Debug for RedisStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStoreConfig")
            .field("key_prefix", &self.key_prefix)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("absolute_ttl_seconds", &self.absolute_ttl_seconds)
            .field("sliding_enabled", &self.sliding_enabled)
            .field("sliding_reset", &self.sliding_reset)
            .field("mode", &self.mode)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("command_timeout_ms", &self.command_timeout_ms)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("pool_max", &self.pool_max)
            .field("history_limit", &self.history_limit)
            .finish()
    }
}

fn default_key_prefix() -> String {
    "fs:flow:".to_string()
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_pool_max() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_defaults() {
        let config = MemoryStoreConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(3600));
        assert_eq!(config.absolute_ttl, Duration::ZERO);
        assert_eq!(config.maximum_size, 10_000);
        assert!(!config.sliding_enabled);
        assert_eq!(config.sliding_reset, SlidingReset::OnRead);
    }

    #[test]
    fn redis_defaults_apply_on_empty_document() {
        let config: RedisStoreConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.key_prefix, "fs:flow:");
        assert_eq!(config.ttl_seconds, 3600);
        assert_eq!(config.mode, ConnectionMode::Shared);
        assert_eq!(config.pool_max, 16);
        assert_eq!(config.url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn redis_url_embeds_password() {
        let config = RedisStoreConfig {
            password: Some("secret".to_string()),
            database: 2,
            ..RedisStoreConfig::default()
        };
        assert_eq!(config.url(), "redis://:secret@127.0.0.1:6379/2");
    }

    #[test]
    fn redis_debug_redacts_password() {
        let config = RedisStoreConfig {
            password: Some("secret".to_string()),
            ..RedisStoreConfig::default()
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn sliding_reset_policies() {
        assert!(SlidingReset::OnRead.applies_to_read());
        assert!(!SlidingReset::OnRead.applies_to_write());
        assert!(SlidingReset::OnWrite.applies_to_write());
        assert!(!SlidingReset::OnWrite.applies_to_read());
        assert!(SlidingReset::OnReadAndWrite.applies_to_read());
        assert!(SlidingReset::OnReadAndWrite.applies_to_write());
    }
}

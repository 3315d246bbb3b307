//! Redis-backed flow store
//!
//! Aggregates are JSON-encoded under `<prefix>[<partition>:]<flowId>:agg`.
//! The write is a single `SET .. EX` with an effective TTL derived from
//! `meta.created_at`, so the absolute cap behaves as a global deadline no
//! matter how often the entry is rewritten or renewed.

use std::{collections::HashSet, future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Pool, Runtime};
use once_cell::sync::Lazy;
use redis::AsyncCommands;

use super::{
    absorb_previous, require_flow_id, require_partition_key, FlowAggregate, FlowStore, StoreError,
    StoreResult,
};
use crate::config::{ConnectionMode, RedisStoreConfig};
use crate::flow::types::ANONYMOUS_OWNER;

const AGGREGATE_SUFFIX: &str = ":agg";

/// Server-side bulk deletion: one round trip, returns the number of keys
/// actually removed.
static BULK_DELETE_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local removed = 0
for i = 1, #KEYS do
  removed = removed + redis.call('DEL', KEYS[i])
end
return removed
"#,
    )
});

enum EffectiveTtl {
    /// No expiration configured
    Unbounded,
    Seconds(u64),
    /// The absolute cap has already elapsed
    Expired,
}

/// Redis-backed [`FlowStore`]
pub struct RedisFlowStore {
    pool: Pool,
    config: RedisStoreConfig,
}

impl RedisFlowStore {
    /// Dedicated mode: builds a pool from the connection settings in `config`.
    pub fn connect(config: RedisStoreConfig) -> StoreResult<Self> {
        Self::validate(&config)?;
        let mut cfg = Config::from_url(config.url());
        let mut pool_config = deadpool_redis::PoolConfig::new(config.pool_max);
        if config.connect_timeout_ms > 0 {
            let timeout = Duration::from_millis(config.connect_timeout_ms);
            pool_config.timeouts.create = Some(timeout);
            pool_config.timeouts.wait = Some(timeout);
        }
        cfg.pool = Some(pool_config);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Initialization(e.to_string()))?;
        tracing::info!(
            key_prefix = %config.key_prefix,
            host = %config.host,
            port = config.port,
            "connected dedicated redis flow store"
        );
        Ok(Self { pool, config })
    }

    /// Shared mode: reuses an ambient pool owned by the host application.
    pub fn with_pool(pool: Pool, config: RedisStoreConfig) -> StoreResult<Self> {
        Self::validate(&config)?;
        Ok(Self { pool, config })
    }

    /// Builds the store according to `config.mode`; `shared` requires a pool.
    pub fn from_config(config: RedisStoreConfig, shared_pool: Option<Pool>) -> StoreResult<Self> {
        match (config.mode, shared_pool) {
            (ConnectionMode::Shared, Some(pool)) => Self::with_pool(pool, config),
            (ConnectionMode::Shared, None) => Err(StoreError::Initialization(
                "shared connection mode requires an ambient pool".to_string(),
            )),
            (ConnectionMode::Dedicated, _) => Self::connect(config),
        }
    }

    fn validate(config: &RedisStoreConfig) -> StoreResult<()> {
        if config.key_prefix.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "key prefix cannot be blank".to_string(),
            ));
        }
        if !config.key_prefix.ends_with(':') {
            return Err(StoreError::InvalidArgument(format!(
                "key prefix must end with ':' (got '{}')",
                config.key_prefix
            )));
        }
        Ok(())
    }

    fn redis_key(&self, partition: Option<&str>, flow_id: &str) -> String {
        match partition {
            Some(partition) if !partition.is_empty() => format!(
                "{}{}:{}{}",
                self.config.key_prefix, partition, flow_id, AGGREGATE_SUFFIX
            ),
            _ => format!("{}{}{}", self.config.key_prefix, flow_id, AGGREGATE_SUFFIX),
        }
    }

    /// Redis key for a key-addressed operation. The partition segment is the
    /// owner segment of the storage key (the default partition scope);
    /// anonymous flows use the un-partitioned key form.
    fn key_for(&self, flow_id: &str) -> String {
        self.redis_key(owner_partition(flow_id), flow_id)
    }

    fn partition_pattern(&self, partition_key: &str) -> String {
        format!(
            "{}{}:*{}",
            self.config.key_prefix, partition_key, AGGREGATE_SUFFIX
        )
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Initialization(e.to_string()))
    }

    /// Runs a single command, applying the configured command timeout.
    async fn run<T, F>(&self, key: &str, command: F) -> StoreResult<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let timeout_ms = self.config.command_timeout_ms;
        if timeout_ms == 0 {
            return command.await.map_err(|e| StoreError::Backend {
                key: key.to_string(),
                source: Box::new(e),
            });
        }
        match tokio::time::timeout(Duration::from_millis(timeout_ms), command).await {
            Ok(result) => result.map_err(|e| StoreError::Backend {
                key: key.to_string(),
                source: Box::new(e),
            }),
            Err(_) => Err(StoreError::Timeout {
                key: key.to_string(),
                timeout_ms,
            }),
        }
    }

    /// Effective TTL derived from the aggregate's creation time:
    /// `min(base, absolute - age)`, never extending past the cap.
    fn effective_ttl(&self, created_at: DateTime<Utc>) -> EffectiveTtl {
        let base = self.config.ttl_seconds;
        let cap = self.config.absolute_ttl_seconds;
        if cap == 0 {
            return if base == 0 {
                EffectiveTtl::Unbounded
            } else {
                EffectiveTtl::Seconds(base)
            };
        }
        let age = (Utc::now() - created_at).num_seconds().max(0) as u64;
        if age >= cap {
            return EffectiveTtl::Expired;
        }
        let remaining = cap - age;
        let ttl = if base == 0 { remaining } else { base.min(remaining) };
        EffectiveTtl::Seconds(ttl.max(1))
    }

    async fn scan_partition_keys(&self, partition_key: &str) -> StoreResult<Vec<String>> {
        let pattern = self.partition_pattern(partition_key);
        let mut conn = self.conn().await?;
        let mut keys = Vec::new();
        let mut iter = conn
            .scan_match::<_, String>(&pattern)
            .await
            .map_err(|e| StoreError::Backend {
                key: pattern.clone(),
                source: Box::new(e),
            })?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    /// Deletes the given redis keys via one server-side script.
    async fn delete_keys(&self, keys: &[String]) -> StoreResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let mut invocation = BULK_DELETE_SCRIPT.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        let removed: i64 = self
            .run("<bulk-delete>", invocation.invoke_async(&mut conn))
            .await?;
        Ok(removed.max(0) as usize)
    }
}

/// Owner segment of a `<flowName>:<owner>:<instance>` storage key, used as
/// the default partition scope. Anonymous and free-form keys yield `None`.
fn owner_partition(flow_id: &str) -> Option<&str> {
    let mut parts = flow_id.splitn(3, ':');
    let _flow_name = parts.next()?;
    let owner = parts.next()?;
    parts.next()?;
    if owner.is_empty() || owner == ANONYMOUS_OWNER {
        None
    } else {
        Some(owner)
    }
}

#[async_trait]
impl FlowStore for RedisFlowStore {
    async fn save_aggregate(&self, aggregate: FlowAggregate) -> StoreResult<()> {
        let flow_id = aggregate.flow_id().to_string();
        require_flow_id(&flow_id)?;

        let partition = aggregate
            .meta
            .partition_key()
            .map(str::to_string)
            .or_else(|| owner_partition(&flow_id).map(str::to_string));
        let key = self.redis_key(partition.as_deref(), &flow_id);

        let mut conn = self.conn().await?;

        let mut aggregate = aggregate;
        let previous: Option<String> = self.run(&key, conn.get(&key)).await?;
        if let Some(raw) = previous {
            match serde_json::from_str::<FlowAggregate>(&raw) {
                Ok(prev) => absorb_previous(&mut aggregate, prev, self.config.history_limit),
                Err(e) => tracing::warn!(
                    key = %key,
                    error = %e,
                    "stored aggregate could not be decoded, overwriting"
                ),
            }
        }

        let payload = serde_json::to_string(&aggregate).map_err(|e| StoreError::Encode {
            key: key.clone(),
            source: e,
        })?;

        match self.effective_ttl(aggregate.meta.created_at) {
            EffectiveTtl::Expired => {
                tracing::debug!(key = %key, "absolute cap elapsed, skipping write");
                Ok(())
            }
            EffectiveTtl::Unbounded => self.run(&key, conn.set::<_, _, ()>(&key, payload)).await,
            EffectiveTtl::Seconds(ttl) => {
                tracing::debug!(key = %key, ttl, bytes = payload.len(), "writing aggregate");
                self.run(&key, conn.set_ex::<_, _, ()>(&key, payload, ttl))
                    .await
            }
        }
    }

    async fn load_aggregate(&self, flow_id: &str) -> StoreResult<Option<FlowAggregate>> {
        require_flow_id(flow_id)?;
        let key = self.key_for(flow_id);

        let mut conn = self.conn().await?;
        let raw: Option<String> = self.run(&key, conn.get(&key)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };

        let aggregate: FlowAggregate =
            serde_json::from_str(&raw).map_err(|e| StoreError::Decode {
                key: key.clone(),
                source: e,
            })?;

        if self.config.sliding_enabled && self.config.sliding_reset.applies_to_read() {
            if let EffectiveTtl::Seconds(ttl) = self.effective_ttl(aggregate.meta.created_at) {
                let _: bool = self.run(&key, conn.expire(&key, ttl as i64)).await?;
            }
        }

        Ok(Some(aggregate))
    }

    async fn delete(&self, flow_id: &str) -> StoreResult<bool> {
        require_flow_id(flow_id)?;
        let key = self.key_for(flow_id);
        let mut conn = self.conn().await?;
        let removed: i64 = self.run(&key, conn.del(&key)).await?;
        if removed > 0 {
            tracing::info!(key = %key, "deleted flow aggregate");
        }
        Ok(removed > 0)
    }

    async fn exists(&self, flow_id: &str) -> StoreResult<bool> {
        require_flow_id(flow_id)?;
        let key = self.key_for(flow_id);
        let mut conn = self.conn().await?;
        // EXISTS does not touch the key's TTL
        self.run(&key, conn.exists(&key)).await
    }

    async fn invalidate_by_partition(&self, partition_key: &str) -> StoreResult<usize> {
        require_partition_key(partition_key)?;
        let keys = self.scan_partition_keys(partition_key).await?;
        let removed = self.delete_keys(&keys).await?;
        tracing::info!(
            partition = partition_key,
            invalidated = removed,
            "invalidated redis flows by partition"
        );
        Ok(removed)
    }

    async fn list_active_flows(&self, partition_key: &str) -> StoreResult<HashSet<String>> {
        require_partition_key(partition_key)?;
        let keys = self.scan_partition_keys(partition_key).await?;
        let prefix = format!("{}{}:", self.config.key_prefix, partition_key);
        Ok(keys
            .iter()
            .filter_map(|key| key.strip_prefix(prefix.as_str())?.strip_suffix(AGGREGATE_SUFFIX))
            .map(str::to_string)
            .collect())
    }

    async fn bulk_delete(&self, flow_ids: &HashSet<String>) -> StoreResult<usize> {
        let keys: Vec<String> = flow_ids.iter().map(|id| self.key_for(id)).collect();
        self.delete_keys(&keys).await
    }
}

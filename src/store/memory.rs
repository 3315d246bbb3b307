//! In-memory flow store
//!
//! Backed by a bounded LRU cache with per-entry dynamic expiration. Expired
//! entries are treated as absent and removed lazily on access; the LRU
//! capacity bounds memory regardless of TTLs.

use std::{
    collections::HashSet,
    num::NonZeroUsize,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use super::{
    absorb_previous, require_flow_id, require_partition_key, FlowAggregate, FlowStore, StoreResult,
};
use crate::config::MemoryStoreConfig;

struct CacheEntry {
    aggregate: FlowAggregate,
    /// Creation time of the flow in this store; survives re-saves so the
    /// absolute cap is a true global deadline.
    created_at: Instant,
    /// Current expiration deadline; `None` when expiration is disabled.
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if now >= deadline)
    }
}

/// Bounded, thread-safe in-memory [`FlowStore`]
pub struct MemoryFlowStore {
    entries: Mutex<LruCache<String, CacheEntry>>,
    config: MemoryStoreConfig,
}

impl MemoryFlowStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.maximum_size.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MemoryStoreConfig::default())
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deadline for a freshly created entry: `min(ttl, absolute_ttl)` when
    /// the cap is set, else the base TTL alone.
    fn initial_deadline(&self, now: Instant) -> Option<Instant> {
        if self.config.ttl.is_zero() {
            return None;
        }
        let expire_in = if self.config.absolute_ttl > Duration::ZERO {
            self.config.ttl.min(self.config.absolute_ttl)
        } else {
            self.config.ttl
        };
        Some(now + expire_in)
    }

    /// Deadline after a qualifying sliding access:
    /// `min(ttl, absolute_ttl - age)` when capped, else the base TTL.
    fn sliding_deadline(&self, created_at: Instant, now: Instant) -> Option<Instant> {
        if self.config.ttl.is_zero() {
            return None;
        }
        if self.config.absolute_ttl > Duration::ZERO {
            let age = now.duration_since(created_at);
            let remaining = self.config.absolute_ttl.saturating_sub(age);
            Some(now + self.config.ttl.min(remaining))
        } else {
            Some(now + self.config.ttl)
        }
    }
}

#[async_trait]
impl FlowStore for MemoryFlowStore {
    async fn save_aggregate(&self, aggregate: FlowAggregate) -> StoreResult<()> {
        let flow_id = aggregate.flow_id().to_string();
        require_flow_id(&flow_id)?;

        let now = Instant::now();
        let mut aggregate = aggregate;
        let mut entries = self.entries.lock();

        let previous = entries.pop(&flow_id).filter(|e| !e.is_expired(now));
        let (created_at, expires_at) = match previous {
            Some(prev) => {
                absorb_previous(&mut aggregate, prev.aggregate, self.config.history_limit);
                let expires_at = if self.config.sliding_enabled
                    && self.config.sliding_reset.applies_to_write()
                {
                    self.sliding_deadline(prev.created_at, now)
                } else {
                    // non-qualifying access leaves the current deadline alone
                    prev.expires_at
                };
                (prev.created_at, expires_at)
            }
            None => (now, self.initial_deadline(now)),
        };

        entries.put(
            flow_id,
            CacheEntry {
                aggregate,
                created_at,
                expires_at,
            },
        );
        Ok(())
    }

    async fn load_aggregate(&self, flow_id: &str) -> StoreResult<Option<FlowAggregate>> {
        require_flow_id(flow_id)?;

        let now = Instant::now();
        let renew =
            self.config.sliding_enabled && self.config.sliding_reset.applies_to_read();
        let mut entries = self.entries.lock();

        let hit = match entries.get_mut(flow_id) {
            None => return Ok(None),
            Some(entry) if entry.is_expired(now) => None,
            Some(entry) => {
                if renew {
                    entry.expires_at = self.sliding_deadline(entry.created_at, now);
                }
                Some(entry.aggregate.clone())
            }
        };

        match hit {
            Some(aggregate) => Ok(Some(aggregate)),
            None => {
                entries.pop(flow_id);
                Ok(None)
            }
        }
    }

    async fn delete(&self, flow_id: &str) -> StoreResult<bool> {
        require_flow_id(flow_id)?;
        let now = Instant::now();
        match self.entries.lock().pop(flow_id) {
            Some(entry) if !entry.is_expired(now) => Ok(true),
            _ => Ok(false),
        }
    }

    async fn exists(&self, flow_id: &str) -> StoreResult<bool> {
        require_flow_id(flow_id)?;
        let now = Instant::now();
        // peek: no LRU promotion, no TTL side effect
        Ok(self
            .entries
            .lock()
            .peek(flow_id)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false))
    }

    async fn invalidate_by_partition(&self, partition_key: &str) -> StoreResult<usize> {
        require_partition_key(partition_key)?;

        let now = Instant::now();
        let mut entries = self.entries.lock();
        let matching: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| {
                !entry.is_expired(now)
                    && entry.aggregate.meta.partition_key() == Some(partition_key)
            })
            .map(|(flow_id, _)| flow_id.clone())
            .collect();

        for flow_id in &matching {
            entries.pop(flow_id);
        }
        tracing::info!(
            partition = partition_key,
            invalidated = matching.len(),
            "invalidated in-memory flows by partition"
        );
        Ok(matching.len())
    }

    async fn list_active_flows(&self, partition_key: &str) -> StoreResult<HashSet<String>> {
        require_partition_key(partition_key)?;

        let now = Instant::now();
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| {
                !entry.is_expired(now)
                    && entry.aggregate.meta.partition_key() == Some(partition_key)
            })
            .map(|(flow_id, _)| flow_id.clone())
            .collect())
    }

    async fn bulk_delete(&self, flow_ids: &HashSet<String>) -> StoreResult<usize> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let mut removed = 0;
        for flow_id in flow_ids {
            if let Some(entry) = entries.pop(flow_id) {
                if !entry.is_expired(now) {
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

//! Persistence layer: aggregate records and the store abstraction
//!
//! The unit of persistence is the [`FlowAggregate`]: housekeeping meta, the
//! current snapshot, and a bounded history of previous snapshots. Aggregates
//! are indexed by the flat storage-key string produced by
//! [`FlowKey::storage_key`](crate::flow::FlowKey::storage_key); throughout
//! this layer that string is called the *flow id*.

mod memory;
mod redis;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::flow::types::FlowContext;
pub use self::memory::MemoryFlowStore;
pub use self::redis::RedisFlowStore;

/// Default bound on the number of retained history snapshots.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Persistable record of one committed flow state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSnapshot {
    /// The storage key of the owning flow instance
    pub flow_id: String,
    pub step_id: crate::flow::types::StepId,
    pub is_completed: bool,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Housekeeping record paired with every aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowMeta {
    #[serde(rename = "flowContext")]
    pub context: FlowContext,
    pub status: String,
    pub step: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FlowMeta {
    pub const STATUS_NEW: &'static str = "NEW";
    pub const STATUS_RUNNING: &'static str = "RUNNING";
    pub const STATUS_COMPLETED: &'static str = "COMPLETED";

    /// Fresh meta for a newly created flow.
    pub fn create_new(context: FlowContext) -> Self {
        let now = Utc::now();
        Self {
            context,
            status: Self::STATUS_NEW.to_string(),
            step: "INIT".to_string(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn partition_key(&self) -> Option<&str> {
        self.context.effective_partition()
    }
}

/// The unit of persistence: meta + current snapshot + bounded history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowAggregate {
    pub meta: FlowMeta,
    pub current_snapshot: Option<FlowSnapshot>,
    #[serde(default)]
    pub snapshot_history: Vec<FlowSnapshot>,
}

impl FlowAggregate {
    pub fn new(meta: FlowMeta, current_snapshot: Option<FlowSnapshot>) -> Self {
        Self {
            meta,
            current_snapshot,
            snapshot_history: Vec::new(),
        }
    }

    /// Storage identity: the snapshot's flow id when present, else the
    /// context's instance id.
    pub fn flow_id(&self) -> &str {
        self.current_snapshot
            .as_ref()
            .map(|s| s.flow_id.as_str())
            .unwrap_or(self.meta.context.flow_id.as_str())
    }

    /// Appends a snapshot, retaining at most `max_size` entries (oldest
    /// evicted first). `max_size` of zero disables history.
    pub fn append_history(&mut self, snapshot: FlowSnapshot, max_size: usize) {
        if max_size == 0 {
            return;
        }
        self.snapshot_history.push(snapshot);
        if self.snapshot_history.len() > max_size {
            let overflow = self.snapshot_history.len() - max_size;
            self.snapshot_history.drain(..overflow);
        }
    }
}

/// Carries identity, version and history forward from the previously stored
/// aggregate: the original `created_at` stays (it anchors the absolute TTL
/// cap), the version is bumped, and the old current snapshot joins history.
pub(crate) fn absorb_previous(
    aggregate: &mut FlowAggregate,
    previous: FlowAggregate,
    history_limit: usize,
) {
    aggregate.meta.created_at = previous.meta.created_at;
    aggregate.meta.version = previous.meta.version.saturating_add(1);
    aggregate.snapshot_history = previous.snapshot_history;
    if let Some(snapshot) = previous.current_snapshot {
        aggregate.append_history(snapshot, history_limit);
    }
    if aggregate.snapshot_history.len() > history_limit {
        let overflow = aggregate.snapshot_history.len() - history_limit;
        aggregate.snapshot_history.drain(..overflow);
    }
}

/// Error kinds for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to initialize store backend: {0}")]
    Initialization(String),

    #[error("storage failure for key '{key}': {source}")]
    Backend {
        key: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to encode aggregate for key '{key}': {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode aggregate for key '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store command timed out after {timeout_ms} ms for key '{key}'")]
    Timeout { key: String, timeout_ms: u64 },
}

pub type StoreResult<T> = Result<T, StoreError>;

pub(crate) fn require_flow_id(flow_id: &str) -> StoreResult<()> {
    if flow_id.trim().is_empty() {
        return Err(StoreError::InvalidArgument(
            "flow id cannot be blank".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn require_partition_key(partition_key: &str) -> StoreResult<()> {
    if partition_key.trim().is_empty() {
        return Err(StoreError::InvalidArgument(
            "partition key cannot be blank".to_string(),
        ));
    }
    Ok(())
}

/// Abstraction over aggregate persistence.
///
/// Single-key writes are atomic. Bulk operations are best-effort and return
/// the number of aggregates actually removed. `exists` must not affect TTLs.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Persists an aggregate under its flow id, replacing any existing one.
    ///
    /// Implementations carry identity forward from a previously stored
    /// aggregate: `created_at` is preserved, the version is bumped, and the
    /// previous current snapshot is appended to the bounded history.
    async fn save_aggregate(&self, aggregate: FlowAggregate) -> StoreResult<()>;

    async fn load_aggregate(&self, flow_id: &str) -> StoreResult<Option<FlowAggregate>>;

    /// Removes the aggregate; returns whether one was present.
    async fn delete(&self, flow_id: &str) -> StoreResult<bool>;

    async fn exists(&self, flow_id: &str) -> StoreResult<bool>;

    /// Deletes every aggregate scoped to the partition; returns the count.
    async fn invalidate_by_partition(&self, partition_key: &str) -> StoreResult<usize>;

    /// Flow ids of all live aggregates within the partition.
    async fn list_active_flows(&self, partition_key: &str) -> StoreResult<HashSet<String>>;

    /// Best-effort bulk removal; returns how many of the ids existed.
    async fn bulk_delete(&self, flow_ids: &HashSet<String>) -> StoreResult<usize>;

    /// Convenience: owner-scoped invalidation via the default partitioning.
    async fn invalidate_by_owner(&self, owner_id: &str) -> StoreResult<usize> {
        self.invalidate_by_partition(owner_id).await
    }
}

//! Session management over the flow store
//!
//! A thin policy layer for bulk invalidation: user logout, security events,
//! and administrative cleanup across partitions. Security-relevant
//! invalidations pre-enumerate the affected flows for the audit log.

use std::{collections::HashSet, sync::Arc};

use crate::flow::types::{FlowError, FlowResult};
use crate::store::FlowStore;

pub struct SessionManager {
    store: Arc<dyn FlowStore>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn FlowStore>) -> Self {
        Self { store }
    }

    /// Invalidates all flows of a user on logout; returns the count removed.
    pub async fn invalidate_user_session(&self, user_id: &str) -> FlowResult<usize> {
        require_identifier(user_id, "userId")?;
        let invalidated = self.store.invalidate_by_partition(user_id).await?;
        tracing::info!(user_id, invalidated, "user logout: invalidated flows");
        Ok(invalidated)
    }

    /// Invalidates all flows in a partition after a security event (token
    /// revocation, suspicious activity). The active instances are enumerated
    /// first so the audit log records what was cut.
    pub async fn invalidate_on_security_event(
        &self,
        partition_key: &str,
        reason: &str,
    ) -> FlowResult<usize> {
        require_identifier(partition_key, "partitionKey")?;
        require_identifier(reason, "reason")?;

        let active = self.store.list_active_flows(partition_key).await?;
        tracing::warn!(
            partition = partition_key,
            reason,
            active = active.len(),
            "security event: invalidating active flows"
        );

        let invalidated = self.store.invalidate_by_partition(partition_key).await?;
        tracing::warn!(
            partition = partition_key,
            reason,
            invalidated,
            "security event: invalidation complete"
        );
        Ok(invalidated)
    }

    /// Targeted bulk invalidation of specific flow instances.
    pub async fn invalidate_flows(
        &self,
        flow_ids: &HashSet<String>,
        reason: Option<&str>,
    ) -> FlowResult<usize> {
        if flow_ids.is_empty() {
            tracing::debug!("no flows to invalidate");
            return Ok(0);
        }
        let invalidated = self.store.bulk_delete(flow_ids).await?;
        tracing::info!(
            reason = reason.unwrap_or("manual operation"),
            requested = flow_ids.len(),
            invalidated,
            "bulk flow invalidation"
        );
        Ok(invalidated)
    }

    /// Invalidates several partitions at once, skipping blank keys; returns
    /// the total count removed.
    pub async fn invalidate_multiple_partitions(
        &self,
        partition_keys: &HashSet<String>,
        reason: Option<&str>,
    ) -> FlowResult<usize> {
        if partition_keys.is_empty() {
            tracing::debug!("no partitions to invalidate");
            return Ok(0);
        }

        let mut total = 0;
        for partition_key in partition_keys {
            if partition_key.trim().is_empty() {
                continue;
            }
            let invalidated = self.store.invalidate_by_partition(partition_key).await?;
            tracing::debug!(partition = %partition_key, invalidated, "partition invalidated");
            total += invalidated;
        }

        tracing::info!(
            reason = reason.unwrap_or("bulk partition cleanup"),
            partitions = partition_keys.len(),
            invalidated = total,
            "multi-partition invalidation"
        );
        Ok(total)
    }

    /// Active flow instances within a partition, for monitoring and audits.
    pub async fn list_active_flows(&self, partition_key: &str) -> FlowResult<HashSet<String>> {
        require_identifier(partition_key, "partitionKey")?;
        let flows = self.store.list_active_flows(partition_key).await?;
        tracing::debug!(
            partition = partition_key,
            active = flows.len(),
            "listed active flows"
        );
        Ok(flows)
    }
}

fn require_identifier(value: &str, name: &str) -> FlowResult<()> {
    if value.trim().is_empty() {
        return Err(FlowError::InvalidArgument(format!(
            "{name} cannot be blank"
        )));
    }
    Ok(())
}

//! Backend-independent store behavior, run against every `FlowStore`
//! implementation by the contract test.

use std::collections::HashSet;

use serde_json::json;

use flowguard::flow::{FlowContext, StepId};
use flowguard::store::{FlowAggregate, FlowMeta, FlowSnapshot, FlowStore};

use super::unique_instance;

pub fn aggregate_for(owner: &str, instance: &str, step: &str) -> FlowAggregate {
    let flow_id = format!("contract:{owner}:{instance}");
    let snapshot = FlowSnapshot {
        flow_id: flow_id.clone(),
        step_id: StepId::new(step).unwrap(),
        is_completed: false,
        attributes: [("seq".to_string(), json!(step))].into_iter().collect(),
    };
    FlowAggregate::new(
        FlowMeta::create_new(FlowContext::for_user(instance, owner)),
        Some(snapshot),
    )
}

/// Save, load, overwrite, delete: the basic single-key lifecycle.
pub async fn single_key_lifecycle(store: &dyn FlowStore) {
    let owner = format!("owner-{}", unique_instance());
    let agg = aggregate_for(&owner, &unique_instance(), "s1");
    let flow_id = agg.flow_id().to_string();

    assert!(!store.exists(&flow_id).await.unwrap());
    assert!(store.load_aggregate(&flow_id).await.unwrap().is_none());

    store.save_aggregate(agg.clone()).await.unwrap();
    assert!(store.exists(&flow_id).await.unwrap());
    let loaded = store.load_aggregate(&flow_id).await.unwrap().unwrap();
    assert_eq!(loaded.flow_id(), flow_id);
    assert_eq!(
        loaded.current_snapshot.as_ref().unwrap().step_id.as_str(),
        "s1"
    );

    assert!(store.delete(&flow_id).await.unwrap());
    assert!(!store.exists(&flow_id).await.unwrap());
    assert!(!store.delete(&flow_id).await.unwrap());
}

/// Re-saving a key preserves `created_at`, bumps the version, and pushes the
/// previous snapshot into bounded history.
pub async fn resave_versioning(store: &dyn FlowStore) {
    let owner = format!("owner-{}", unique_instance());
    let instance = unique_instance();

    let first = aggregate_for(&owner, &instance, "s1");
    let flow_id = first.flow_id().to_string();
    let created_at = first.meta.created_at;

    store.save_aggregate(first).await.unwrap();
    store
        .save_aggregate(aggregate_for(&owner, &instance, "s2"))
        .await
        .unwrap();
    store
        .save_aggregate(aggregate_for(&owner, &instance, "s3"))
        .await
        .unwrap();

    let loaded = store.load_aggregate(&flow_id).await.unwrap().unwrap();
    assert_eq!(loaded.meta.created_at, created_at);
    assert_eq!(loaded.meta.version, 2);
    assert_eq!(loaded.snapshot_history.len(), 2);
    assert_eq!(loaded.snapshot_history[0].step_id.as_str(), "s1");
    assert_eq!(loaded.snapshot_history[1].step_id.as_str(), "s2");
    assert_eq!(
        loaded.current_snapshot.as_ref().unwrap().step_id.as_str(),
        "s3"
    );
}

/// Partition enumeration and invalidation only touch the named partition.
pub async fn partition_invalidation(store: &dyn FlowStore) {
    let p1 = format!("p1-{}", unique_instance());
    let p2 = format!("p2-{}", unique_instance());

    let mut p1_ids = Vec::new();
    for _ in 0..3 {
        let agg = aggregate_for(&p1, &unique_instance(), "s1");
        p1_ids.push(agg.flow_id().to_string());
        store.save_aggregate(agg).await.unwrap();
    }
    let p2_agg = aggregate_for(&p2, &unique_instance(), "s1");
    let p2_id = p2_agg.flow_id().to_string();
    store.save_aggregate(p2_agg).await.unwrap();

    let active = store.list_active_flows(&p1).await.unwrap();
    assert_eq!(active.len(), 3);
    for id in &p1_ids {
        assert!(active.contains(id), "missing {id} in {active:?}");
    }

    assert_eq!(store.invalidate_by_partition(&p1).await.unwrap(), 3);
    for id in &p1_ids {
        assert!(!store.exists(id).await.unwrap());
    }
    assert!(store.exists(&p2_id).await.unwrap());
    assert!(store.list_active_flows(&p1).await.unwrap().is_empty());

    // repeated invalidation finds nothing
    assert_eq!(store.invalidate_by_partition(&p1).await.unwrap(), 0);
}

/// `bulk_delete` returns the number of keys that actually existed, and the
/// keys are gone afterwards.
pub async fn bulk_delete_counts(store: &dyn FlowStore) {
    let owner = format!("owner-{}", unique_instance());
    let a = aggregate_for(&owner, &unique_instance(), "s1");
    let b = aggregate_for(&owner, &unique_instance(), "s1");
    let a_id = a.flow_id().to_string();
    let b_id = b.flow_id().to_string();
    store.save_aggregate(a).await.unwrap();
    store.save_aggregate(b).await.unwrap();

    let ids: HashSet<String> = [
        a_id.clone(),
        b_id.clone(),
        format!("contract:{owner}:missing"),
    ]
    .into_iter()
    .collect();

    assert_eq!(store.bulk_delete(&ids).await.unwrap(), 2);
    assert!(!store.exists(&a_id).await.unwrap());
    assert!(!store.exists(&b_id).await.unwrap());
    assert_eq!(store.bulk_delete(&ids).await.unwrap(), 0);
}

/// Blank identifiers are argument errors on every keyed operation.
pub async fn blank_identifiers_rejected(store: &dyn FlowStore) {
    assert!(store.load_aggregate(" ").await.is_err());
    assert!(store.exists("").await.is_err());
    assert!(store.delete("  ").await.is_err());
    assert!(store.invalidate_by_partition("").await.is_err());
    assert!(store.list_active_flows(" ").await.is_err());
}

/// Runs the whole contract against one backend.
pub async fn run_all(store: &dyn FlowStore) {
    single_key_lifecycle(store).await;
    resave_versioning(store).await;
    partition_invalidation(store).await;
    bulk_delete_counts(store).await;
    blank_identifiers_rejected(store).await;
}

#![allow(dead_code)]

pub mod redis_test_server;
pub mod store_contract;

use std::sync::Arc;

use serde_json::Value;

use flowguard::flow::{
    Attributes, DefinitionProvider, FlowDefinition, FlowEngine, FlowId, RegistryProvider,
    StepDefinition, StepId, Transition,
};
use flowguard::store::FlowStore;

pub fn step_id(s: &str) -> StepId {
    StepId::new(s).unwrap()
}

pub fn attrs(pairs: &[(&str, Value)]) -> Attributes {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// `s1 --to--> s2; s2 --EOF-->` under the given definition id.
pub fn two_step_definition(id: &str) -> FlowDefinition {
    FlowDefinition::builder(FlowId::new(id).unwrap(), step_id("s1"))
        .step(StepDefinition::simple(step_id("s1"), Transition::to(step_id("s2"))).unwrap())
        .step(StepDefinition::simple(step_id("s2"), Transition::eof()).unwrap())
        .build()
        .unwrap()
}

/// Engine over the given store with `definition` registered under `name`.
pub fn engine_with(
    store: Arc<dyn FlowStore>,
    name: &str,
    definition: FlowDefinition,
) -> (FlowEngine, Arc<FlowDefinition>) {
    let provider = Arc::new(RegistryProvider::new());
    provider.register(name, definition);
    let resolved = provider.definition(name).unwrap().unwrap();
    (FlowEngine::new(store, provider), resolved)
}

pub fn unique_instance() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Install the test log subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

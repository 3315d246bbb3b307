//! Flow engine: two-phase preview/persist execution
//!
//! The engine is a pure decision function over (stored aggregate, definition,
//! payload). A request handler first calls `preview_start` or
//! `preview_advance`, runs its business logic, and only then calls `persist`
//! to commit the new state. Previews never write, so they are safe to retry
//! with the same inputs.

use std::sync::Arc;

use super::{
    definition::{FlowDefinition, StepDefinition, Transition},
    provider::DefinitionProvider,
    state::{Attributes, FlowState},
    types::{FlowContext, FlowError, FlowKey, FlowResult},
};
use crate::store::{FlowAggregate, FlowMeta, FlowStore};

/// Payload key designating an explicit target step for `preview_advance`.
pub const TARGET_STEP_KEY: &str = "__targetStep";

/// Supplies the ambient partition key (tenant, shard) recorded with every
/// persisted aggregate. Without one, flows partition by owner.
pub trait PartitionProvider: Send + Sync {
    fn provide(&self) -> Option<String>;
}

/// The flow engine.
///
/// Stateless apart from its collaborators; executes on the caller's task and
/// blocks only on store I/O.
pub struct FlowEngine {
    store: Arc<dyn FlowStore>,
    definitions: Arc<dyn DefinitionProvider>,
    partition_provider: Option<Arc<dyn PartitionProvider>>,
}

impl FlowEngine {
    pub fn new(store: Arc<dyn FlowStore>, definitions: Arc<dyn DefinitionProvider>) -> Self {
        Self {
            store,
            definitions,
            partition_provider: None,
        }
    }

    pub fn with_partition_provider(mut self, provider: Arc<dyn PartitionProvider>) -> Self {
        self.partition_provider = Some(provider);
        self
    }

    /// `preview_start` followed by `persist`.
    pub async fn start(
        &self,
        key: &FlowKey,
        definition: &Arc<FlowDefinition>,
        initial_attributes: Attributes,
    ) -> FlowResult<FlowState> {
        let state = self.preview_start(key, definition, initial_attributes).await?;
        self.persist(key, &state).await?;
        Ok(state)
    }

    /// `preview_advance` followed by `persist`.
    pub async fn advance(
        &self,
        key: &FlowKey,
        definition: &Arc<FlowDefinition>,
        payload: &Attributes,
    ) -> FlowResult<FlowState> {
        let state = self.preview_advance(key, definition, payload).await?;
        self.persist(key, &state).await?;
        Ok(state)
    }

    /// Validates that no flow exists for `key` and builds the initial state
    /// at the definition's initial step. Observes the store only via
    /// `exists`; nothing is written until `persist`.
    pub async fn preview_start(
        &self,
        key: &FlowKey,
        definition: &Arc<FlowDefinition>,
        initial_attributes: Attributes,
    ) -> FlowResult<FlowState> {
        let storage_key = key.storage_key();
        if self.store.exists(&storage_key).await? {
            return Err(FlowError::AlreadyExists(storage_key));
        }
        tracing::debug!(key = %storage_key, definition = %definition.id(), "preview start");
        Ok(FlowState::create(Arc::clone(definition), initial_attributes))
    }

    /// Loads the current state, validates the flow is still running, selects
    /// exactly one transition, and returns the advanced state.
    pub async fn preview_advance(
        &self,
        key: &FlowKey,
        definition: &Arc<FlowDefinition>,
        payload: &Attributes,
    ) -> FlowResult<FlowState> {
        let current = self
            .get_state(key)
            .await?
            .ok_or_else(|| FlowError::NotFound(key.storage_key()))?;

        if current.is_completed() {
            return Err(FlowError::AlreadyCompleted(key.storage_key()));
        }

        let step = definition
            .step(current.current_step())
            .ok_or_else(|| FlowError::StepNotDefined {
                step: current.current_step().clone(),
                flow: definition.id().clone(),
            })?;

        let transition = find_next_transition(step, payload, &current)?;
        tracing::debug!(
            key = %key,
            from = %step.id(),
            to = transition.target().map(|t| t.as_str()).unwrap_or("<end>"),
            "preview advance"
        );
        Ok(current.advance(transition, payload))
    }

    /// Commits a previewed state: builds the persistence context, snapshots
    /// the state, and writes the aggregate in one atomic store operation.
    pub async fn persist(&self, key: &FlowKey, state: &FlowState) -> FlowResult<()> {
        let storage_key = key.storage_key();
        let context = self.build_context(key);

        let mut meta = FlowMeta::create_new(context);
        meta.step = state.current_step().to_string();
        meta.status = if state.is_completed() {
            FlowMeta::STATUS_COMPLETED.to_string()
        } else {
            FlowMeta::STATUS_RUNNING.to_string()
        };

        let snapshot = state.to_snapshot(storage_key.clone());
        let aggregate = FlowAggregate::new(meta, Some(snapshot));
        self.store.save_aggregate(aggregate).await?;

        tracing::info!(
            key = %storage_key,
            step = %state.current_step(),
            completed = state.is_completed(),
            "persisted flow state"
        );
        Ok(())
    }

    /// Rehydrates the current state from the stored aggregate and the
    /// definition registered under the key's flow name.
    pub async fn get_state(&self, key: &FlowKey) -> FlowResult<Option<FlowState>> {
        let storage_key = key.storage_key();
        let Some(aggregate) = self.store.load_aggregate(&storage_key).await? else {
            return Ok(None);
        };
        let Some(snapshot) = aggregate.current_snapshot else {
            tracing::debug!(key = %storage_key, "aggregate has no current snapshot");
            return Ok(None);
        };

        let definition = self
            .definitions
            .definition(key.flow_name())?
            .ok_or_else(|| FlowError::DefinitionNotFound(key.flow_name().to_string()))?;

        Ok(Some(FlowState::from_snapshot(definition, &snapshot)))
    }

    /// Removes the flow instance; returns whether one existed.
    pub async fn delete(&self, key: &FlowKey) -> FlowResult<bool> {
        Ok(self.store.delete(&key.storage_key()).await?)
    }

    fn build_context(&self, key: &FlowKey) -> FlowContext {
        let ambient = self.partition_provider.as_ref().and_then(|p| p.provide());
        match (ambient, key.owner_id()) {
            (Some(partition), owner) => {
                FlowContext::with_partition(key.instance_id(), owner.map(str::to_string), partition)
            }
            (None, Some(owner)) => FlowContext::for_user(key.instance_id(), owner),
            (None, None) => FlowContext::anonymous(key.instance_id()),
        }
    }
}

/// Selects the single transition to take out of `step`.
///
/// An explicit `__targetStep` in the payload is resolved first and must be
/// satisfied; there is no fallback to ordered evaluation. Otherwise the
/// conditions are evaluated in declaration order and exactly one must match.
fn find_next_transition<'a>(
    step: &'a StepDefinition,
    payload: &Attributes,
    state: &FlowState,
) -> FlowResult<&'a Transition> {
    if let Some(value) = payload.get(TARGET_STEP_KEY) {
        let target = value.as_str().ok_or_else(|| {
            FlowError::InvalidArgument(format!(
                "payload key '{TARGET_STEP_KEY}' must be a string, got: {value}"
            ))
        })?;
        return step
            .transitions()
            .iter()
            .find(|t| t.target().is_some_and(|to| to.as_str() == target))
            .filter(|t| t.is_satisfied(state))
            .ok_or_else(|| FlowError::TargetUnreachable {
                from: step.id().clone(),
                target: target.to_string(),
            });
    }

    let satisfied: Vec<&Transition> = step
        .transitions()
        .iter()
        .filter(|t| t.is_satisfied(state))
        .collect();

    match satisfied.as_slice() {
        [single] => Ok(single),
        [] => Err(FlowError::NoSatisfiedTransition(step.id().clone())),
        _ => Err(FlowError::AmbiguousTransition(step.id().clone())),
    }
}

//! Runtime flow state
//!
//! `FlowState` is immutable: advancing produces a new value, which keeps the
//! engine a pure function over (stored aggregate, definition, payload) and
//! makes previews safe to retry.

use std::sync::Arc;

use serde_json::Value;

use super::{
    definition::{FlowDefinition, Transition},
    types::StepId,
};
use crate::store::FlowSnapshot;

/// Attribute map carried by a flow instance and merged on every advance.
pub type Attributes = serde_json::Map<String, Value>;

/// The runtime state of one flow instance
#[derive(Debug, Clone)]
pub struct FlowState {
    definition: Arc<FlowDefinition>,
    current_step: StepId,
    completed: bool,
    attributes: Attributes,
}

impl FlowState {
    /// Initial state at the definition's initial step.
    pub fn create(definition: Arc<FlowDefinition>, initial_attributes: Attributes) -> Self {
        let current_step = definition.initial_step().clone();
        Self {
            definition,
            current_step,
            completed: false,
            attributes: initial_attributes,
        }
    }

    /// Rehydrates a state from a persisted snapshot.
    pub fn from_snapshot(definition: Arc<FlowDefinition>, snapshot: &FlowSnapshot) -> Self {
        Self {
            definition,
            current_step: snapshot.step_id.clone(),
            completed: snapshot.is_completed,
            attributes: snapshot.attributes.clone(),
        }
    }

    /// Returns the state after taking `transition`, merging `payload` into
    /// the attributes. An end-of-flow transition marks the state completed
    /// and leaves the current step unchanged.
    pub fn advance(&self, transition: &Transition, payload: &Attributes) -> Self {
        let mut attributes = self.attributes.clone();
        for (k, v) in payload {
            attributes.insert(k.clone(), v.clone());
        }

        match transition.target() {
            Some(next) => Self {
                definition: Arc::clone(&self.definition),
                current_step: next.clone(),
                completed: false,
                attributes,
            },
            None => Self {
                definition: Arc::clone(&self.definition),
                current_step: self.current_step.clone(),
                completed: true,
                attributes,
            },
        }
    }

    /// Snapshot of this state for persistence; `flow_id` is the storage key.
    pub fn to_snapshot(&self, flow_id: impl Into<String>) -> FlowSnapshot {
        FlowSnapshot {
            flow_id: flow_id.into(),
            step_id: self.current_step.clone(),
            is_completed: self.completed,
            attributes: self.attributes.clone(),
        }
    }

    pub fn definition(&self) -> &Arc<FlowDefinition> {
        &self.definition
    }

    pub fn current_step(&self) -> &StepId {
        &self.current_step
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

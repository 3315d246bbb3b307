//! Flow definition types
//!
//! A flow is a directed graph of steps; every step declares an ordered list
//! of outgoing transitions, each either pointing at a next step (optionally
//! guarded by a predicate) or marking the end of the flow.

use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use super::{
    state::FlowState,
    types::{FlowError, FlowId, FlowResult, StepId},
};

/// A predicate evaluated against the current state to decide whether a
/// transition may be taken.
pub type TransitionCondition = Arc<dyn Fn(&FlowState) -> bool + Send + Sync>;

/// How a step navigates to its successor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NavigationType {
    /// Exactly one outgoing transition
    #[default]
    Simple,
    /// Multiple conditional transitions; ambiguity requires an explicit target
    Complex,
}

enum TransitionKind {
    Step(StepId),
    EndOfFlow,
}

/// A single outgoing edge of a step.
///
/// Declaration order is significant: when no explicit target is requested,
/// the engine evaluates conditions in order and requires exactly one match.
#[derive(Clone)]
pub struct Transition {
    kind: Arc<TransitionKind>,
    condition: TransitionCondition,
}

impl Transition {
    /// Unconditional transition to the given step.
    pub fn to(step: StepId) -> Self {
        Self {
            kind: Arc::new(TransitionKind::Step(step)),
            condition: Arc::new(|_| true),
        }
    }

    /// Conditional transition to the given step.
    pub fn when<F>(step: StepId, condition: F) -> Self
    where
        F: Fn(&FlowState) -> bool + Send + Sync + 'static,
    {
        Self {
            kind: Arc::new(TransitionKind::Step(step)),
            condition: Arc::new(condition),
        }
    }

    /// End-of-flow marker: taking it completes the flow on the current step.
    pub fn eof() -> Self {
        Self {
            kind: Arc::new(TransitionKind::EndOfFlow),
            condition: Arc::new(|_| true),
        }
    }

    pub fn is_satisfied(&self, state: &FlowState) -> bool {
        (self.condition)(state)
    }

    pub fn is_end_of_flow(&self) -> bool {
        matches!(*self.kind, TransitionKind::EndOfFlow)
    }

    /// The destination step, or `None` for an end-of-flow transition.
    pub fn target(&self) -> Option<&StepId> {
        match &*self.kind {
            TransitionKind::Step(step) => Some(step),
            TransitionKind::EndOfFlow => None,
        }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("to", &self.target())
            .field("end_of_flow", &self.is_end_of_flow())
            .field("condition", &"<condition>")
            .finish()
    }
}

/// Definition of a single step within a flow
#[derive(Debug, Clone)]
pub struct StepDefinition {
    id: StepId,
    navigation_type: NavigationType,
    transitions: Vec<Transition>,
}

impl StepDefinition {
    pub fn new(
        id: StepId,
        navigation_type: NavigationType,
        transitions: Vec<Transition>,
    ) -> FlowResult<Self> {
        if transitions.is_empty() {
            return Err(FlowError::Definition(format!(
                "step '{id}' must declare at least one transition (or end-of-flow)"
            )));
        }
        if navigation_type == NavigationType::Simple && transitions.len() > 1 {
            return Err(FlowError::Definition(format!(
                "step '{id}' with SIMPLE navigation can declare only one transition"
            )));
        }
        Ok(Self {
            id,
            navigation_type,
            transitions,
        })
    }

    /// A SIMPLE step with its single transition.
    pub fn simple(id: StepId, transition: Transition) -> FlowResult<Self> {
        Self::new(id, NavigationType::Simple, vec![transition])
    }

    /// A COMPLEX step with ordered conditional transitions.
    pub fn complex(id: StepId, transitions: Vec<Transition>) -> FlowResult<Self> {
        Self::new(id, NavigationType::Complex, transitions)
    }

    pub fn id(&self) -> &StepId {
        &self.id
    }

    pub fn navigation_type(&self) -> NavigationType {
        self.navigation_type
    }

    /// Outgoing transitions in declaration order.
    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }
}

/// Immutable, validated flow definition.
///
/// Steps keep their declaration order; lookups go through a pre-built index.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    id: FlowId,
    initial_step: StepId,
    steps: Vec<StepDefinition>,
    index: HashMap<StepId, usize>,
}

impl FlowDefinition {
    pub fn builder(id: FlowId, initial_step: StepId) -> FlowDefinitionBuilder {
        FlowDefinitionBuilder {
            id,
            initial_step,
            steps: Vec::new(),
        }
    }

    pub fn id(&self) -> &FlowId {
        &self.id
    }

    pub fn initial_step(&self) -> &StepId {
        &self.initial_step
    }

    /// Steps in declaration order.
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn step(&self, id: &StepId) -> Option<&StepDefinition> {
        self.index.get(id).map(|&i| &self.steps[i])
    }
}

/// Builder for [`FlowDefinition`]; invariants are checked at [`build`].
///
/// [`build`]: FlowDefinitionBuilder::build
pub struct FlowDefinitionBuilder {
    id: FlowId,
    initial_step: StepId,
    steps: Vec<StepDefinition>,
}

impl FlowDefinitionBuilder {
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    pub fn build(self) -> FlowResult<FlowDefinition> {
        let mut index = HashMap::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            if index.insert(step.id().clone(), i).is_some() {
                return Err(FlowError::Definition(format!(
                    "duplicate step id '{}' in flow definition '{}'",
                    step.id(),
                    self.id
                )));
            }
        }
        if !index.contains_key(&self.initial_step) {
            return Err(FlowError::Definition(format!(
                "initial step '{}' is not present in the steps of flow definition '{}'",
                self.initial_step, self.id
            )));
        }
        Ok(FlowDefinition {
            id: self.id,
            initial_step: self.initial_step,
            steps: self.steps,
            index,
        })
    }
}

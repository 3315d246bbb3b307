//! Synchronous flow execution to completion
//!
//! A high-level utility that drives a flow through the engine step by step
//! until it completes or a step budget runs out. Useful for automated tests,
//! batch processing, and definition smoke checks.

use std::sync::Arc;

use uuid::Uuid;

use super::{
    definition::FlowDefinition,
    engine::FlowEngine,
    state::Attributes,
    types::{FlowError, FlowKey, FlowResult, StepId},
};

/// Owner segment used for runner-driven flow instances.
const RUNNER_OWNER: &str = "runner";

/// Summary of a completed (or exhausted) flow run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub completed: bool,
    pub steps_executed: u32,
    pub last_step: StepId,
}

pub struct FlowRunner {
    engine: FlowEngine,
}

impl FlowRunner {
    pub fn new(engine: FlowEngine) -> Self {
        Self { engine }
    }

    /// Runs a flow under a generated instance id.
    ///
    /// The definition must be resolvable through the engine's definition
    /// provider under its own id, since every advance rehydrates state by
    /// that name.
    pub async fn run(
        &self,
        definition: &Arc<FlowDefinition>,
        initial_attributes: Attributes,
        max_steps: u32,
    ) -> FlowResult<ExecutionReport> {
        let instance_id = Uuid::new_v4().to_string();
        self.run_to_end(&instance_id, definition, initial_attributes, max_steps)
            .await
    }

    /// Runs a flow to completion, advancing with empty payloads, stopping
    /// after `max_steps` advances at the latest.
    pub async fn run_to_end(
        &self,
        instance_id: &str,
        definition: &Arc<FlowDefinition>,
        initial_attributes: Attributes,
        max_steps: u32,
    ) -> FlowResult<ExecutionReport> {
        if max_steps == 0 {
            return Err(FlowError::InvalidArgument(
                "maxSteps must be greater than zero".to_string(),
            ));
        }

        let key = FlowKey::for_owner(definition.id().as_str(), RUNNER_OWNER, instance_id)?;
        tracing::info!(key = %key, definition = %definition.id(), "starting flow run");

        let mut state = self.engine.start(&key, definition, initial_attributes).await?;
        let mut steps = 0;
        while !state.is_completed() && steps < max_steps {
            state = self.engine.advance(&key, definition, &Attributes::new()).await?;
            steps += 1;
        }

        if state.is_completed() {
            tracing::info!(key = %key, steps, "flow run completed");
        } else {
            tracing::warn!(key = %key, steps, "flow run stopped before completion");
        }

        Ok(ExecutionReport {
            completed: state.is_completed(),
            steps_executed: steps,
            last_step: state.current_step().clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{
        definition::{StepDefinition, Transition},
        provider::RegistryProvider,
        types::{FlowId, StepId},
    };
    use crate::store::MemoryFlowStore;

    fn step_id(s: &str) -> StepId {
        StepId::new(s).unwrap()
    }

    fn linear_definition(id: &str, steps: usize) -> FlowDefinition {
        let mut builder = FlowDefinition::builder(FlowId::new(id).unwrap(), step_id("s0"));
        for i in 0..steps {
            let this = step_id(&format!("s{i}"));
            let transition = if i + 1 == steps {
                Transition::eof()
            } else {
                Transition::to(step_id(&format!("s{}", i + 1)))
            };
            builder = builder.step(StepDefinition::simple(this, transition).unwrap());
        }
        builder.build().unwrap()
    }

    fn runner_for(id: &str, steps: usize) -> (FlowRunner, Arc<FlowDefinition>) {
        let provider = Arc::new(RegistryProvider::new());
        provider.register(id, linear_definition(id, steps));
        let definition = {
            use crate::flow::provider::DefinitionProvider;
            provider.definition(id).unwrap().unwrap()
        };
        let engine = FlowEngine::new(Arc::new(MemoryFlowStore::with_defaults()), provider);
        (FlowRunner::new(engine), definition)
    }

    #[tokio::test]
    async fn runs_linear_flow_to_completion() {
        let (runner, definition) = runner_for("linear", 3);
        let report = runner.run(&definition, Attributes::new(), 10).await.unwrap();

        assert!(report.completed);
        assert_eq!(report.steps_executed, 3);
        assert_eq!(report.last_step, step_id("s2"));
    }

    #[tokio::test]
    async fn stops_at_step_budget() {
        let (runner, definition) = runner_for("long", 10);
        let report = runner.run(&definition, Attributes::new(), 4).await.unwrap();

        assert!(!report.completed);
        assert_eq!(report.steps_executed, 4);
        assert_eq!(report.last_step, step_id("s4"));
    }

    #[tokio::test]
    async fn zero_max_steps_is_an_argument_error() {
        let (runner, definition) = runner_for("strict", 2);
        let result = runner.run(&definition, Attributes::new(), 0).await;
        assert!(matches!(result, Err(FlowError::InvalidArgument(_))));
    }
}

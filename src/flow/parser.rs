//! JSON flow definition parser
//!
//! Deserializes a [`FlowDefinition`] from a string, byte slice, or file.
//! Unknown properties are ignored for forward compatibility. Parsed
//! transitions carry the always-true condition; conditional transitions are
//! constructed programmatically.

use std::path::Path;

use serde::Deserialize;

use super::{
    definition::{FlowDefinition, NavigationType, StepDefinition, Transition},
    types::{FlowError, FlowId, FlowResult, StepId},
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlowDocument {
    id: String,
    initial_step: String,
    steps: Vec<StepDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StepDocument {
    id: String,
    #[serde(default)]
    navigation_type: NavigationType,
    transitions: Vec<TransitionDocument>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitionDocument {
    #[serde(default)]
    to: Option<String>,
    #[serde(default)]
    end_of_flow: Option<bool>,
}

/// Parses a flow definition from JSON text.
pub fn parse_str(content: &str) -> FlowResult<FlowDefinition> {
    parse_document(
        serde_json::from_str(content).map_err(|e| parse_error("string", e))?,
        "string",
    )
}

/// Parses a flow definition from raw JSON bytes.
pub fn parse_slice(content: &[u8]) -> FlowResult<FlowDefinition> {
    parse_document(
        serde_json::from_slice(content).map_err(|e| parse_error("bytes", e))?,
        "bytes",
    )
}

/// Loads and parses a flow definition from a JSON file.
pub fn parse_file(path: &Path) -> FlowResult<FlowDefinition> {
    let origin = path.display().to_string();
    tracing::info!(path = %origin, "loading flow definition");
    let content = std::fs::read(path).map_err(|e| FlowError::Parse {
        origin: origin.clone(),
        reason: e.to_string(),
    })?;
    parse_document(
        serde_json::from_slice(&content).map_err(|e| parse_error(&origin, e))?,
        &origin,
    )
}

fn parse_error(origin: &str, source: serde_json::Error) -> FlowError {
    FlowError::Parse {
        origin: origin.to_string(),
        reason: source.to_string(),
    }
}

fn parse_document(document: FlowDocument, origin: &str) -> FlowResult<FlowDefinition> {
    let id = FlowId::new(document.id)?;
    let initial_step = StepId::new(document.initial_step)?;

    let mut builder = FlowDefinition::builder(id, initial_step);
    for step in document.steps {
        let step_id = StepId::new(step.id)?;
        let mut transitions = Vec::with_capacity(step.transitions.len());
        for transition in step.transitions {
            transitions.push(build_transition(transition, &step_id, origin)?);
        }
        builder = builder.step(StepDefinition::new(
            step_id,
            step.navigation_type,
            transitions,
        )?);
    }
    builder.build()
}

fn build_transition(
    document: TransitionDocument,
    step_id: &StepId,
    origin: &str,
) -> FlowResult<Transition> {
    match (document.to, document.end_of_flow) {
        (Some(to), None | Some(false)) => Ok(Transition::to(StepId::new(to)?)),
        (None, Some(true)) => Ok(Transition::eof()),
        (Some(to), Some(true)) => Err(FlowError::Parse {
            origin: origin.to_string(),
            reason: format!(
                "transition of step '{step_id}' cannot both lead to '{to}' and end the flow"
            ),
        }),
        (None, _) => Err(FlowError::Parse {
            origin: origin.to_string(),
            reason: format!(
                "transition of step '{step_id}' must either lead to a step or end the flow"
            ),
        }),
    }
}

//! Core flow identifier types and errors

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// Owner segment used in storage keys when a flow has no owner.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Unique identifier for a flow definition
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(String);

impl FlowId {
    pub fn new(value: impl Into<String>) -> FlowResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(FlowError::InvalidArgument(
                "flow id cannot be blank".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a step within a flow
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(String);

impl StepId {
    pub fn new(value: impl Into<String>) -> FlowResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(FlowError::InvalidArgument(
                "step id cannot be blank".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite key identifying one running flow instance.
///
/// Combines the business process name, the owner's identity, and the unique
/// instance identifier. Serializes to a colon-delimited storage key, so none
/// of the components may contain `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    flow_name: String,
    owner_id: Option<String>,
    instance_id: String,
}

impl FlowKey {
    pub fn new(
        flow_name: impl Into<String>,
        owner_id: Option<String>,
        instance_id: impl Into<String>,
    ) -> FlowResult<Self> {
        let flow_name = validate_key_component(flow_name.into(), "flowName")?;
        let instance_id = validate_key_component(instance_id.into(), "instanceId")?;
        let owner_id = owner_id
            .map(|o| validate_key_component(o, "ownerId"))
            .transpose()?;
        Ok(Self {
            flow_name,
            owner_id,
            instance_id,
        })
    }

    pub fn anonymous(
        flow_name: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> FlowResult<Self> {
        Self::new(flow_name, None, instance_id)
    }

    pub fn for_owner(
        flow_name: impl Into<String>,
        owner_id: impl Into<String>,
        instance_id: impl Into<String>,
    ) -> FlowResult<Self> {
        Self::new(flow_name, Some(owner_id.into()), instance_id)
    }

    /// The business process name, which doubles as the definition lookup name.
    pub fn flow_name(&self) -> &str {
        &self.flow_name
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Flattened representation used as the key in every store backend.
    ///
    /// Example: `moneyTransfer:customer-12345:abc-def-ghi`; anonymous flows use
    /// the literal `anonymous` owner segment.
    pub fn storage_key(&self) -> String {
        let owner = self.owner_id.as_deref().unwrap_or(ANONYMOUS_OWNER);
        format!("{}:{}:{}", self.flow_name, owner, self.instance_id)
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

fn validate_key_component(value: String, name: &str) -> FlowResult<String> {
    if value.trim().is_empty() {
        return Err(FlowError::InvalidArgument(format!(
            "{name} cannot be blank"
        )));
    }
    if value.contains(':') {
        return Err(FlowError::InvalidArgument(format!(
            "{name} cannot contain ':' (reserved storage key delimiter): {value}"
        )));
    }
    Ok(value)
}

/// Identity and partitioning context persisted alongside a flow.
///
/// The effective partition defaults to the owner id when no explicit
/// partition key is set; anonymous contexts leave both unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowContext {
    pub flow_id: String,
    pub owner_id: Option<String>,
    pub partition_key: Option<String>,
}

impl FlowContext {
    pub fn anonymous(flow_id: impl Into<String>) -> Self {
        Self {
            flow_id: flow_id.into(),
            owner_id: None,
            partition_key: None,
        }
    }

    /// User-scoped context: the owner doubles as the partition.
    pub fn for_user(flow_id: impl Into<String>, owner_id: impl Into<String>) -> Self {
        let owner_id = owner_id.into();
        Self {
            flow_id: flow_id.into(),
            partition_key: Some(owner_id.clone()),
            owner_id: Some(owner_id),
        }
    }

    pub fn with_partition(
        flow_id: impl Into<String>,
        owner_id: Option<String>,
        partition_key: impl Into<String>,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            owner_id,
            partition_key: Some(partition_key.into()),
        }
    }

    /// The partition this flow is scoped to, falling back to the owner id.
    pub fn effective_partition(&self) -> Option<&str> {
        self.partition_key
            .as_deref()
            .or(self.owner_id.as_deref())
            .filter(|p| !p.is_empty())
    }
}

/// Error kinds for flow operations
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to parse flow definition from {origin}: {reason}")]
    Parse { origin: String, reason: String },

    #[error("invalid flow definition: {0}")]
    Definition(String),

    #[error("flow definition not found: {0}")]
    DefinitionNotFound(String),

    #[error("a flow with key '{0}' already exists")]
    AlreadyExists(String),

    #[error("no flow found with key '{0}'")]
    NotFound(String),

    #[error("the flow with key '{0}' is already completed and cannot be advanced")]
    AlreadyCompleted(String),

    #[error("step '{step}' is not defined in flow definition '{flow}'")]
    StepNotDefined { step: StepId, flow: FlowId },

    #[error("no valid transition from step '{from}' to target step '{target}'")]
    TargetUnreachable { from: StepId, target: String },

    #[error("no satisfied transition found for step '{0}'")]
    NoSatisfiedTransition(StepId),

    #[error("multiple transitions are satisfied from step '{0}' but no target step was specified")]
    AmbiguousTransition(StepId),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type FlowResult<T> = Result<T, FlowError>;

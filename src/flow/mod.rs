//! Flow definitions, runtime state, and the execution engine

mod definition;
mod engine;
mod parser;
mod provider;
mod runner;
mod state;
pub mod types;

pub use definition::{
    FlowDefinition, FlowDefinitionBuilder, NavigationType, StepDefinition, Transition,
    TransitionCondition,
};
pub use engine::{FlowEngine, PartitionProvider, TARGET_STEP_KEY};
pub use parser::{parse_file, parse_slice, parse_str};
pub use provider::{DefinitionProvider, DirectoryProvider, RegistryProvider};
pub use runner::{ExecutionReport, FlowRunner};
pub use state::{Attributes, FlowState};
pub use types::{FlowContext, FlowError, FlowId, FlowKey, FlowResult, StepId};

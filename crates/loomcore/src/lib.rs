//! Core abstractions for the loom dataflow engine
//!
//! This crate holds the workflow model (ports, links, merges, processors,
//! iteration strategies and dispatch stacks), the edits that are the only way
//! to change it, validation, tokens and events, and the activity contract.
//! Nothing in here executes a dataflow; that lives in `loomruntime`.

mod activity;
mod dataflow;
mod datalink;
pub mod dispatch;
pub mod document;
pub mod edits;
mod error;
pub mod events;
pub mod iteration;
mod merge;
mod port;
mod processor;
mod token;
mod validation;
mod value;

pub use activity::{Activity, ActivityOutput, ActivitySpec, InvocationContext, InvocationMetadata};
pub use dataflow::{Condition, Dataflow};
pub use datalink::{Datalink, Sink, Source};
pub use dispatch::{DispatchLayerSpec, DispatchStack, ParallelizeConfig, RetryConfig, StopConfig};
pub use document::DataflowDocument;
pub use error::{
    ActivityError, DispatchError, EditError, FlowError, IterationError, NamingError, ProcessFailure,
    WorkflowStructureError,
};
pub use events::*;
pub use iteration::{IterationNode, IterationStrategy, IterationStrategyStack};
pub use merge::Merge;
pub use port::{Port, PortRole};
pub use processor::Processor;
pub use token::{Datum, IndexPath, OwningProcess, ProcessSegment, Token, TokenKind};
pub use validation::{EntityKind, EntityReport, EntityStatus, PortDepth, UnsatisfiedReason, ValidationReport};
pub use value::{json_to_value, value_to_json, ErrorDocument, Value};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;

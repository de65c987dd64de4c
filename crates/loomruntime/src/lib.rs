//! Dataflow execution runtime
//!
//! This crate turns validated dataflow models into running instances: the
//! activity and dispatch layer registries, the runtime layers themselves,
//! iteration expansion, merges, and the per-run token routing.

mod failure;
pub mod iteration;
pub mod layers;
mod instance;
mod merge;
mod monitor;
mod nested;
mod processor;
mod registry;
mod runtime;

pub use failure::{FailureListener, FailureTransmitter};
pub use instance::{DataflowInstance, OutputToken, RunHandle, RunResult};
pub use layers::{DispatchLayer, LayerProperties};
pub use merge::MergeRuntime;
pub use monitor::{Monitor, MonitorNode, MonitorNodeKind};
pub use nested::NestedDataflowActivity;
pub use registry::{ActivityFactory, ActivityMetadata, ActivityRegistry, LayerConstructor, LayerRegistry, PortDefinition};
pub use runtime::{LoomRuntime, RuntimeConfig};

use crate::{ActivityError, Dataflow, EventEmitter, IndexPath, OwningProcess, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Implementation a processor invokes once per job
#[async_trait]
pub trait Activity: Send + Sync {
    /// Type identifier the activity was registered under (e.g. "text.concat")
    fn activity_type(&self) -> &str;

    /// Run the activity for one job.
    ///
    /// Called without any engine lock held; activities that keep state must
    /// guard it themselves.
    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError>;
}

/// Everything an activity sees of the job it runs for
#[derive(Clone)]
pub struct InvocationContext {
    /// Process of this invocation, nested below the processor's process
    pub owning_process: OwningProcess,

    pub processor: String,

    /// Job index within the processor's iteration
    pub index: IndexPath,

    /// Input values keyed by activity port name
    pub inputs: HashMap<String, Value>,

    /// Static configuration of the bound activity
    pub config: HashMap<String, Value>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancelled when the run is cancelled
    pub cancellation: tokio_util::sync::CancellationToken,
}

impl InvocationContext {
    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, ActivityError> {
        self.inputs
            .get(name)
            .ok_or_else(|| ActivityError::MissingInput(name.to_string()))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, ActivityError> {
        let value = self.require_input(name)?;
        value.as_str().ok_or_else(|| ActivityError::InvalidInputType {
            field: name.to_string(),
            expected: "string".to_string(),
            actual: value.type_name().to_string(),
        })
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Value, ActivityError> {
        self.config
            .get(name)
            .ok_or_else(|| ActivityError::Configuration(format!("Missing config: {}", name)))
    }

    /// Get config with default
    pub fn get_config_or(&self, name: &str, default: Value) -> Value {
        self.config.get(name).cloned().unwrap_or(default)
    }
}

/// Output from one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityOutput {
    /// Output values keyed by activity port name
    pub outputs: HashMap<String, Value>,

    pub metadata: InvocationMetadata,
}

impl ActivityOutput {
    pub fn new() -> Self {
        Self {
            outputs: HashMap::new(),
            metadata: InvocationMetadata::default(),
        }
    }

    pub fn with_output(mut self, port: impl Into<String>, value: impl Into<Value>) -> Self {
        self.outputs.insert(port.into(), value.into());
        self
    }
}

impl Default for ActivityOutput {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata about an invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvocationMetadata {
    pub execution_time_ms: u64,
    pub custom: HashMap<String, Value>,
}

/// An activity bound to a processor.
///
/// Port mappings translate processor port names to the activity's own port
/// names; unmapped ports keep their processor name. Nested dataflow
/// activities carry the dataflow they run.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivitySpec {
    pub activity_type: String,
    pub config: HashMap<String, Value>,
    pub input_mapping: BTreeMap<String, String>,
    pub output_mapping: BTreeMap<String, String>,
    pub nested: Option<Box<Dataflow>>,
}

impl ActivitySpec {
    pub const NESTED_DATAFLOW: &'static str = "dataflow";

    pub fn new(activity_type: impl Into<String>) -> Self {
        Self {
            activity_type: activity_type.into(),
            config: HashMap::new(),
            input_mapping: BTreeMap::new(),
            output_mapping: BTreeMap::new(),
            nested: None,
        }
    }

    /// Activity running `dataflow` once per job.
    pub fn nested_dataflow(dataflow: Dataflow) -> Self {
        Self {
            nested: Some(Box::new(dataflow)),
            ..Self::new(Self::NESTED_DATAFLOW)
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn map_input(mut self, processor_port: impl Into<String>, activity_port: impl Into<String>) -> Self {
        self.input_mapping.insert(processor_port.into(), activity_port.into());
        self
    }

    pub fn map_output(mut self, processor_port: impl Into<String>, activity_port: impl Into<String>) -> Self {
        self.output_mapping.insert(processor_port.into(), activity_port.into());
        self
    }

    pub fn activity_input<'a>(&'a self, processor_port: &'a str) -> &'a str {
        self.input_mapping
            .get(processor_port)
            .map(String::as_str)
            .unwrap_or(processor_port)
    }

    pub fn activity_output<'a>(&'a self, processor_port: &'a str) -> &'a str {
        self.output_mapping
            .get(processor_port)
            .map(String::as_str)
            .unwrap_or(processor_port)
    }
}

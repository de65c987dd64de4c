use crate::failure::FailureListener;
use crate::instance::{CompileContext, DataflowInstance, RunHandle, RunResult};
use crate::monitor::Monitor;
use crate::registry::{ActivityRegistry, LayerRegistry};
use loomcore::{ActivitySpec, Dataflow, EventBus, ExecutionEvent, FlowError, OwningProcess, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Main runtime for executing dataflows
pub struct LoomRuntime {
    activities: Arc<ActivityRegistry>,
    layers: Arc<LayerRegistry>,
    monitor: Arc<Monitor>,
    listeners: Vec<Arc<dyn FailureListener>>,
    config: RuntimeConfig,
}

impl LoomRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(ActivityRegistry::new()), config)
    }

    /// Create a new runtime with a pre-configured activity registry
    pub fn with_registry(activities: Arc<ActivityRegistry>, config: RuntimeConfig) -> Self {
        let layers = Arc::new(LayerRegistry::with_builtins(config.default_max_jobs));
        Self::with_registries(activities, layers, config)
    }

    pub fn with_registries(
        activities: Arc<ActivityRegistry>,
        layers: Arc<LayerRegistry>,
        config: RuntimeConfig,
    ) -> Self {
        let monitor = Arc::new(Monitor::new(EventBus::new(config.event_buffer_size)));
        Self {
            activities,
            layers,
            monitor,
            listeners: Vec::new(),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<ActivityRegistry> {
        &self.activities
    }

    pub fn layers(&self) -> &Arc<LayerRegistry> {
        &self.layers
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Listener told about the failure of any run started afterwards
    pub fn add_failure_listener(&mut self, listener: Arc<dyn FailureListener>) {
        self.listeners.push(listener);
    }

    /// Instantiate an immutable, valid dataflow.
    pub fn compile(&self, dataflow: &Dataflow) -> Result<Arc<DataflowInstance>, FlowError> {
        let ctx = CompileContext {
            activities: &self.activities,
            layers: &self.layers,
            monitor: self.monitor.clone(),
            listeners: Arc::new(self.listeners.clone()),
        };
        DataflowInstance::compile(dataflow, &ctx)
    }

    /// Start a run whose inputs are pushed through the returned handle
    pub fn start(&self, dataflow: &Dataflow) -> Result<RunHandle, FlowError> {
        let instance = self.compile(dataflow)?;
        Ok(instance.start(OwningProcess::new_run(), CancellationToken::new()))
    }

    /// Run a dataflow without input ports
    pub fn fire(&self, dataflow: &Dataflow) -> Result<RunHandle, FlowError> {
        self.compile(dataflow)?.fire(OwningProcess::new_run())
    }

    /// Push the complete value of every input port and wait for the outputs.
    pub async fn execute(
        &self,
        dataflow: &Dataflow,
        inputs: HashMap<String, Value>,
    ) -> Result<RunResult, FlowError> {
        let instance = self.compile(dataflow)?;
        for port in dataflow.input_ports() {
            if !inputs.contains_key(port.name()) {
                return Err(FlowError::Configuration(format!("no value for input '{}'", port.name())));
            }
        }

        let handle = instance.start(OwningProcess::new_run(), CancellationToken::new());
        for (port, value) in inputs {
            if dataflow.input_port(&port).is_none() {
                tracing::warn!("Ignoring value for unknown input '{}'", port);
                continue;
            }
            handle.push_value(&port, value)?;
        }

        match self.config.run_timeout_ms {
            Some(ms) => {
                let cancellation = handle.cancellation_token();
                match tokio::time::timeout(Duration::from_millis(ms), handle.wait()).await {
                    Ok(result) => result,
                    Err(_) => {
                        cancellation.cancel();
                        Err(FlowError::Execution(format!("run timed out after {}ms", ms)))
                    }
                }
            }
            None => handle.wait().await,
        }
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.monitor.events().subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &EventBus {
        self.monitor.events()
    }

    pub fn monitor(&self) -> &Arc<Monitor> {
        &self.monitor
    }

    /// Registered activity types, including nested dataflows
    pub fn activity_types(&self) -> Vec<String> {
        let mut types = self.activities.list_activity_types();
        types.push(ActivitySpec::NESTED_DATAFLOW.to_string());
        types.sort();
        types.dedup();
        types
    }

    pub fn layer_types(&self) -> Vec<String> {
        self.layers.list_layer_types()
    }
}

impl Default for LoomRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Parallelism of parallelize layers that do not set `max_jobs`
    pub default_max_jobs: usize,
    pub event_buffer_size: usize,
    /// Cancel runs started by `execute` after this long
    pub run_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_max_jobs: 1,
            event_buffer_size: 1000,
            run_timeout_ms: None,
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

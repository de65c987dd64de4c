// crates/loomruntime/tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use loomcore::edits::{AddDataflowInput, AddDataflowOutput, AddProcessor, Connect};
use loomcore::{
    Activity, ActivityError, ActivityOutput, Dataflow, InvocationContext, Processor, Sink, Source, Value,
};
use loomruntime::{ActivityFactory, ActivityRegistry, LoomRuntime, RuntimeConfig};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}

/// Factory handing out one shared activity instance, so tests can inspect it
pub struct SharedFactory {
    activity_type: String,
    activity: Arc<dyn Activity>,
}

impl SharedFactory {
    pub fn new(activity: Arc<dyn Activity>) -> Arc<Self> {
        Arc::new(Self {
            activity_type: activity.activity_type().to_string(),
            activity,
        })
    }
}

impl ActivityFactory for SharedFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Arc<dyn Activity>, ActivityError> {
        Ok(self.activity.clone())
    }

    fn activity_type(&self) -> &str {
        &self.activity_type
    }
}

pub fn runtime_with(activities: Vec<Arc<dyn Activity>>) -> LoomRuntime {
    let mut registry = ActivityRegistry::new();
    registry.register(SharedFactory::new(Arc::new(Echo)));
    registry.register(SharedFactory::new(Arc::new(Concat)));
    for activity in activities {
        registry.register(SharedFactory::new(activity));
    }
    LoomRuntime::with_registry(Arc::new(registry), RuntimeConfig::default())
}

/// `in` -> `out`
pub struct Echo;

#[async_trait]
impl Activity for Echo {
    fn activity_type(&self) -> &str {
        "echo"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let value = ctx.require_input("in")?.clone();
        Ok(ActivityOutput::new().with_output("out", value))
    }
}

/// `left` + `right` -> `joined`
pub struct Concat;

#[async_trait]
impl Activity for Concat {
    fn activity_type(&self) -> &str {
        "concat"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let joined = format!("{}{}", ctx.require_str("left")?, ctx.require_str("right")?);
        Ok(ActivityOutput::new().with_output("joined", joined))
    }
}

/// Fails its first `failures` invocations, then echoes
pub struct Flaky {
    name: String,
    failures: usize,
    pub calls: AtomicUsize,
}

impl Flaky {
    pub fn new(name: &str, failures: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            failures,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activity for Flaky {
    fn activity_type(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(ActivityError::ExecutionFailed(format!("attempt {} failed", call + 1)));
        }
        let value = ctx.require_input("in")?.clone();
        Ok(ActivityOutput::new().with_output("out", value))
    }
}

/// Fails with a configuration error every time
pub struct Misconfigured;

#[async_trait]
impl Activity for Misconfigured {
    fn activity_type(&self) -> &str {
        "misconfigured"
    }

    async fn invoke(&self, _ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        Err(ActivityError::Configuration("no endpoint configured".to_string()))
    }
}

/// Sleeps until cancelled, tracking how many invocations ran at once
pub struct Slow {
    pub delay: Duration,
    pub calls: AtomicUsize,
    running: AtomicUsize,
    pub peak: AtomicUsize,
}

impl Slow {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Activity for Slow {
    fn activity_type(&self) -> &str {
        "slow"
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        let outcome = tokio::select! {
            _ = ctx.cancellation.cancelled() => Err(ActivityError::Cancelled),
            _ = tokio::time::sleep(self.delay) => Ok(()),
        };
        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome?;
        let value = ctx.require_input("in")?.clone();
        Ok(ActivityOutput::new().with_output("out", value))
    }
}

/// in:x (depth `input_depth`) -> processor -> out:y
pub fn single_processor_flow(processor: Processor, input_depth: usize) -> Dataflow {
    let mut df = Dataflow::new("single");
    df.edit(AddDataflowInput::new("x", input_depth)).unwrap();
    df.edit(AddDataflowOutput::new("y")).unwrap();
    let name = processor.name().to_string();
    df.edit(AddProcessor::new(processor)).unwrap();
    df.edit(Connect::new(Source::dataflow_input("x"), Sink::processor(name.as_str(), "in")))
        .unwrap();
    df.edit(Connect::new(Source::processor(name.as_str(), "out"), Sink::dataflow_output("y")))
        .unwrap();
    df.set_immutable();
    df
}

pub fn strings(items: &[&str]) -> Value {
    Value::Array(items.iter().map(|s| Value::from(*s)).collect())
}

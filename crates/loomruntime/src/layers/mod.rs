//! Runtime dispatch layers.
//!
//! Every job a processor produces travels down its dispatch stack. Each layer
//! receives the job together with the layers below it and decides whether,
//! when and how often to pass it on; the last layer invokes the activity.
//! Layer instances are shared by all runs of a compiled dataflow, so any
//! state they keep is keyed by owning process.

mod error_bounce;
mod failover;
mod invoke;
mod parallelize;
mod retry;
mod stop;

pub use error_bounce::ErrorBounceLayer;
pub use failover::FailoverLayer;
pub use invoke::InvokeLayer;
pub use parallelize::ParallelizeLayer;
pub use retry::RetryLayer;
pub use stop::StopLayer;

use crate::monitor::Monitor;
use async_trait::async_trait;
use futures::future::BoxFuture;
use loomcore::{Activity, ActivitySpec, Datum, DispatchError, IndexPath, OwningProcess, Port};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One unit of work for a processor
#[derive(Clone)]
pub struct Job {
    /// Process of the processor the job belongs to
    pub process: OwningProcess,
    pub index: IndexPath,
    /// Input values keyed by processor port
    pub inputs: BTreeMap<String, Datum>,
    /// Position of the bound activity to invoke, chosen by failover
    pub activity: usize,
    pub cancellation: CancellationToken,
}

/// Outputs of one job keyed by processor port
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobResult {
    pub outputs: BTreeMap<String, Datum>,
}

/// An activity instance together with the binding it was created from
#[derive(Clone)]
pub struct BoundActivity {
    pub spec: ActivitySpec,
    pub activity: Arc<dyn Activity>,
}

/// What layers can see of the processor they dispatch for
pub struct DispatchContext {
    pub processor: String,
    pub outputs: Vec<Port>,
    pub activities: Vec<BoundActivity>,
    pub monitor: Arc<Monitor>,
}

/// The layers below the one currently dispatching
#[derive(Clone, Copy)]
pub struct Below<'a> {
    layers: &'a [Arc<dyn DispatchLayer>],
    ctx: &'a DispatchContext,
}

impl<'a> Below<'a> {
    pub fn new(layers: &'a [Arc<dyn DispatchLayer>], ctx: &'a DispatchContext) -> Self {
        Self { layers, ctx }
    }

    pub fn context(&self) -> &'a DispatchContext {
        self.ctx
    }

    /// Hand the job to the next layer down.
    pub fn dispatch(self, job: Job) -> BoxFuture<'a, Result<JobResult, DispatchError>> {
        match self.layers.split_first() {
            Some((layer, rest)) => layer.dispatch(
                job,
                Below {
                    layers: rest,
                    ctx: self.ctx,
                },
            ),
            None => Box::pin(async { Err(DispatchError::NoInvokeLayer) }),
        }
    }
}

#[async_trait]
pub trait DispatchLayer: Send + Sync {
    fn layer_type(&self) -> &str;

    async fn dispatch(&self, job: Job, below: Below<'_>) -> Result<JobResult, DispatchError>;

    /// Counters this layer keeps for `process`
    fn properties(&self, _process: &OwningProcess) -> BTreeMap<String, u64> {
        BTreeMap::new()
    }

    /// The run owning `process` has ended; drop any state kept for it.
    fn finished(&self, _process: &OwningProcess) {}

    fn cancel(&self, _process: &OwningProcess) {}

    fn pause(&self, _process: &OwningProcess) {}

    fn resume(&self, _process: &OwningProcess) {}
}

/// Snapshot of one layer's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerProperties {
    pub layer_type: String,
    pub values: BTreeMap<String, u64>,
}

impl LayerProperties {
    pub fn get(&self, key: &str) -> Option<u64> {
        self.values.get(key).copied()
    }
}

/// Removes every entry owned by `process` or a process nested inside it.
pub(crate) fn forget<V>(map: &dashmap::DashMap<OwningProcess, V>, process: &OwningProcess) {
    map.retain(|key, _| !process.contains(key));
}

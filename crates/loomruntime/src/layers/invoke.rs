use super::{forget, Below, DispatchLayer, Job, JobResult};
use crate::monitor::MonitorNodeKind;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use loomcore::dispatch::INVOKE;
use loomcore::{
    ActivityError, Datum, DispatchError, ExecutionEvent, InvocationContext, OwningProcess, Value,
};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Terminal layer: runs the selected activity for the job
pub struct InvokeLayer {
    invocations: DashMap<OwningProcess, u64>,
}

impl InvokeLayer {
    pub fn new() -> Self {
        Self {
            invocations: DashMap::new(),
        }
    }
}

impl Default for InvokeLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DispatchLayer for InvokeLayer {
    fn layer_type(&self) -> &str {
        INVOKE
    }

    async fn dispatch(&self, job: Job, below: Below<'_>) -> Result<JobResult, DispatchError> {
        let ctx = below.context();
        if job.cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        let bound = ctx.activities.get(job.activity).ok_or(DispatchError::NoActivity)?;
        let activity_type = bound.activity.activity_type().to_string();
        let process = job.process.invocation(job.index.clone());

        let inputs: HashMap<String, Value> = job
            .inputs
            .iter()
            .map(|(port, datum)| (bound.spec.activity_input(port).to_string(), datum.value.clone()))
            .collect();
        let invocation = InvocationContext {
            owning_process: process.clone(),
            processor: ctx.processor.clone(),
            index: job.index.clone(),
            inputs,
            config: bound.spec.config.clone(),
            events: ctx.monitor.events().create_emitter(process.clone(), ctx.processor.clone()),
            cancellation: job.cancellation.clone(),
        };

        ctx.monitor
            .register(process.clone(), MonitorNodeKind::Invocation, activity_type.clone());
        ctx.monitor.emit(ExecutionEvent::InvocationStarted {
            process: process.clone(),
            processor: ctx.processor.clone(),
            activity: activity_type.clone(),
            index: job.index.clone(),
            timestamp: Utc::now(),
        });
        *self.invocations.entry(job.process.clone()).or_insert(0) += 1;
        tracing::debug!("Invoking '{}' for job {} of '{}'", activity_type, job.index, ctx.processor);

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = job.cancellation.cancelled() => Err(ActivityError::Cancelled),
            result = bound.activity.invoke(invocation) => result,
        };
        ctx.monitor.deregister(&process);

        let mapped = result.and_then(|mut output| {
            let mut outputs = BTreeMap::new();
            for port in &ctx.outputs {
                let name = bound.spec.activity_output(port.name());
                let value = output.outputs.remove(name).ok_or_else(|| {
                    ActivityError::ExecutionFailed(format!("activity produced no value for output '{}'", name))
                })?;
                outputs.insert(port.name().to_string(), Datum::new(value, port.depth()));
            }
            Ok(JobResult { outputs })
        });

        match mapped {
            Ok(result) => {
                ctx.monitor.emit(ExecutionEvent::InvocationCompleted {
                    process,
                    processor: ctx.processor.clone(),
                    activity: activity_type,
                    index: job.index,
                    duration_ms: started.elapsed().as_millis() as u64,
                    timestamp: Utc::now(),
                });
                Ok(result)
            }
            Err(ActivityError::Cancelled) if job.cancellation.is_cancelled() => Err(DispatchError::Cancelled),
            Err(e) => {
                tracing::debug!("Invocation of '{}' for job {} failed: {}", activity_type, job.index, e);
                ctx.monitor.emit(ExecutionEvent::InvocationFailed {
                    process,
                    processor: ctx.processor.clone(),
                    activity: activity_type.clone(),
                    index: job.index,
                    error: e.to_string(),
                    timestamp: Utc::now(),
                });
                Err(DispatchError::Invocation {
                    activity: activity_type,
                    attempts: 1,
                    source: e,
                })
            }
        }
    }

    fn properties(&self, process: &OwningProcess) -> BTreeMap<String, u64> {
        let mut values = BTreeMap::new();
        values.insert(
            "invocations".to_string(),
            self.invocations.get(process).map(|n| *n).unwrap_or(0),
        );
        values
    }

    fn finished(&self, process: &OwningProcess) {
        forget(&self.invocations, process);
    }
}

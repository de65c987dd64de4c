use crate::instance::DataflowInstance;
use async_trait::async_trait;
use loomcore::{
    Activity, ActivityError, ActivityOutput, ActivitySpec, DispatchError, FlowError, InvocationContext,
    InvocationMetadata, ProcessFailure,
};
use std::sync::Arc;

/// Runs a nested dataflow once per invocation.
///
/// Activity ports are the nested dataflow's own input and output ports. The
/// nested run lives below the invocation's owning process and is cancelled
/// together with it.
pub struct NestedDataflowActivity {
    instance: Arc<DataflowInstance>,
}

impl NestedDataflowActivity {
    pub fn new(instance: Arc<DataflowInstance>) -> Self {
        Self { instance }
    }
}

#[async_trait]
impl Activity for NestedDataflowActivity {
    fn activity_type(&self) -> &str {
        ActivitySpec::NESTED_DATAFLOW
    }

    async fn invoke(&self, ctx: InvocationContext) -> Result<ActivityOutput, ActivityError> {
        let dataflow = self.instance.dataflow();
        let mut inputs = Vec::with_capacity(dataflow.input_ports().len());
        for port in dataflow.input_ports() {
            let value = ctx
                .inputs
                .get(port.name())
                .cloned()
                .ok_or_else(|| ActivityError::MissingInput(port.name().to_string()))?;
            inputs.push((port.name().to_string(), value));
        }

        let process = ctx.owning_process.dataflow(dataflow.name());
        let handle = self.instance.start(process, ctx.cancellation.child_token());
        for (port, value) in inputs {
            handle.push_value(&port, value).map_err(nested_failure)?;
        }

        match handle.wait().await {
            Ok(result) => Ok(ActivityOutput {
                outputs: result.outputs.into_iter().map(|(port, d)| (port, d.value)).collect(),
                metadata: InvocationMetadata {
                    execution_time_ms: result.duration_ms,
                    ..Default::default()
                },
            }),
            Err(e) => Err(nested_failure(e)),
        }
    }
}

/// Map the failure of a nested run onto the activity error the enclosing
/// dispatch stack sees, keeping whether it may be retried or bounced.
fn nested_failure(error: FlowError) -> ActivityError {
    match error {
        FlowError::Cancelled(_) => ActivityError::Cancelled,
        FlowError::Activity(source) => source,
        FlowError::WorkflowFailure(failure) => {
            let ProcessFailure {
                processor, index, error, ..
            } = *failure;
            match error {
                DispatchError::Invocation { source, .. } if !source.is_recoverable() => source,
                DispatchError::Cancelled => ActivityError::Cancelled,
                error => {
                    let message = format!("processor '{}' failed at {}: {}", processor, index, error);
                    if error.is_recoverable() {
                        ActivityError::ExecutionFailed(message)
                    } else {
                        ActivityError::Structural(message)
                    }
                }
            }
        }
        FlowError::Io(e) => ActivityError::ExecutionFailed(e.to_string()),
        FlowError::Configuration(message) => ActivityError::Configuration(message),
        other => ActivityError::Structural(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loomcore::{IndexPath, IterationError, OwningProcess};

    fn failed_with(error: DispatchError) -> FlowError {
        FlowError::WorkflowFailure(Box::new(ProcessFailure {
            process: OwningProcess::run("r1"),
            processor: "inner".to_string(),
            index: IndexPath::new(vec![1]),
            error,
        }))
    }

    #[test]
    fn unrecoverable_inner_failures_stay_unrecoverable() {
        let configuration = nested_failure(failed_with(DispatchError::Invocation {
            activity: "http".to_string(),
            attempts: 1,
            source: ActivityError::Configuration("no endpoint".to_string()),
        }));
        assert!(matches!(configuration, ActivityError::Configuration(_)));

        let iteration = nested_failure(failed_with(DispatchError::Iteration(IterationError::DotProductMismatch(
            "2 vs 3".to_string(),
        ))));
        assert!(matches!(iteration, ActivityError::Structural(_)));
        assert!(!iteration.is_recoverable());

        assert!(matches!(
            nested_failure(FlowError::Configuration("bad".to_string())),
            ActivityError::Configuration(_)
        ));
        assert!(matches!(nested_failure(failed_with(DispatchError::Cancelled)), ActivityError::Cancelled));
    }

    #[test]
    fn recoverable_inner_failures_name_the_processor() {
        let error = nested_failure(failed_with(DispatchError::Invocation {
            activity: "http".to_string(),
            attempts: 3,
            source: ActivityError::ExecutionFailed("503".to_string()),
        }));
        assert!(error.is_recoverable());
        match error {
            ActivityError::ExecutionFailed(message) => {
                assert!(message.starts_with("processor 'inner' failed at [1]"), "{}", message)
            }
            other => panic!("expected an execution failure, got {:?}", other),
        }
    }
}

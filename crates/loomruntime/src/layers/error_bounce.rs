use super::{forget, Below, DispatchContext, DispatchLayer, Job, JobResult};
use async_trait::async_trait;
use dashmap::DashMap;
use loomcore::dispatch::ERROR_BOUNCE;
use loomcore::{Datum, DispatchError, ErrorDocument, OwningProcess, Value};
use std::collections::BTreeMap;

#[derive(Default)]
struct BounceCounts {
    reflected: u64,
    translated: u64,
}

/// Turns failed jobs into error documents so the rest of the run continues.
///
/// Jobs whose inputs already carry an error are answered with an error
/// document straight away. Failures that are not recoverable escalate.
pub struct ErrorBounceLayer {
    counts: DashMap<OwningProcess, BounceCounts>,
}

impl ErrorBounceLayer {
    pub fn new() -> Self {
        Self { counts: DashMap::new() }
    }
}

impl Default for ErrorBounceLayer {
    fn default() -> Self {
        Self::new()
    }
}

fn first_error(value: &Value) -> Option<&ErrorDocument> {
    match value {
        Value::Error(doc) => Some(doc),
        Value::Array(items) => items.iter().find_map(first_error),
        _ => None,
    }
}

fn error_result(ctx: &DispatchContext, doc: ErrorDocument) -> JobResult {
    let outputs = ctx
        .outputs
        .iter()
        .map(|port| {
            (
                port.name().to_string(),
                Datum::new(Value::Error(doc.clone()), port.depth()),
            )
        })
        .collect();
    JobResult { outputs }
}

#[async_trait]
impl DispatchLayer for ErrorBounceLayer {
    fn layer_type(&self) -> &str {
        ERROR_BOUNCE
    }

    async fn dispatch(&self, job: Job, below: Below<'_>) -> Result<JobResult, DispatchError> {
        let ctx = below.context();

        let upstream = job
            .inputs
            .iter()
            .find_map(|(port, datum)| first_error(&datum.value).map(|doc| (port, doc)));
        if let Some((port, doc)) = upstream {
            tracing::debug!("Reflecting error on '{}' for job {} of {}", port, job.index, ctx.processor);
            let reflected = ErrorDocument::new(format!("input '{}' carries an error", port))
                .with_processor(ctx.processor.clone())
                .with_cause(doc.to_string());
            self.counts.entry(job.process.clone()).or_default().reflected += 1;
            return Ok(error_result(ctx, reflected));
        }

        let process = job.process.clone();
        let index = job.index.clone();
        match below.dispatch(job).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Job {} of '{}' failed, emitting error document: {}", index, ctx.processor, e);
                let mut chain = e.cause_chain().into_iter();
                let mut doc = ErrorDocument::new(chain.next().unwrap_or_default()).with_processor(ctx.processor.clone());
                for cause in chain {
                    doc = doc.with_cause(cause);
                }
                self.counts.entry(process).or_default().translated += 1;
                Ok(error_result(ctx, doc))
            }
            Err(e) => Err(e),
        }
    }

    fn properties(&self, process: &OwningProcess) -> BTreeMap<String, u64> {
        let mut values = BTreeMap::new();
        let (reflected, translated) = self
            .counts
            .get(process)
            .map(|c| (c.reflected, c.translated))
            .unwrap_or_default();
        values.insert("total_reflected".to_string(), reflected);
        values.insert("total_translated".to_string(), translated);
        values
    }

    fn finished(&self, process: &OwningProcess) {
        forget(&self.counts, process);
    }
}

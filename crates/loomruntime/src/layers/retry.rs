use super::{forget, Below, DispatchLayer, Job, JobResult};
use async_trait::async_trait;
use dashmap::DashMap;
use loomcore::dispatch::RETRY;
use loomcore::{DispatchError, FlowError, OwningProcess, RetryConfig, Value};
use std::collections::{BTreeMap, HashMap};

/// Re-attempts failed jobs up to `max_retries` times with backoff
pub struct RetryLayer {
    config: RetryConfig,
    retries: DashMap<OwningProcess, u64>,
}

impl RetryLayer {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retries: DashMap::new(),
        }
    }

    pub fn from_config(config: &HashMap<String, Value>) -> Result<Self, FlowError> {
        Ok(Self::new(RetryConfig::from_config(config)?))
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

/// Record how many attempts the job really took.
fn with_attempts(error: DispatchError, attempts: u32) -> DispatchError {
    match error {
        DispatchError::Invocation { activity, source, .. } => DispatchError::Invocation {
            activity,
            attempts,
            source,
        },
        other => other,
    }
}

#[async_trait]
impl DispatchLayer for RetryLayer {
    fn layer_type(&self) -> &str {
        RETRY
    }

    async fn dispatch(&self, job: Job, below: Below<'_>) -> Result<JobResult, DispatchError> {
        let mut retries = 0u32;
        loop {
            match below.dispatch(job.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && retries < self.config.max_retries => {
                    let delay = self.config.backoff(retries);
                    retries += 1;
                    *self.retries.entry(job.process.clone()).or_insert(0) += 1;
                    tracing::warn!(
                        "Job {} of '{}' failed, retry {}/{} in {:?}: {}",
                        job.index,
                        below.context().processor,
                        retries,
                        self.config.max_retries,
                        delay,
                        e
                    );
                    tokio::select! {
                        biased;
                        _ = job.cancellation.cancelled() => return Err(DispatchError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(with_attempts(e, retries + 1)),
            }
        }
    }

    fn properties(&self, process: &OwningProcess) -> BTreeMap<String, u64> {
        let mut values = BTreeMap::new();
        values.insert(
            "total_retries".to_string(),
            self.retries.get(process).map(|r| *r).unwrap_or(0),
        );
        values
    }

    fn finished(&self, process: &OwningProcess) {
        forget(&self.retries, process);
    }
}

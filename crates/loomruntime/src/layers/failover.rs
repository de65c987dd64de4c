use super::{Below, DispatchLayer, Job, JobResult};
use async_trait::async_trait;
use loomcore::dispatch::FAILOVER;
use loomcore::DispatchError;

/// Tries the bound activities in declared order until one succeeds.
pub struct FailoverLayer;

impl FailoverLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for FailoverLayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DispatchLayer for FailoverLayer {
    fn layer_type(&self) -> &str {
        FAILOVER
    }

    async fn dispatch(&self, job: Job, below: Below<'_>) -> Result<JobResult, DispatchError> {
        let count = below.context().activities.len();
        let mut last = None;

        for position in 0..count {
            if job.cancellation.is_cancelled() {
                return Err(DispatchError::Cancelled);
            }
            let mut attempt = job.clone();
            attempt.activity = position;
            match below.dispatch(attempt).await {
                Ok(result) => return Ok(result),
                Err(e @ (DispatchError::Cancelled | DispatchError::Stopped { .. })) => return Err(e),
                Err(e) => {
                    if position + 1 < count {
                        tracing::info!(
                            "Activity {} of '{}' failed on job {}, failing over: {}",
                            position,
                            below.context().processor,
                            job.index,
                            e
                        );
                    }
                    last = Some(e);
                }
            }
        }

        Err(last.unwrap_or(DispatchError::NoActivity))
    }
}

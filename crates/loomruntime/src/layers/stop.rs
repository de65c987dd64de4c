use super::{forget, Below, DispatchLayer, Job, JobResult};
use async_trait::async_trait;
use dashmap::DashMap;
use loomcore::dispatch::STOP;
use loomcore::{DispatchError, FlowError, IndexPath, OwningProcess, StopConfig, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Default)]
struct Attempts {
    count: u32,
    last: Option<DispatchError>,
}

/// Caps the attempts made for each job and gates jobs of paused processes.
pub struct StopLayer {
    config: StopConfig,
    attempts: DashMap<(OwningProcess, IndexPath), Attempts>,
    gates: DashMap<OwningProcess, Arc<watch::Sender<bool>>>,
}

impl StopLayer {
    pub fn new(config: StopConfig) -> Self {
        Self {
            config,
            attempts: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    pub fn from_config(config: &HashMap<String, Value>) -> Result<Self, FlowError> {
        Ok(Self::new(StopConfig::from_config(config)?))
    }

    fn gate(&self, process: &OwningProcess) -> Arc<watch::Sender<bool>> {
        self.gates
            .entry(process.clone())
            .or_insert_with(|| Arc::new(watch::channel(false).0))
            .clone()
    }

    /// Wait while the process is paused. False if cancelled meanwhile.
    async fn wait_unpaused(&self, job: &Job) -> bool {
        let mut paused = self.gate(&job.process).subscribe();
        loop {
            let is_paused = *paused.borrow_and_update();
            if !is_paused {
                return true;
            }
            tokio::select! {
                biased;
                _ = job.cancellation.cancelled() => return false,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    fn set_paused(&self, process: &OwningProcess, paused: bool) {
        self.gate(process).send_replace(paused);
    }
}

#[async_trait]
impl DispatchLayer for StopLayer {
    fn layer_type(&self) -> &str {
        STOP
    }

    async fn dispatch(&self, job: Job, below: Below<'_>) -> Result<JobResult, DispatchError> {
        if !self.wait_unpaused(&job).await {
            return Err(DispatchError::Cancelled);
        }

        let Some(limit) = self.config.max_attempts else {
            return below.dispatch(job).await;
        };

        let key = (job.process.clone(), job.index.clone());
        {
            let mut attempts = self.attempts.entry(key.clone()).or_default();
            if attempts.count >= limit {
                tracing::warn!(
                    "Job {} of '{}' reached its limit of {} attempt(s)",
                    job.index,
                    below.context().processor,
                    limit
                );
                return Err(DispatchError::Stopped {
                    limit,
                    last: attempts.last.clone().map(Box::new),
                });
            }
            attempts.count += 1;
        }

        let result = below.dispatch(job).await;
        if let Err(e) = &result {
            if let Some(mut attempts) = self.attempts.get_mut(&key) {
                attempts.last = Some(e.clone());
            }
        }
        result
    }

    fn properties(&self, process: &OwningProcess) -> BTreeMap<String, u64> {
        let mut values = BTreeMap::new();
        let attempts: u64 = self
            .attempts
            .iter()
            .filter(|entry| &entry.key().0 == process)
            .map(|entry| entry.value().count as u64)
            .sum();
        values.insert("total_attempts".to_string(), attempts);
        if let Some(limit) = self.config.max_attempts {
            values.insert("max_attempts".to_string(), limit as u64);
        }
        values
    }

    fn finished(&self, process: &OwningProcess) {
        self.attempts.retain(|(owner, _), _| !process.contains(owner));
        forget(&self.gates, process);
    }

    fn cancel(&self, process: &OwningProcess) {
        forget(&self.gates, process);
    }

    fn pause(&self, process: &OwningProcess) {
        tracing::info!("Pausing jobs of {}", process);
        self.set_paused(process, true);
    }

    fn resume(&self, process: &OwningProcess) {
        tracing::info!("Resuming jobs of {}", process);
        self.set_paused(process, false);
    }
}

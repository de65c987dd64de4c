use super::{forget, Below, DispatchLayer, Job, JobResult};
use async_trait::async_trait;
use dashmap::DashMap;
use loomcore::dispatch::PARALLELIZE;
use loomcore::{DispatchError, FlowError, OwningProcess, ParallelizeConfig, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

struct ProcessSlots {
    permits: Arc<Semaphore>,
    queued: AtomicU64,
    sent: AtomicU64,
    completed: AtomicU64,
}

/// Bounds the number of jobs a processor runs at once for each process.
///
/// Jobs over the limit wait in a queue; once the run is cancelled nothing
/// more is released from it.
pub struct ParallelizeLayer {
    max_jobs: usize,
    slots: DashMap<OwningProcess, Arc<ProcessSlots>>,
}

impl ParallelizeLayer {
    pub fn new(max_jobs: usize) -> Self {
        Self {
            max_jobs,
            slots: DashMap::new(),
        }
    }

    pub fn from_config(config: &HashMap<String, Value>) -> Result<Self, FlowError> {
        let config = ParallelizeConfig::from_config(config)?;
        Ok(Self::new(config.max_jobs))
    }

    pub fn max_jobs(&self) -> usize {
        self.max_jobs
    }

    fn slots_for(&self, process: &OwningProcess) -> Arc<ProcessSlots> {
        self.slots
            .entry(process.clone())
            .or_insert_with(|| {
                Arc::new(ProcessSlots {
                    permits: Arc::new(Semaphore::new(self.max_jobs)),
                    queued: AtomicU64::new(0),
                    sent: AtomicU64::new(0),
                    completed: AtomicU64::new(0),
                })
            })
            .clone()
    }
}

#[async_trait]
impl DispatchLayer for ParallelizeLayer {
    fn layer_type(&self) -> &str {
        PARALLELIZE
    }

    async fn dispatch(&self, job: Job, below: Below<'_>) -> Result<JobResult, DispatchError> {
        let slots = self.slots_for(&job.process);
        slots.queued.fetch_add(1, Ordering::SeqCst);

        let permit = tokio::select! {
            biased;
            _ = job.cancellation.cancelled() => None,
            permit = slots.permits.clone().acquire_owned() => permit.ok(),
        };
        slots.queued.fetch_sub(1, Ordering::SeqCst);

        let Some(permit) = permit else {
            tracing::debug!("Dropping queued job {} of {}", job.index, job.process);
            return Err(DispatchError::Cancelled);
        };
        if job.cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }

        slots.sent.fetch_add(1, Ordering::SeqCst);
        let result = below.dispatch(job).await;
        drop(permit);
        slots.completed.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn properties(&self, process: &OwningProcess) -> BTreeMap<String, u64> {
        let mut values = BTreeMap::new();
        values.insert("max_jobs".to_string(), self.max_jobs as u64);
        if let Some(slots) = self.slots.get(process) {
            values.insert("queue_size".to_string(), slots.queued.load(Ordering::SeqCst));
            values.insert("sent".to_string(), slots.sent.load(Ordering::SeqCst));
            values.insert("completed".to_string(), slots.completed.load(Ordering::SeqCst));
        }
        values
    }

    fn finished(&self, process: &OwningProcess) {
        forget(&self.slots, process);
    }

    fn cancel(&self, process: &OwningProcess) {
        for entry in self.slots.iter() {
            if process.contains(entry.key()) {
                entry.value().permits.close();
            }
        }
    }
}

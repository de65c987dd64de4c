use loomcore::{FlowError, OwningProcess};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Receives the failure that ended a run
pub trait FailureListener: Send + Sync {
    fn on_failure(&self, process: &OwningProcess, error: &FlowError);
}

/// Reports the first failure of a run to every listener; later failures of
/// the same run are only logged.
pub struct FailureTransmitter {
    process: OwningProcess,
    fired: AtomicBool,
    listeners: Arc<Vec<Arc<dyn FailureListener>>>,
}

impl FailureTransmitter {
    pub fn new(process: OwningProcess, listeners: Arc<Vec<Arc<dyn FailureListener>>>) -> Self {
        Self {
            process,
            fired: AtomicBool::new(false),
            listeners,
        }
    }

    /// Returns false if a failure was already transmitted.
    pub fn transmit(&self, error: &FlowError) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!("Suppressing further failure of {}: {}", self.process, error);
            return false;
        }
        tracing::error!("Run {} failed: {}", self.process, error);
        for listener in self.listeners.iter() {
            listener.on_failure(&self.process, error);
        }
        true
    }

    pub fn has_failed(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

use crate::{IndexPath, OwningProcess, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted while a dataflow runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    RunStarted {
        process: OwningProcess,
        dataflow: String,
        timestamp: DateTime<Utc>,
    },
    RunCompleted {
        process: OwningProcess,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// Sent exactly once per run, whether it finished, failed or was cancelled
    ProcessTerminated {
        process: OwningProcess,
        reason: TerminationReason,
        timestamp: DateTime<Utc>,
    },
    ProcessorStarted {
        process: OwningProcess,
        processor: String,
        /// Jobs ready when the processor started; more follow while inputs stream
        jobs: usize,
        timestamp: DateTime<Utc>,
    },
    ProcessorCompleted {
        process: OwningProcess,
        processor: String,
        jobs: usize,
        errors: usize,
        timestamp: DateTime<Utc>,
    },
    InvocationStarted {
        process: OwningProcess,
        processor: String,
        activity: String,
        index: IndexPath,
        timestamp: DateTime<Utc>,
    },
    InvocationCompleted {
        process: OwningProcess,
        processor: String,
        activity: String,
        index: IndexPath,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    InvocationFailed {
        process: OwningProcess,
        processor: String,
        activity: String,
        index: IndexPath,
        error: String,
        timestamp: DateTime<Utc>,
    },
    OutputToken {
        process: OwningProcess,
        port: String,
        index: IndexPath,
        timestamp: DateTime<Utc>,
    },
    ActivityEvent {
        process: OwningProcess,
        processor: String,
        event: ActivityEvent,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    pub fn process(&self) -> &OwningProcess {
        match self {
            ExecutionEvent::RunStarted { process, .. }
            | ExecutionEvent::RunCompleted { process, .. }
            | ExecutionEvent::ProcessTerminated { process, .. }
            | ExecutionEvent::ProcessorStarted { process, .. }
            | ExecutionEvent::ProcessorCompleted { process, .. }
            | ExecutionEvent::InvocationStarted { process, .. }
            | ExecutionEvent::InvocationCompleted { process, .. }
            | ExecutionEvent::InvocationFailed { process, .. }
            | ExecutionEvent::OutputToken { process, .. }
            | ExecutionEvent::ActivityEvent { process, .. } => process,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail")]
pub enum TerminationReason {
    Completed,
    Failed(String),
    Cancelled,
}

/// Events reported by an activity while it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum ActivityEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
    Data { port: String, value: Value },
}

/// Handle activities use to report progress
#[derive(Clone)]
pub struct EventEmitter {
    process: OwningProcess,
    processor: String,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        process: OwningProcess,
        processor: impl Into<String>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            process,
            processor: processor.into(),
            sender,
        }
    }

    pub fn emit(&self, event: ActivityEvent) {
        let _ = self.sender.send(ExecutionEvent::ActivityEvent {
            process: self.process.clone(),
            processor: self.processor.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(ActivityEvent::Info {
            message: message.into(),
        });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(ActivityEvent::Warning {
            message: message.into(),
        });
    }

    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(ActivityEvent::Progress { percent, message });
    }

    /// Emit data on a specific port (for streaming)
    pub fn data(&self, port: impl Into<String>, value: Value) {
        self.emit(ActivityEvent::Data {
            port: port.into(),
            value,
        });
    }
}

/// Broadcast channel every observer of a runtime subscribes to
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(&self, process: OwningProcess, processor: impl Into<String>) -> EventEmitter {
        EventEmitter::new(process, processor, self.sender.clone())
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

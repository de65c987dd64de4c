use chrono::{DateTime, Utc};
use dashmap::DashMap;
use loomcore::{EventBus, ExecutionEvent, OwningProcess};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorNodeKind {
    Run,
    Processor,
    Invocation,
}

#[derive(Debug, Clone)]
pub struct MonitorNode {
    pub kind: MonitorNodeKind,
    pub name: String,
    pub started: DateTime<Utc>,
}

/// Registry of the runs, processors and invocations currently active, plus
/// the event bus they report on.
pub struct Monitor {
    nodes: DashMap<OwningProcess, MonitorNode>,
    events: EventBus,
}

impl Monitor {
    pub fn new(events: EventBus) -> Self {
        Self {
            nodes: DashMap::new(),
            events,
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn emit(&self, event: ExecutionEvent) {
        self.events.emit(event);
    }

    pub fn register(&self, process: OwningProcess, kind: MonitorNodeKind, name: impl Into<String>) {
        let node = MonitorNode {
            kind,
            name: name.into(),
            started: Utc::now(),
        };
        tracing::trace!("Monitor: registered {:?} '{}' at {}", kind, node.name, process);
        self.nodes.insert(process, node);
    }

    pub fn deregister(&self, process: &OwningProcess) -> Option<MonitorNode> {
        self.nodes.remove(process).map(|(_, node)| node)
    }

    /// Drop `process` and everything nested inside it.
    pub fn deregister_all(&self, process: &OwningProcess) {
        self.nodes.retain(|key, _| !process.contains(key));
    }

    pub fn is_registered(&self, process: &OwningProcess) -> bool {
        self.nodes.contains_key(process)
    }

    /// Active nodes sorted by process path
    pub fn active(&self) -> Vec<(OwningProcess, MonitorNode)> {
        let mut nodes: Vec<(OwningProcess, MonitorNode)> = self
            .nodes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        nodes.sort_by_key(|(process, _)| process.to_string());
        nodes
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a datalink takes its tokens from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    DataflowInput { port: String },
    ProcessorOutput { processor: String, port: String },
    Merge { merge: String },
}

/// Where a datalink delivers its tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sink {
    DataflowOutput { port: String },
    ProcessorInput { processor: String, port: String },
    MergeInput { merge: String, port: String },
}

impl Source {
    pub fn dataflow_input(port: impl Into<String>) -> Self {
        Source::DataflowInput { port: port.into() }
    }

    pub fn processor(processor: impl Into<String>, port: impl Into<String>) -> Self {
        Source::ProcessorOutput {
            processor: processor.into(),
            port: port.into(),
        }
    }

    pub fn merge(merge: impl Into<String>) -> Self {
        Source::Merge { merge: merge.into() }
    }
}

impl Sink {
    pub fn dataflow_output(port: impl Into<String>) -> Self {
        Sink::DataflowOutput { port: port.into() }
    }

    pub fn processor(processor: impl Into<String>, port: impl Into<String>) -> Self {
        Sink::ProcessorInput {
            processor: processor.into(),
            port: port.into(),
        }
    }

    pub fn merge(merge: impl Into<String>, port: impl Into<String>) -> Self {
        Sink::MergeInput {
            merge: merge.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::DataflowInput { port } => write!(f, "in:{}", port),
            Source::ProcessorOutput { processor, port } => write!(f, "{}.{}", processor, port),
            Source::Merge { merge } => write!(f, "merge:{}", merge),
        }
    }
}

impl fmt::Display for Sink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sink::DataflowOutput { port } => write!(f, "out:{}", port),
            Sink::ProcessorInput { processor, port } => write!(f, "{}.{}", processor, port),
            Sink::MergeInput { merge, port } => write!(f, "merge:{}.{}", merge, port),
        }
    }
}

/// Point-to-point connection between a source and a sink
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Datalink {
    pub source: Source,
    pub sink: Sink,
}

impl Datalink {
    pub fn new(source: Source, sink: Sink) -> Self {
        Self { source, sink }
    }
}

impl fmt::Display for Datalink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.sink)
    }
}

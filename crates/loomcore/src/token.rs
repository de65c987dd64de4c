use crate::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a token inside nested collections.
///
/// `[2, 0]` is the first item of the third inner collection. The empty path
/// addresses the complete value of a stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexPath(Vec<usize>);

impl IndexPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// New path with `position` in front, as a merge does for its inputs.
    pub fn prepend(&self, position: usize) -> Self {
        let mut indices = Vec::with_capacity(self.0.len() + 1);
        indices.push(position);
        indices.extend_from_slice(&self.0);
        Self(indices)
    }

    pub fn child(&self, position: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(position);
        Self(indices)
    }

    pub fn concat(&self, other: &IndexPath) -> Self {
        let mut indices = self.0.clone();
        indices.extend_from_slice(&other.0);
        Self(indices)
    }

    pub fn is_prefix_of(&self, other: &IndexPath) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Whether a token at `self` may be delivered after a token at `previous`
    /// on the same stream.
    ///
    /// Streams are post-order: a collection closes after its elements, and no
    /// element arrives below a collection that was already closed. Nothing
    /// follows the empty path.
    pub fn may_follow(&self, previous: &IndexPath) -> bool {
        if previous.is_empty() {
            return false;
        }
        if self.is_prefix_of(previous) {
            return self.len() < previous.len();
        }
        self > previous && !previous.is_prefix_of(self)
    }
}

impl From<Vec<usize>> for IndexPath {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for IndexPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, idx) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", idx)?;
        }
        write!(f, "]")
    }
}

/// One level of an owning process path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessSegment {
    /// A top level run, named by its run identifier
    Run(String),
    Dataflow(String),
    Processor(String),
    /// One activity invocation of a processor, named by its job index
    Invocation(IndexPath),
}

impl fmt::Display for ProcessSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessSegment::Run(id) => write!(f, "{}", id),
            ProcessSegment::Dataflow(name) => write!(f, "dataflow:{}", name),
            ProcessSegment::Processor(name) => write!(f, "processor:{}", name),
            ProcessSegment::Invocation(index) => write!(f, "invoke{}", index),
        }
    }
}

/// Hierarchical identifier of the run, nested dataflow or invocation a token
/// belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwningProcess {
    segments: Vec<ProcessSegment>,
}

impl OwningProcess {
    pub fn run(id: impl Into<String>) -> Self {
        Self {
            segments: vec![ProcessSegment::Run(id.into())],
        }
    }

    /// Fresh top level process with a random run identifier.
    pub fn new_run() -> Self {
        Self::run(format!("run-{}", uuid::Uuid::new_v4()))
    }

    pub fn segments(&self) -> &[ProcessSegment] {
        &self.segments
    }

    pub fn last(&self) -> Option<&ProcessSegment> {
        self.segments.last()
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn push(&self, segment: ProcessSegment) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn dataflow(&self, name: impl Into<String>) -> Self {
        self.push(ProcessSegment::Dataflow(name.into()))
    }

    pub fn processor(&self, name: impl Into<String>) -> Self {
        self.push(ProcessSegment::Processor(name.into()))
    }

    pub fn invocation(&self, index: IndexPath) -> Self {
        self.push(ProcessSegment::Invocation(index))
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// True for `self` and every process nested inside it.
    pub fn contains(&self, other: &OwningProcess) -> bool {
        other.segments.starts_with(&self.segments)
    }

    /// Name of the innermost processor on this path, if any.
    pub fn processor_name(&self) -> Option<&str> {
        self.segments.iter().rev().find_map(|s| match s {
            ProcessSegment::Processor(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl fmt::Display for OwningProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// A value with its declared collection depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datum {
    pub value: Value,
    pub depth: usize,
}

impl Datum {
    pub fn new(value: impl Into<Value>, depth: usize) -> Self {
        Self {
            value: value.into(),
            depth,
        }
    }

    /// Datum whose depth is inferred from the value.
    pub fn inferred(value: impl Into<Value>) -> Self {
        let value = value.into();
        let depth = value.inferred_depth();
        Self { value, depth }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Data(Datum),
    /// Every token below the index has been emitted
    Completion,
}

/// Immutable unit of data travelling along datalinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub owning_process: OwningProcess,
    pub index: IndexPath,
    pub kind: TokenKind,
}

impl Token {
    pub fn data(owning_process: OwningProcess, index: IndexPath, datum: Datum) -> Self {
        Self {
            owning_process,
            index,
            kind: TokenKind::Data(datum),
        }
    }

    pub fn completion(owning_process: OwningProcess, index: IndexPath) -> Self {
        Self {
            owning_process,
            index,
            kind: TokenKind::Completion,
        }
    }

    pub fn is_completion(&self) -> bool {
        matches!(self.kind, TokenKind::Completion)
    }

    /// The final token of a stream: anything at the empty index.
    pub fn is_final(&self) -> bool {
        self.index.is_empty()
    }

    pub fn datum(&self) -> Option<&Datum> {
        match &self.kind {
            TokenKind::Data(d) => Some(d),
            TokenKind::Completion => None,
        }
    }

    /// Index length plus declared depth; completion tokens have none.
    pub fn cardinality(&self) -> Option<usize> {
        self.datum().map(|d| self.index.len() + d.depth)
    }

    pub fn with_index(&self, index: IndexPath) -> Self {
        Self {
            owning_process: self.owning_process.clone(),
            index,
            kind: self.kind.clone(),
        }
    }

    pub fn with_process(&self, owning_process: OwningProcess) -> Self {
        Self {
            owning_process,
            index: self.index.clone(),
            kind: self.kind.clone(),
        }
    }
}

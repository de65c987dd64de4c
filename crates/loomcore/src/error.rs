use crate::{IndexPath, OwningProcess, ValidationReport};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Invalid dataflow: {0}")]
    InvalidDataflow(Box<ValidationReport>),

    #[error("Dataflow '{0}' must be made immutable before it can run")]
    NotImmutable(String),

    #[error("Dataflow '{dataflow}' has {inputs} input port(s) and cannot fire by itself")]
    NotSelfStarting { dataflow: String, inputs: usize },

    #[error("Workflow failure: {0}")]
    WorkflowFailure(Box<ProcessFailure>),

    #[error("Run {0} was cancelled")]
    Cancelled(OwningProcess),

    #[error("Structure violation: {0}")]
    Structure(#[from] WorkflowStructureError),

    #[error("Edit error: {0}")]
    Edit(#[from] EditError),

    #[error("Activity error: {0}")]
    Activity(#[from] ActivityError),

    #[error("Unknown activity type: {0}")]
    UnknownActivityType(String),

    #[error("Unknown dispatch layer type: {0}")]
    UnknownLayerType(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure raised by an activity invocation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActivityError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Activity initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Timeout after {seconds}s")]
    Timeout { seconds: u64 },

    /// A graph or iteration invariant broke below the activity, as in a
    /// nested dataflow
    #[error("Structural failure: {0}")]
    Structural(String),

    #[error("Cancelled")]
    Cancelled,
}

impl ActivityError {
    /// Configuration problems do not go away by retrying or by turning the
    /// result into an error document; they fail the whole run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ActivityError::Configuration(_)
                | ActivityError::InitializationFailed(_)
                | ActivityError::Structural(_)
                | ActivityError::Cancelled
        )
    }
}

/// A graph invariant violated while tokens were flowing
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowStructureError {
    #[error("merge '{merge}' input '{port}' has cardinality {actual}, expected {expected} for {process}")]
    MergeCardinality {
        merge: String,
        port: String,
        expected: usize,
        actual: usize,
        process: OwningProcess,
    },

    #[error("{owner} has no port named '{port}'")]
    UnknownPort { owner: String, port: String },

    #[error("token {received} on '{port}' arrived after {previous}")]
    OutOfOrder {
        port: String,
        previous: IndexPath,
        received: IndexPath,
    },

    #[error("'{port}' expects depth {expected} at the top level, got {actual}")]
    DepthMismatch {
        port: String,
        expected: usize,
        actual: usize,
    },

    #[error("{0}")]
    Other(String),
}

/// An iteration strategy could not reconcile the cardinalities of its inputs
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IterationError {
    #[error("iteration type mismatch on '{port}': needs depth {desired}, received depth {actual}")]
    InsufficientDepth {
        port: String,
        desired: usize,
        actual: usize,
    },

    #[error("iteration type mismatch in dot product: {0}")]
    DotProductMismatch(String),

    #[error("value on '{port}' is declared at depth {depth} but is not a collection")]
    NotACollection { port: String, depth: usize },

    #[error("no value bound for '{0}'")]
    MissingBinding(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NamingError {
    #[error("a processor named '{0}' already exists")]
    DuplicateProcessor(String),

    #[error("a merge named '{0}' already exists")]
    DuplicateMerge(String),

    #[error("{owner} already has a port named '{port}'")]
    DuplicatePort { owner: String, port: String },

    #[error("'{0}' is not a valid name")]
    InvalidName(String),
}

/// A requested graph mutation was rejected
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("dataflow '{0}' is immutable")]
    Immutable(String),

    #[error(transparent)]
    Naming(#[from] NamingError),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' is still connected")]
    InUse { kind: &'static str, name: String },

    #[error("sink {0} already has an incoming link")]
    SinkConnected(String),

    #[error("invalid dispatch stack: {0}")]
    DispatchStack(String),

    #[error("invalid iteration strategy: {0}")]
    IterationStrategy(String),

    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    #[error("edit {position} of compound edit failed: {source}")]
    Compound {
        position: usize,
        source: Box<EditError>,
    },
}

/// Why a job did not produce a result in the dispatch stack
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("activity '{activity}' failed after {attempts} attempt(s): {source}")]
    Invocation {
        activity: String,
        attempts: u32,
        source: ActivityError,
    },

    #[error("stopped after {limit} attempt(s){}", .last.as_ref().map(|e| format!(": {}", e)).unwrap_or_default())]
    Stopped {
        limit: u32,
        last: Option<Box<DispatchError>>,
    },

    #[error("processor has no activity to invoke")]
    NoActivity,

    #[error("dispatch stack ended without an invoke layer")]
    NoInvokeLayer,

    #[error(transparent)]
    Iteration(#[from] IterationError),

    #[error(transparent)]
    Structure(#[from] WorkflowStructureError),

    #[error("cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Worth another attempt with the same activity.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Invocation { source, .. } => source.is_recoverable(),
            _ => false,
        }
    }

    /// May be turned into error documents instead of failing the run.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DispatchError::Invocation { source, .. } => source.is_recoverable(),
            DispatchError::Stopped { last, .. } => last.as_ref().map_or(true, |e| e.is_recoverable()),
            _ => false,
        }
    }

    /// Number of invocation attempts recorded in this failure.
    pub fn attempts(&self) -> u32 {
        match self {
            DispatchError::Invocation { attempts, .. } => *attempts,
            DispatchError::Stopped { limit, .. } => *limit,
            _ => 0,
        }
    }

    /// Messages from the outermost failure down to the root cause.
    pub fn cause_chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        match self {
            DispatchError::Invocation { source, .. } => chain.push(source.to_string()),
            DispatchError::Stopped { last: Some(last), .. } => chain.extend(last.cause_chain()),
            _ => {}
        }
        chain
    }
}

/// Workflow-level failure of one owning process
#[derive(Error, Debug, Clone, PartialEq)]
#[error("processor '{processor}' failed on job {index} of {process}: {error}")]
pub struct ProcessFailure {
    pub process: OwningProcess,
    pub processor: String,
    pub index: IndexPath,
    pub error: DispatchError,
}

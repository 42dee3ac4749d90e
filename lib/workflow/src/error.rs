//! Error types for the workflow crate.
//!
//! Each layer has its own error type:
//! - `GraphError`: structural mutations, input resolution and document hydration
//! - `RunError`: run requests rejected before a task starts
//! - `StoreError`: remote workflow store failures
//! - `LoadError`: opening a remote workflow (remote or document failure)
//! - `SaveError`: persisting the current graph (remote or document failure)
//!
//! All of them classify into an [`ErrorKind`] so callers can decide how to
//! surface a failure without matching every variant.

use crate::edge::TargetHandle;
use crate::node::NodeKind;
use nodeloom_core::{EdgeId, NodeId, TaskId, WorkflowId};
use std::fmt;

/// Coarse classification of engine errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed request; rejected without any change.
    Validation,
    /// Referenced node, edge or workflow does not exist.
    NotFound,
    /// The request would violate a single-input invariant.
    Conflict,
    /// A run for the node is already in flight.
    AlreadyRunning,
    /// Network, model or persistence failure.
    Remote,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::NotFound => "not found",
            Self::Conflict => "conflict",
            Self::AlreadyRunning => "already running",
            Self::Remote => "remote",
        };
        f.write_str(name)
    }
}

/// Errors from graph operations.
///
/// A mutation that returns one of these has not changed the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The node kind string is not one this engine knows.
    UnknownNodeKind { kind: String },
    /// A payload or patch does not match the node's kind.
    PayloadKindMismatch {
        expected: NodeKind,
        actual: NodeKind,
    },
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// Edge with the given ID was not found in the graph.
    EdgeNotFound { edge_id: EdgeId },
    /// An edge would connect a node to itself.
    SelfLoop { node_id: NodeId },
    /// The target node has no input slot with this name.
    InvalidTargetHandle {
        node_id: NodeId,
        kind: NodeKind,
        handle: String,
    },
    /// Nodes expose a single output slot; any other source handle is rejected.
    InvalidSourceHandle { node_id: NodeId, handle: String },
    /// A scalar input slot already has an incoming edge.
    InputOccupied {
        node_id: NodeId,
        handle: TargetHandle,
        existing: EdgeId,
    },
    /// An identical connection, or an edge with the same id, already exists.
    DuplicateEdge { existing: EdgeId },
    /// A node with the same id already exists.
    DuplicateNode { node_id: NodeId },
    /// The node exists but is not a model invocation node.
    NotAModelNode { node_id: NodeId, kind: NodeKind },
    /// A persisted document could not be turned into a graph.
    InvalidDocument { reason: String },
}

impl GraphError {
    /// Returns the error's classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound { .. } | Self::EdgeNotFound { .. } => ErrorKind::NotFound,
            Self::InputOccupied { .. } | Self::DuplicateEdge { .. } | Self::DuplicateNode { .. } => {
                ErrorKind::Conflict
            }
            Self::UnknownNodeKind { .. }
            | Self::PayloadKindMismatch { .. }
            | Self::SelfLoop { .. }
            | Self::InvalidTargetHandle { .. }
            | Self::InvalidSourceHandle { .. }
            | Self::NotAModelNode { .. }
            | Self::InvalidDocument { .. } => ErrorKind::Validation,
        }
    }
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNodeKind { kind } => write!(f, "unknown node kind: {kind}"),
            Self::PayloadKindMismatch { expected, actual } => {
                write!(f, "payload for {actual} node given to a {expected} node")
            }
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::EdgeNotFound { edge_id } => write!(f, "edge not found: {edge_id}"),
            Self::SelfLoop { node_id } => {
                write!(f, "node {node_id} cannot be connected to itself")
            }
            Self::InvalidTargetHandle {
                node_id,
                kind,
                handle,
            } => {
                write!(f, "{kind} node {node_id} has no input '{handle}'")
            }
            Self::InvalidSourceHandle { node_id, handle } => {
                write!(f, "node {node_id} has no output '{handle}'")
            }
            Self::InputOccupied {
                node_id,
                handle,
                existing,
            } => {
                write!(
                    f,
                    "input '{handle}' on node {node_id} is already connected by edge {existing}"
                )
            }
            Self::DuplicateEdge { existing } => {
                write!(f, "connection already exists as edge {existing}")
            }
            Self::DuplicateNode { node_id } => write!(f, "node already exists: {node_id}"),
            Self::NotAModelNode { node_id, kind } => {
                write!(f, "node {node_id} is a {kind} node, not a model node")
            }
            Self::InvalidDocument { reason } => write!(f, "invalid workflow document: {reason}"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors returned synchronously by a run request.
///
/// Failures after a task has started are never reported this way; they are
/// recorded on the task and the node instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// Only model invocation nodes can run.
    NotRunnable { node_id: NodeId, kind: NodeKind },
    /// A task for this node is still running.
    AlreadyRunning { node_id: NodeId, task_id: TaskId },
    /// No async runtime is available to drive the invocation.
    NoRuntime,
}

impl RunError {
    /// Returns the error's classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound { .. } => ErrorKind::NotFound,
            Self::NotRunnable { .. } | Self::NoRuntime => ErrorKind::Validation,
            Self::AlreadyRunning { .. } => ErrorKind::AlreadyRunning,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::NotRunnable { node_id, kind } => {
                write!(f, "{kind} node {node_id} cannot be run")
            }
            Self::AlreadyRunning { node_id, task_id } => {
                write!(f, "node {node_id} is already running as task {task_id}")
            }
            Self::NoRuntime => write!(f, "no async runtime available to run the node"),
        }
    }
}

impl std::error::Error for RunError {}

/// Errors from the remote workflow store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transport failure or an unexpected HTTP status.
    RequestFailed { reason: String },
    /// The workflow does not exist remotely.
    NotFound { workflow_id: WorkflowId },
    /// The store refused the request.
    Rejected { status: u16, reason: String },
    /// The response body could not be decoded.
    ResponseParseFailed { reason: String },
    /// The request timed out.
    Timeout,
    /// The store client is misconfigured.
    InvalidConfig { reason: String },
}

impl StoreError {
    /// Returns the error's classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidConfig { .. } => ErrorKind::Validation,
            Self::RequestFailed { .. }
            | Self::Rejected { .. }
            | Self::ResponseParseFailed { .. }
            | Self::Timeout => ErrorKind::Remote,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestFailed { reason } => write!(f, "workflow store request failed: {reason}"),
            Self::NotFound { workflow_id } => write!(f, "workflow not found: {workflow_id}"),
            Self::Rejected { status, reason } => {
                write!(f, "workflow store rejected request ({status}): {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse workflow store response: {reason}")
            }
            Self::Timeout => write!(f, "workflow store request timed out"),
            Self::InvalidConfig { reason } => {
                write!(f, "invalid workflow store configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from opening a remote workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The document could not be fetched.
    Remote(StoreError),
    /// The fetched document is not a valid graph.
    Document(GraphError),
}

impl LoadError {
    /// Returns the error's classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote(e) => e.kind(),
            Self::Document(e) => e.kind(),
        }
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(e) => write!(f, "failed to fetch workflow: {e}"),
            Self::Document(e) => write!(f, "failed to load workflow: {e}"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<StoreError> for LoadError {
    fn from(err: StoreError) -> Self {
        Self::Remote(err)
    }
}

impl From<GraphError> for LoadError {
    fn from(err: GraphError) -> Self {
        Self::Document(err)
    }
}

/// Errors from saving the current graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveError {
    /// The store rejected or never received the save.
    Remote(StoreError),
    /// The graph could not be encoded as a document.
    Document(GraphError),
}

impl SaveError {
    /// Returns the error's classification.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Remote(e) => e.kind(),
            Self::Document(e) => e.kind(),
        }
    }
}

impl fmt::Display for SaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(e) => write!(f, "failed to save workflow: {e}"),
            Self::Document(e) => write!(f, "failed to encode workflow: {e}"),
        }
    }
}

impl std::error::Error for SaveError {}

impl From<StoreError> for SaveError {
    fn from(err: StoreError) -> Self {
        Self::Remote(err)
    }
}

impl From<GraphError> for SaveError {
    fn from(err: GraphError) -> Self {
        Self::Document(err)
    }
}

//! Error types for the graph engine
//!
//! Three layers, from the inside out:
//!
//! - [`NodeError`]: what a node reports about one execution attempt
//! - [`StructuralError`]: construction bugs detected while running a graph
//! - [`GraphError`]: run-level failures surfaced by the executor
//!
//! A failed run never exposes a `GraphError` directly to callers of the
//! service layer; it is flattened into a [`RunFailure`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::node::NodeName;

/// Error reported by a node for a single execution attempt
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeError {
    /// Upstream collaborator failed in a way that may succeed on retry
    /// (rate limit, unavailable, connection reset)
    #[error("transient collaborator error: {0}")]
    Transient(String),

    /// A bounded-time call did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The node cannot produce a result for this state
    #[error("node failed: {0}")]
    Fatal(String),

    /// The run was cancelled while the node was waiting on a collaborator
    #[error("cancelled while waiting on a collaborator")]
    Cancelled,
}

impl NodeError {
    /// Create a transient error
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Create a fatal error
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Check if another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, NodeError::Transient(_) | NodeError::Timeout(_))
    }

    /// Check if the error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, NodeError::Timeout(_))
    }
}

/// Graph contract violations. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StructuralError {
    /// A node returned a delta containing a field outside its write set
    #[error("node {node} wrote undeclared field '{field}'")]
    UndeclaredWrite { node: NodeName, field: String },

    /// No routing rule matched for a non-terminal node
    #[error("no route from {node} for outcome '{outcome}'")]
    UnresolvedRoute { node: NodeName, outcome: String },

    /// Two nodes in the same step write (or declare a write to) one field
    #[error("merge conflict on field '{field}' between {writers:?}")]
    MergeConflict { field: String, writers: Vec<NodeName> },

    /// Routing or a checkpoint referenced a node the graph does not have
    #[error("unknown node: {0}")]
    UnknownNode(NodeName),
}

/// Errors that end a run
#[derive(Debug, Error)]
pub enum GraphError {
    /// Contract violation, with the step and state version it happened at
    #[error("structural error at step {step} (state v{version}): {source}")]
    Structural {
        #[source]
        source: StructuralError,
        step: usize,
        version: u64,
    },

    /// A retryable node error persisted past the node's retry policy
    #[error("node {node} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        node: NodeName,
        attempts: usize,
        #[source]
        source: NodeError,
    },

    /// A node reported a non-retryable error
    #[error("node {node} failed: {source}")]
    NodeFailed {
        node: NodeName,
        #[source]
        source: NodeError,
    },

    /// A bounded loop ran out of budget and the escalation terminal was reached
    #[error("retry budget exceeded at {node}: {counter} = {value}, max {max}")]
    RetryBudgetExceeded {
        node: NodeName,
        counter: String,
        value: u64,
        max: u64,
    },

    /// The global step limit was reached before a terminal node
    #[error("step limit exceeded: {0}")]
    StepLimitExceeded(usize),

    /// Run cancelled through its cancellation token
    #[error("run cancelled")]
    Cancelled,

    /// Whole-run deadline elapsed
    #[error("run timed out after {0:?}")]
    RunTimeout(Duration),

    /// Checkpoint persistence failed
    #[error("checkpoint error: {0}")]
    CheckpointError(String),

    /// Checkpoint belongs to another run
    #[error("checkpoint run mismatch: expected {expected}, found {found}")]
    CheckpointMismatch { expected: String, found: String },

    /// Invalid engine or pipeline configuration
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// The service does not know this run id
    #[error("unknown run: {0}")]
    UnknownRun(String),

    /// The requested operation is not valid for the run's current status
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

impl GraphError {
    /// Attach step/version context to a structural error
    pub fn structural(source: StructuralError, step: usize, version: u64) -> Self {
        Self::Structural {
            source,
            step,
            version,
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint_error(message: impl Into<String>) -> Self {
        Self::CheckpointError(message.into())
    }

    /// Create a config error
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Create a checkpoint mismatch error
    pub fn checkpoint_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::CheckpointMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// User-visible classification
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::Structural { .. } => ErrorKind::StructuralGraph,
            GraphError::RetriesExhausted { .. } => ErrorKind::TransientCollaborator,
            GraphError::NodeFailed { .. } => ErrorKind::NodeFailure,
            GraphError::RetryBudgetExceeded { .. } => ErrorKind::RetryBudgetExceeded,
            GraphError::StepLimitExceeded(_) => ErrorKind::StepLimitExceeded,
            GraphError::Cancelled => ErrorKind::Cancelled,
            GraphError::RunTimeout(_) => ErrorKind::Timeout,
            GraphError::CheckpointError(_) | GraphError::CheckpointMismatch { .. } => {
                ErrorKind::Checkpoint
            }
            GraphError::ConfigError(_)
            | GraphError::UnknownRun(_)
            | GraphError::InvalidTransition(_) => ErrorKind::Configuration,
        }
    }

    /// The node the failure originated from, if any
    pub fn node(&self) -> Option<&NodeName> {
        match self {
            GraphError::Structural { source, .. } => match source {
                StructuralError::UndeclaredWrite { node, .. }
                | StructuralError::UnresolvedRoute { node, .. } => Some(node),
                StructuralError::MergeConflict { writers, .. } => writers.first(),
                StructuralError::UnknownNode(node) => Some(node),
            },
            GraphError::RetriesExhausted { node, .. }
            | GraphError::NodeFailed { node, .. }
            | GraphError::RetryBudgetExceeded { node, .. } => Some(node),
            _ => None,
        }
    }

    /// Check if the error is a structural (construction) bug
    pub fn is_structural(&self) -> bool {
        matches!(self, GraphError::Structural { .. })
    }
}

/// User-visible error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    TransientCollaborator,
    StructuralGraph,
    NodeFailure,
    RetryBudgetExceeded,
    StepLimitExceeded,
    Cancelled,
    Timeout,
    Checkpoint,
    Configuration,
}

/// What a failed run exposes: classification, origin and the last merged
/// state version. No internal error chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: ErrorKind,
    pub node: Option<NodeName>,
    pub step: usize,
    pub state_version: u64,
    pub message: String,
}

impl RunFailure {
    /// Flatten a run-level error
    pub fn from_error(error: &GraphError, step: usize, state_version: u64) -> Self {
        Self {
            kind: error.kind(),
            node: error.node().cloned(),
            step,
            state_version,
            message: error.to_string(),
        }
    }
}

use thiserror::Error;
use uuid::Uuid;

/// Errors raised while validating a workflow graph, before any node runs.
#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error(
        "workflow graph contains a cycle or unreachable nodes: ordered {ordered} of {total} nodes"
    )]
    CyclicGraph { ordered: usize, total: usize },
}

/// Errors raised while evaluating a single node.
///
/// These never escape the run: the engine records them on the failing node
/// and at the execution level, then skips everything downstream.
#[derive(Error, Debug, Clone)]
pub enum EvaluationError {
    #[error("node '{node_id}' failed: {message}")]
    Node { node_id: String, message: String },

    #[error("node '{node_id}' was reached before upstream node '{upstream_id}' completed")]
    UpstreamNotCompleted {
        node_id: String,
        upstream_id: String,
    },
}

/// Errors returned by the execution registry.
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unknown workflow id '{workflow_id}'")]
    UnknownWorkflow { workflow_id: Uuid },
}

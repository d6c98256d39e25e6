//! Prelude module for convenient imports
//!
//! Re-exports the most commonly used types and traits so consumers can
//! pull in the whole board-to-run surface with a single `use`.
//!
//! # Example
//!
//! ```rust,no_run
//! use boardflow::prelude::*;
//!
//! let registry = WorkflowRegistry::default();
//! let snapshot = CanvasSnapshot::default();
//! let state = registry.start("board-1", snapshot, None, None).unwrap();
//! println!("run finished with status {:?}", state.status);
//! ```

// Store and execution surface
pub use crate::registry::{RetentionPolicy, WorkflowRegistry, WorkflowRegistryBuilder};

// Canvas input model
pub use crate::canvas::{
    BoardCanvas, CanvasBounds, CanvasConnection, CanvasImage, CanvasLayer, CanvasPoint,
    CanvasSize, CanvasSnapshot, ConnectionAnchor, ConnectionEndpoint, ConnectionLabel,
    ImageSource,
};

// Workflow model
pub use crate::workflow::{
    ExecutionListItem, NodeConfig, NodeKind, NodeRunState, NodeRunStatus, OperationResult,
    PortRef, RunOptions, RunPriority, RunStatus, WorkflowDefinition, WorkflowEdge,
    WorkflowExecutionState, WorkflowNodeDefinition,
};

// Compilation and graph analysis
pub use crate::compiler::{OUTPUT_NODE_ID, derive_definition, ensure_definition};
pub use crate::graph::GraphIndex;

// Extension points
pub use crate::directive::{DirectiveResolution, DirectiveResolver, StubDirectiveResolver};
pub use crate::engine::{EvalContext, EvaluatorRegistry, NodeEvaluator, PROMPT_SEPARATOR};

// Error types
pub use crate::error::{EngineError, EvaluationError, ValidationError};

// External id type used throughout the API
pub use uuid::Uuid;

//! Runtime state model: per-node run bookkeeping, cached operation
//! results, and the externally exposed execution snapshot.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Execution status for a single workflow node.
///
/// Within one run a node only moves forward: idle, then queued/running,
/// then one of the terminal states. Only an explicit recompute resets a
/// node back to idle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    #[default]
    Idle,
    Queued,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeRunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeRunStatus::Completed | NodeRunStatus::Failed | NodeRunStatus::Skipped
        )
    }
}

/// Overall workflow execution status.
///
/// `Cancelled` is part of the wire vocabulary but is never produced here;
/// cancellation of an in-flight run is not supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NotStarted,
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

/// Runtime state for a workflow node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRunState {
    pub node_id: String,
    #[serde(default)]
    pub status: NodeRunStatus,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub output_asset: Option<String>,
    #[serde(default)]
    pub output_metadata: AHashMap<String, serde_json::Value>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub upstream_ids: Vec<String>,
}

impl NodeRunState {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            status: NodeRunStatus::Idle,
            started_at: None,
            finished_at: None,
            progress: 0.0,
            output_asset: None,
            output_metadata: AHashMap::new(),
            error_message: None,
            cached: false,
            upstream_ids: Vec::new(),
        }
    }

    /// Clears run bookkeeping back to idle; `upstream_ids` stay, they are
    /// graph-derived rather than run-derived.
    pub(crate) fn reset(&mut self) {
        self.status = NodeRunStatus::Idle;
        self.started_at = None;
        self.finished_at = None;
        self.progress = 0.0;
        self.output_asset = None;
        self.output_metadata = AHashMap::new();
        self.error_message = None;
        self.cached = false;
    }
}

/// Normalized output produced by one workflow node. Held per-execution in
/// an id-keyed results table, which doubles as the memoization cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationResult {
    pub node_id: String,
    #[serde(default)]
    pub asset_url: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub metadata: AHashMap<String, serde_json::Value>,
}

impl OperationResult {
    /// Metadata map with prompt and asset folded in, for node-state display.
    pub fn materialize_metadata(&self) -> AHashMap<String, serde_json::Value> {
        let mut data = self.metadata.clone();
        if let Some(prompt) = &self.prompt {
            data.entry("prompt".to_string())
                .or_insert_with(|| serde_json::Value::String(prompt.clone()));
        }
        if let Some(asset_url) = &self.asset_url {
            data.entry("asset_url".to_string())
                .or_insert_with(|| serde_json::Value::String(asset_url.clone()));
        }
        data
    }
}

/// Externally exposed snapshot of a workflow execution.
///
/// Always a deep copy: it never shares mutable structure with the live
/// execution owned by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionState {
    pub workflow_id: Uuid,
    pub board_id: String,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub node_states: Vec<NodeRunState>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_node_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl WorkflowExecutionState {
    pub fn node(&self, node_id: &str) -> Option<&NodeRunState> {
        self.node_states.iter().find(|ns| ns.node_id == node_id)
    }
}

/// Lightweight listing entry for an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionListItem {
    pub workflow_id: Uuid,
    pub board_id: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

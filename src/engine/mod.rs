//! Execution engine: the per-run aggregate and the sequential run loop.
//!
//! Evaluation is single-threaded over the topological order. Nodes perform
//! lightweight text/metadata synthesis; the heavy media call happens later,
//! asynchronously, through the registry's task linkage.

pub mod evaluators;

pub use evaluators::{EvalContext, EvaluatorRegistry, NodeEvaluator};

use crate::canvas::CanvasSnapshot;
use crate::directive::DirectiveResolver;
use crate::error::{EvaluationError, ValidationError};
use crate::graph::GraphIndex;
use crate::workflow::{
    NodeRunState, NodeRunStatus, OperationResult, RunOptions, RunStatus, WorkflowDefinition,
    WorkflowExecutionState,
};
use ahash::{AHashMap, AHashSet};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

/// Separator used when joining aggregated prompt fragments.
pub const PROMPT_SEPARATOR: &str = ", ";

/// Trims, drops empties, and deduplicates prompts keeping first occurrence.
pub(crate) fn unique_prompts<I>(prompts: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen: AHashSet<String> = AHashSet::new();
    let mut ordered = Vec::new();
    for prompt in prompts {
        let normalized = prompt.trim();
        if normalized.is_empty() || !seen.insert(normalized.to_string()) {
            continue;
        }
        ordered.push(normalized.to_string());
    }
    ordered
}

/// In-memory representation of one workflow run. Owned exclusively by the
/// registry; everything external sees deep copies of `state`.
#[derive(Debug, Clone)]
pub(crate) struct WorkflowExecution {
    pub workflow_id: Uuid,
    pub board_id: String,
    pub owner_id: Option<String>,
    pub snapshot: CanvasSnapshot,
    pub definition: WorkflowDefinition,
    pub options: RunOptions,
    pub state: WorkflowExecutionState,
    pub results: AHashMap<String, OperationResult>,
    pub graph: GraphIndex,
    pub final_prompt: Option<String>,
    pub task_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowExecution {
    pub fn new(
        workflow_id: Uuid,
        board_id: &str,
        owner_id: Option<&str>,
        snapshot: CanvasSnapshot,
        definition: WorkflowDefinition,
        options: RunOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            workflow_id,
            board_id: board_id.to_string(),
            owner_id: owner_id.map(str::to_string),
            snapshot,
            definition,
            options,
            state: WorkflowExecutionState {
                workflow_id,
                board_id: board_id.to_string(),
                status: RunStatus::NotStarted,
                node_states: Vec::new(),
                started_at: Some(now),
                finished_at: None,
                updated_at: Some(now),
                current_node_id: None,
                error_message: None,
            },
            results: AHashMap::new(),
            graph: GraphIndex::default(),
            final_prompt: None,
            task_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Synchronizes derived structures after the definition changes:
    /// rebuilds the graph index, prunes states for removed nodes, creates
    /// idle states for new ones, and refreshes every state's upstream ids.
    pub fn rebuild_graph(&mut self) -> Result<(), ValidationError> {
        self.graph = GraphIndex::build(&mut self.definition)?;

        let live: AHashSet<&str> = self
            .definition
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect();
        self.state
            .node_states
            .retain(|ns| live.contains(ns.node_id.as_str()));

        let known: AHashSet<String> = self
            .state
            .node_states
            .iter()
            .map(|ns| ns.node_id.clone())
            .collect();
        for node in &self.definition.nodes {
            if !known.contains(&node.id) {
                self.state.node_states.push(NodeRunState::new(&node.id));
            }
        }

        for ns in &mut self.state.node_states {
            ns.upstream_ids = self
                .graph
                .incoming(&ns.node_id)
                .iter()
                .map(|edge| edge.source.node_id.clone())
                .collect();
        }
        Ok(())
    }

    /// Deep copy of the current state for external consumption.
    pub fn materialize_state(&self) -> WorkflowExecutionState {
        self.state.clone()
    }

    fn node_state_mut(&mut self, node_id: &str) -> Option<&mut NodeRunState> {
        self.state
            .node_states
            .iter_mut()
            .find(|ns| ns.node_id == node_id)
    }
}

/// Evaluates every node in topological order.
///
/// `dirty` of `None` means a full run; otherwise nodes outside the dirty
/// set short-circuit as cache hits. On the first node failure everything
/// unfinished downstream is skipped and the run stops.
pub(crate) fn run_execution(
    execution: &mut WorkflowExecution,
    dirty: Option<&AHashSet<String>>,
    evaluators: &EvaluatorRegistry,
    resolver: &dyn DirectiveResolver,
) {
    execution.state.status = RunStatus::Running;
    execution.state.updated_at = Some(Utc::now());

    let order: Vec<String> = execution.graph.order().to_vec();
    for (index, node_id) in order.iter().enumerate() {
        let is_dirty = dirty.is_none_or(|set| set.contains(node_id));
        if !is_dirty {
            if let Some(cached) = execution.results.get(node_id) {
                debug!(node_id = %node_id, "cache hit, skipping evaluation");
                let output_asset = cached.asset_url.clone();
                let output_metadata = cached.materialize_metadata();
                if let Some(ns) = execution.node_state_mut(node_id) {
                    ns.status = NodeRunStatus::Completed;
                    ns.cached = true;
                    ns.output_asset = output_asset;
                    ns.output_metadata = output_metadata;
                    ns.finished_at = ns.finished_at.or_else(|| Some(Utc::now()));
                }
                continue;
            }
        }

        // Defensive gate: with a correct topological order every direct
        // upstream is already completed; anything else is a hard stop.
        let unmet = execution
            .graph
            .incoming(node_id)
            .iter()
            .map(|edge| edge.source.node_id.clone())
            .find(|dep| {
                execution
                    .state
                    .node_states
                    .iter()
                    .find(|ns| &ns.node_id == dep)
                    .is_none_or(|ns| ns.status != NodeRunStatus::Completed)
            });
        if let Some(upstream_id) = unmet {
            let err = EvaluationError::UpstreamNotCompleted {
                node_id: node_id.clone(),
                upstream_id,
            };
            warn!(node_id = %node_id, error = %err, "prerequisite check failed");
            let message = err.to_string();
            if let Some(ns) = execution.node_state_mut(node_id) {
                ns.status = NodeRunStatus::Skipped;
                ns.error_message = Some(message.clone());
            }
            execution.state.status = RunStatus::Failed;
            execution.state.error_message = Some(message);
            break;
        }

        // Ordering ids come from the definition itself; GraphIndex::build
        // cannot emit an id without a backing node. Checked before the
        // running transition so a mismatch leaves the node idle.
        let Some(node_index) = execution
            .definition
            .nodes
            .iter()
            .position(|node| &node.id == node_id)
        else {
            continue;
        };

        let now = Utc::now();
        if let Some(ns) = execution.node_state_mut(node_id) {
            ns.status = NodeRunStatus::Running;
            ns.started_at = Some(now);
            ns.cached = false;
        }
        execution.state.current_node_id = Some(node_id.clone());
        execution.state.updated_at = Some(now);

        let node = &execution.definition.nodes[node_index];
        let upstream: Vec<_> = execution
            .graph
            .incoming(node_id)
            .iter()
            .filter_map(|edge| {
                execution
                    .results
                    .get(&edge.source.node_id)
                    .map(|result| (edge, result))
            })
            .collect();
        let ctx = EvalContext {
            node,
            snapshot: &execution.snapshot,
            options: &execution.options,
            upstream,
            resolver,
        };
        let outcome = evaluators.get(node.kind).evaluate(&ctx);

        match outcome {
            Ok(result) => {
                let output_asset = result.asset_url.clone();
                let output_metadata = result.materialize_metadata();
                execution.results.insert(node_id.clone(), result);
                let now = Utc::now();
                if let Some(ns) = execution.node_state_mut(node_id) {
                    ns.status = NodeRunStatus::Completed;
                    ns.output_asset = output_asset;
                    ns.output_metadata = output_metadata;
                    ns.finished_at = Some(now);
                }
                execution.updated_at = now;
            }
            Err(err) => {
                warn!(node_id = %node_id, error = %err, "workflow node failed");
                let message = err.to_string();
                let now = Utc::now();
                if let Some(ns) = execution.node_state_mut(node_id) {
                    ns.status = NodeRunStatus::Failed;
                    ns.error_message = Some(message.clone());
                    ns.finished_at = Some(now);
                }
                execution.state.status = RunStatus::Failed;
                execution.state.error_message = Some(message);
                execution.state.current_node_id = Some(node_id.clone());
                execution.state.updated_at = Some(now);
                for skipped_id in &order[index + 1..] {
                    if let Some(ns) = execution.node_state_mut(skipped_id) {
                        if !ns.status.is_terminal() {
                            ns.status = NodeRunStatus::Skipped;
                            ns.finished_at = Some(now);
                        }
                    }
                }
                break;
            }
        }
    }

    execution.state.current_node_id = None;
    let now = Utc::now();
    execution.state.finished_at = Some(now);
    execution.state.updated_at = Some(now);

    if !matches!(execution.state.status, RunStatus::Failed | RunStatus::Partial) {
        let any_failed = execution
            .state
            .node_states
            .iter()
            .any(|ns| ns.status == NodeRunStatus::Failed);
        let any_skipped = execution
            .state
            .node_states
            .iter()
            .any(|ns| ns.status == NodeRunStatus::Skipped);
        execution.state.status = if any_failed {
            RunStatus::Failed
        } else if any_skipped {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        };
    }

    execution.final_prompt = extract_final_prompt(execution);
    execution.updated_at = now;
}

/// Prefers a result on a designated output node that carries prompt text,
/// the last such node in topological order winning; otherwise concatenates
/// every produced prompt in topological order.
fn extract_final_prompt(execution: &WorkflowExecution) -> Option<String> {
    let output_ids: AHashSet<&str> = execution
        .definition
        .output_ids
        .iter()
        .map(String::as_str)
        .collect();
    let from_output = execution
        .graph
        .order()
        .iter()
        .filter(|node_id| output_ids.contains(node_id.as_str()))
        .filter_map(|node_id| execution.results.get(node_id))
        .filter_map(|result| {
            result.prompt.as_deref().filter(|p| !p.is_empty()).or_else(|| {
                result
                    .metadata
                    .get("prompt")
                    .and_then(|v| v.as_str())
                    .filter(|p| !p.is_empty())
            })
        })
        .last();
    if let Some(prompt) = from_output {
        return Some(prompt.to_string());
    }

    let prompts = execution
        .graph
        .order()
        .iter()
        .filter_map(|node_id| execution.results.get(node_id))
        .filter_map(|result| {
            result.prompt.clone().filter(|p| !p.is_empty()).or_else(|| {
                result
                    .metadata
                    .get("prompt")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
        });
    let unique = unique_prompts(prompts.collect::<Vec<_>>());
    if unique.is_empty() {
        None
    } else {
        Some(unique.join(PROMPT_SEPARATOR))
    }
}

//! Execution store: owns every live workflow execution and all mutation
//! paths into them.
//!
//! The outer map lock is only held for bookkeeping; `start` and
//! `recompute` hold the per-execution lock for the whole run, so exactly
//! one run can be in flight per workflow id. Every read returns a deep
//! copy, so a reader can never race a concurrent recompute.

use crate::canvas::CanvasSnapshot;
use crate::compiler;
use crate::directive::{DirectiveResolver, StubDirectiveResolver};
use crate::engine::{EvaluatorRegistry, NodeEvaluator, WorkflowExecution, run_execution};
use crate::error::EngineError;
use crate::workflow::{
    ExecutionListItem, NodeRunStatus, RunOptions, RunStatus, WorkflowExecutionState,
};
use ahash::AHashMap;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Lifetime policy for retained executions.
///
/// The default keeps everything for the process lifetime, matching the
/// behavior callers relied on historically; a bounded policy evicts the
/// least-recently-updated execution once the cap is exceeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetentionPolicy {
    pub max_executions: Option<usize>,
}

impl RetentionPolicy {
    pub fn bounded(max_executions: usize) -> Self {
        Self {
            max_executions: Some(max_executions),
        }
    }
}

type ExecutionEntry = Arc<Mutex<WorkflowExecution>>;

/// High-level manager responsible for building and executing workflows.
pub struct WorkflowRegistry {
    executions: Mutex<AHashMap<Uuid, ExecutionEntry>>,
    evaluators: EvaluatorRegistry,
    resolver: Box<dyn DirectiveResolver>,
    retention: RetentionPolicy,
}

/// Configures a registry: evaluator overrides, the directive resolver
/// backend, and the retention policy.
pub struct WorkflowRegistryBuilder {
    evaluators: EvaluatorRegistry,
    resolver: Box<dyn DirectiveResolver>,
    retention: RetentionPolicy,
}

impl WorkflowRegistryBuilder {
    pub fn new() -> Self {
        Self {
            evaluators: EvaluatorRegistry::default(),
            resolver: Box::new(StubDirectiveResolver),
            retention: RetentionPolicy::default(),
        }
    }

    /// Replaces the evaluator bound to the given evaluator's node kind.
    pub fn with_evaluator(mut self, evaluator: Box<dyn NodeEvaluator>) -> Self {
        self.evaluators.register(evaluator);
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn DirectiveResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn build(self) -> WorkflowRegistry {
        WorkflowRegistry {
            executions: Mutex::new(AHashMap::new()),
            evaluators: self.evaluators,
            resolver: self.resolver,
            retention: self.retention,
        }
    }
}

impl Default for WorkflowRegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for WorkflowRegistry {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WorkflowRegistry {
    pub fn builder() -> WorkflowRegistryBuilder {
        WorkflowRegistryBuilder::new()
    }

    /// Compiles (or accepts) a definition for the snapshot, registers a
    /// fresh execution, and runs it end-to-end.
    ///
    /// Only validation-class problems return an error; a run that fails on
    /// a node still returns its full state.
    pub fn start(
        &self,
        board_id: &str,
        snapshot: CanvasSnapshot,
        options: Option<RunOptions>,
        owner_id: Option<&str>,
    ) -> Result<WorkflowExecutionState, EngineError> {
        let definition = compiler::ensure_definition(&snapshot);
        let workflow_id = Uuid::new_v4();
        let mut execution = WorkflowExecution::new(
            workflow_id,
            board_id,
            owner_id,
            snapshot,
            definition,
            options.unwrap_or_default(),
        );
        execution.rebuild_graph()?;

        let entry = Arc::new(Mutex::new(execution));
        {
            let mut executions = self.executions.lock();
            executions.insert(workflow_id, entry.clone());
            self.enforce_retention(&mut executions, workflow_id);
        }

        let mut guard = entry.lock();
        run_execution(
            &mut guard,
            None,
            &self.evaluators,
            self.resolver.as_ref(),
        );
        Ok(guard.materialize_state())
    }

    /// Partially (or fully) re-runs an existing execution.
    ///
    /// The dirty set is the requested node ids (all of them when empty)
    /// unioned with their downstream transitive closure; everything else
    /// short-circuits as a cache hit.
    pub fn recompute(
        &self,
        workflow_id: Uuid,
        snapshot: Option<CanvasSnapshot>,
        options: Option<RunOptions>,
        node_ids: &[String],
    ) -> Result<WorkflowExecutionState, EngineError> {
        let entry = self.entry(workflow_id)?;
        let mut guard = entry.lock();
        let execution: &mut WorkflowExecution = &mut guard;

        if let Some(snapshot) = snapshot {
            execution.definition = compiler::ensure_definition(&snapshot);
            execution.snapshot = snapshot;
        }
        if let Some(options) = options {
            execution.options = options;
        }

        execution.state.status = RunStatus::NotStarted;
        execution.state.error_message = None;
        execution.state.started_at = Some(Utc::now());
        execution.state.finished_at = None;
        execution.final_prompt = None;

        execution.rebuild_graph()?;

        let seeds: Vec<String> = if node_ids.is_empty() {
            execution.graph.order().to_vec()
        } else {
            node_ids.to_vec()
        };
        let dirty = execution.graph.downstream_closure(seeds);
        debug!(workflow_id = %workflow_id, dirty = dirty.len(), "recomputing dirty set");

        execution
            .results
            .retain(|node_id, _| !dirty.contains(node_id));

        let results = &execution.results;
        for ns in &mut execution.state.node_states {
            if dirty.contains(&ns.node_id) {
                ns.reset();
            } else if let Some(cached) = results.get(&ns.node_id) {
                ns.status = NodeRunStatus::Completed;
                ns.output_asset = cached.asset_url.clone();
                ns.output_metadata = cached.materialize_metadata();
                ns.cached = true;
            }
        }

        run_execution(
            execution,
            Some(&dirty),
            &self.evaluators,
            self.resolver.as_ref(),
        );
        Ok(execution.materialize_state())
    }

    /// Lightweight listing, most-recently-updated first.
    pub fn list(&self, board_id: Option<&str>, owner_id: Option<&str>) -> Vec<ExecutionListItem> {
        let executions = self.executions.lock();
        let mut entries: Vec<ExecutionListItem> = executions
            .values()
            .filter_map(|entry| {
                let execution = entry.lock();
                if board_id.is_some_and(|board| execution.board_id != board) {
                    return None;
                }
                if owner_id.is_some_and(|owner| execution.owner_id.as_deref() != Some(owner)) {
                    return None;
                }
                Some(ExecutionListItem {
                    workflow_id: execution.workflow_id,
                    board_id: execution.board_id.clone(),
                    status: execution.state.status,
                    created_at: execution.created_at,
                    updated_at: execution.updated_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        entries
    }

    /// Deep copy of the execution state; callers can never mutate engine
    /// internals through it.
    pub fn get_state(&self, workflow_id: Uuid) -> Result<WorkflowExecutionState, EngineError> {
        let entry = self.entry(workflow_id)?;
        let execution = entry.lock();
        Ok(execution.materialize_state())
    }

    /// Links the external media-generation task to the execution.
    pub fn attach_task(&self, workflow_id: Uuid, task_id: &str) -> Result<(), EngineError> {
        let entry = self.entry(workflow_id)?;
        let mut execution = entry.lock();
        execution.task_id = Some(task_id.to_string());
        execution.updated_at = Utc::now();
        Ok(())
    }

    pub fn task_id(&self, workflow_id: Uuid) -> Result<Option<String>, EngineError> {
        let entry = self.entry(workflow_id)?;
        let execution = entry.lock();
        Ok(execution.task_id.clone())
    }

    /// Final prompt synthesized by the last run, if any.
    pub fn final_prompt(&self, workflow_id: Uuid) -> Result<Option<String>, EngineError> {
        let entry = self.entry(workflow_id)?;
        let execution = entry.lock();
        Ok(execution.final_prompt.clone())
    }

    /// Pushes the finished (or failed, when `None`) external asset onto the
    /// designated output node states.
    pub fn update_output_asset(
        &self,
        workflow_id: Uuid,
        asset_url: Option<&str>,
    ) -> Result<(), EngineError> {
        let entry = self.entry(workflow_id)?;
        let mut guard = entry.lock();
        let execution: &mut WorkflowExecution = &mut guard;

        let timestamp = Utc::now();
        for node_id in &execution.definition.output_ids {
            let Some(ns) = execution
                .state
                .node_states
                .iter_mut()
                .find(|ns| &ns.node_id == node_id)
            else {
                continue;
            };
            ns.output_asset = asset_url.map(str::to_string);
            if let Some(url) = asset_url {
                ns.output_metadata
                    .insert("final_asset_url".to_string(), json!(url));
            }
            ns.finished_at = ns.finished_at.or(Some(timestamp));
        }
        execution.updated_at = timestamp;
        Ok(())
    }

    fn entry(&self, workflow_id: Uuid) -> Result<ExecutionEntry, EngineError> {
        self.executions
            .lock()
            .get(&workflow_id)
            .cloned()
            .ok_or(EngineError::UnknownWorkflow { workflow_id })
    }

    /// Evicts least-recently-updated executions past the cap, never the
    /// one just inserted.
    fn enforce_retention(&self, executions: &mut AHashMap<Uuid, ExecutionEntry>, keep: Uuid) {
        let Some(max) = self.retention.max_executions else {
            return;
        };
        while executions.len() > max {
            let victim = executions
                .iter()
                .filter(|(id, _)| **id != keep)
                .min_by_key(|(_, entry)| entry.lock().updated_at)
                .map(|(id, _)| *id);
            match victim {
                Some(id) => {
                    debug!(workflow_id = %id, "evicting execution past retention cap");
                    executions.remove(&id);
                }
                None => break,
            }
        }
    }
}

//! End-to-end tests across compile, run, recompute, and the registry API.
mod common;

use boardflow::prelude::*;
use common::*;
use serde_json::json;
use std::sync::atomic::Ordering;

#[test]
fn labeled_canvas_runs_end_to_end() {
    let snapshot = snapshot(
        vec![
            image("img1", "https://cdn.example/1.png", Some("a lighthouse at dusk")),
            image("img2", "https://cdn.example/2.png", None),
        ],
        vec![connection(
            "c1",
            "img1",
            "img2",
            Some("match style of first image"),
        )],
    );
    let registry = WorkflowRegistry::default();
    let state = registry
        .start("board-1", snapshot, None, Some("user-1"))
        .unwrap();

    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.started_at.is_some());
    assert!(state.finished_at.is_some());
    assert!(state.current_node_id.is_none());

    // img2 aggregates its upstream description and the resolved directive.
    let img2 = state.node("image-img2").unwrap();
    let img2_prompt = img2
        .output_metadata
        .get("prompt")
        .and_then(|v| v.as_str())
        .unwrap();
    assert!(img2_prompt.contains("a lighthouse at dusk"));
    assert!(img2_prompt.contains("match style of first image"));

    // The output node's final prompt equals img2's aggregate.
    let final_prompt = registry.final_prompt(state.workflow_id).unwrap().unwrap();
    assert_eq!(final_prompt, img2_prompt);

    // Derived upstream ids are exposed on the node states.
    assert_eq!(img2.upstream_ids, vec!["image-img1"]);
    assert_eq!(
        state.node(OUTPUT_NODE_ID).unwrap().upstream_ids,
        vec!["image-img2"]
    );
}

#[test]
fn recompute_of_a_sink_reuses_cached_upstream_results() {
    let (evaluator, evaluations) = CountingEvaluator::new();
    let registry = WorkflowRegistry::builder().with_evaluator(evaluator).build();

    let state = registry
        .start("board-1", chain_snapshot(None), None, None)
        .unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(evaluations.load(Ordering::SeqCst), 3);
    let first_prompt = registry.final_prompt(state.workflow_id).unwrap();

    let state = registry
        .recompute(state.workflow_id, None, None, &["c".to_string()])
        .unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    // Only the sink re-evaluated; everything upstream replayed from cache.
    assert_eq!(evaluations.load(Ordering::SeqCst), 4);
    assert!(state.node("a").unwrap().cached);
    assert!(state.node("b").unwrap().cached);
    assert!(!state.node("c").unwrap().cached);
    assert_eq!(registry.final_prompt(state.workflow_id).unwrap(), first_prompt);
}

#[test]
fn default_recompute_re_evaluates_every_node_deterministically() {
    let (evaluator, evaluations) = CountingEvaluator::new();
    let registry = WorkflowRegistry::builder().with_evaluator(evaluator).build();

    let state = registry
        .start("board-1", chain_snapshot(None), None, None)
        .unwrap();
    let first_prompt = registry.final_prompt(state.workflow_id).unwrap();

    // An empty node id set marks the whole graph dirty.
    let state = registry
        .recompute(state.workflow_id, None, None, &[])
        .unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert_eq!(evaluations.load(Ordering::SeqCst), 6);
    assert!(state.node_states.iter().all(|ns| !ns.cached));
    assert_eq!(registry.final_prompt(state.workflow_id).unwrap(), first_prompt);
}

#[test]
fn dirty_set_extends_to_the_downstream_closure_only() {
    let (evaluator, evaluations) = CountingEvaluator::new();
    let registry = WorkflowRegistry::builder().with_evaluator(evaluator).build();

    let state = registry
        .start("board-1", chain_snapshot(None), None, None)
        .unwrap();
    assert_eq!(evaluations.load(Ordering::SeqCst), 3);
    let a_finished = state.node("a").unwrap().finished_at;

    let state = registry
        .recompute(state.workflow_id, None, None, &["b".to_string()])
        .unwrap();
    // b and its downstream c re-evaluated; a untouched.
    assert_eq!(evaluations.load(Ordering::SeqCst), 5);
    let a = state.node("a").unwrap();
    assert!(a.cached);
    assert_eq!(a.status, NodeRunStatus::Completed);
    assert_eq!(a.finished_at, a_finished);
    assert!(!state.node("b").unwrap().cached);
    assert!(!state.node("c").unwrap().cached);
}

#[test]
fn recompute_after_fixing_a_failed_node_completes_from_cache() {
    init_logging();
    let (evaluator, evaluations) = CountingEvaluator::new();
    let registry = WorkflowRegistry::builder().with_evaluator(evaluator).build();

    let state = registry
        .start("board-1", chain_snapshot(Some("b")), None, None)
        .unwrap();
    assert_eq!(state.status, RunStatus::Failed);
    assert_eq!(state.node("b").unwrap().status, NodeRunStatus::Failed);
    assert_eq!(state.node("c").unwrap().status, NodeRunStatus::Skipped);
    assert_eq!(evaluations.load(Ordering::SeqCst), 2);

    // Swap in a snapshot without the fault and recompute just b.
    let state = registry
        .recompute(
            state.workflow_id,
            Some(chain_snapshot(None)),
            None,
            &["b".to_string()],
        )
        .unwrap();
    assert_eq!(state.status, RunStatus::Completed);
    assert!(state.node("a").unwrap().cached);
    assert_eq!(state.node("b").unwrap().status, NodeRunStatus::Completed);
    assert_eq!(state.node("c").unwrap().status, NodeRunStatus::Completed);
    assert!(state.error_message.is_none());
    assert_eq!(evaluations.load(Ordering::SeqCst), 4);
    assert_eq!(
        registry.final_prompt(state.workflow_id).unwrap().as_deref(),
        Some("alpha, beta, gamma")
    );
}

#[test]
fn list_filters_by_board_and_owner_most_recent_first() {
    let registry = WorkflowRegistry::default();
    let first = registry
        .start(
            "board-1",
            snapshot(vec![image("img1", "https://cdn.example/1.png", None)], vec![]),
            None,
            Some("alice"),
        )
        .unwrap();
    let second = registry
        .start(
            "board-2",
            snapshot(vec![image("img2", "https://cdn.example/2.png", None)], vec![]),
            None,
            Some("bob"),
        )
        .unwrap();

    let all = registry.list(None, None);
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].workflow_id, second.workflow_id);
    assert_eq!(all[1].workflow_id, first.workflow_id);

    let board_1 = registry.list(Some("board-1"), None);
    assert_eq!(board_1.len(), 1);
    assert_eq!(board_1[0].workflow_id, first.workflow_id);
    assert_eq!(board_1[0].status, RunStatus::Completed);

    assert_eq!(registry.list(None, Some("bob")).len(), 1);
    assert!(registry.list(Some("board-1"), Some("bob")).is_empty());

    // Touching the first execution reorders the listing.
    registry
        .attach_task(first.workflow_id, "task-123")
        .unwrap();
    let all = registry.list(None, None);
    assert_eq!(all[0].workflow_id, first.workflow_id);
}

#[test]
fn get_state_returns_an_independent_deep_copy() {
    let registry = WorkflowRegistry::default();
    let started = registry
        .start(
            "board-1",
            snapshot(vec![image("img1", "https://cdn.example/1.png", None)], vec![]),
            None,
            None,
        )
        .unwrap();

    let mut copy = registry.get_state(started.workflow_id).unwrap();
    copy.node_states.clear();
    copy.board_id = "mutated".to_string();

    let fresh = registry.get_state(started.workflow_id).unwrap();
    assert_eq!(fresh.board_id, "board-1");
    assert_eq!(fresh.node_states.len(), started.node_states.len());
}

#[test]
fn external_task_linkage_and_asset_updates() {
    let registry = WorkflowRegistry::default();
    let state = registry
        .start(
            "board-1",
            snapshot(vec![image("img1", "https://cdn.example/1.png", None)], vec![]),
            None,
            None,
        )
        .unwrap();

    registry.attach_task(state.workflow_id, "task-42").unwrap();
    assert_eq!(
        registry.task_id(state.workflow_id).unwrap().as_deref(),
        Some("task-42")
    );

    registry
        .update_output_asset(state.workflow_id, Some("https://cdn.example/final.png"))
        .unwrap();
    let state = registry.get_state(state.workflow_id).unwrap();
    let output = state.node(OUTPUT_NODE_ID).unwrap();
    assert_eq!(
        output.output_asset.as_deref(),
        Some("https://cdn.example/final.png")
    );
    assert_eq!(
        output.output_metadata.get("final_asset_url"),
        Some(&json!("https://cdn.example/final.png"))
    );

    // A null asset represents external job failure and clears the output.
    registry.update_output_asset(state.workflow_id, None).unwrap();
    let state = registry.get_state(state.workflow_id).unwrap();
    assert!(state.node(OUTPUT_NODE_ID).unwrap().output_asset.is_none());
}

#[test]
fn unknown_workflow_ids_fail_with_a_lookup_error() {
    let registry = WorkflowRegistry::default();
    let ghost = Uuid::new_v4();

    assert!(matches!(
        registry.get_state(ghost),
        Err(EngineError::UnknownWorkflow { .. })
    ));
    assert!(matches!(
        registry.recompute(ghost, None, None, &[]),
        Err(EngineError::UnknownWorkflow { .. })
    ));
    assert!(matches!(
        registry.attach_task(ghost, "task-1"),
        Err(EngineError::UnknownWorkflow { .. })
    ));
    assert!(matches!(
        registry.update_output_asset(ghost, None),
        Err(EngineError::UnknownWorkflow { .. })
    ));
}

#[test]
fn bounded_retention_evicts_the_least_recently_updated_execution() {
    let registry = WorkflowRegistry::builder()
        .with_retention(RetentionPolicy::bounded(1))
        .build();

    let first = registry
        .start(
            "board-1",
            snapshot(vec![image("img1", "https://cdn.example/1.png", None)], vec![]),
            None,
            None,
        )
        .unwrap();
    let second = registry
        .start(
            "board-2",
            snapshot(vec![image("img2", "https://cdn.example/2.png", None)], vec![]),
            None,
            None,
        )
        .unwrap();

    let listed = registry.list(None, None);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].workflow_id, second.workflow_id);
    assert!(matches!(
        registry.get_state(first.workflow_id),
        Err(EngineError::UnknownWorkflow { .. })
    ));
}

#[test]
fn run_options_are_recorded_but_advisory() {
    let options = RunOptions {
        use_llm: false,
        greedy_cache: true,
        focus_node_ids: vec!["image-img1".to_string()],
        priority: RunPriority::High,
        metadata: {
            let mut metadata = ahash::AHashMap::new();
            metadata.insert("trace".to_string(), json!("test"));
            metadata
        },
    };
    let registry = WorkflowRegistry::default();
    let state = registry
        .start(
            "board-1",
            snapshot(vec![image("img1", "https://cdn.example/1.png", None)], vec![]),
            Some(options),
            None,
        )
        .unwrap();
    // Advisory options never change completion semantics.
    assert_eq!(state.status, RunStatus::Completed);
}

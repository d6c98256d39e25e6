//! Shared fixtures for the integration test suites.
#![allow(dead_code)]

use ahash::AHashMap;
use boardflow::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Opt-in log output while debugging test runs (`RUST_LOG=debug`).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn image(id: &str, url: &str, description: Option<&str>) -> CanvasImage {
    CanvasImage {
        id: id.to_string(),
        url: url.to_string(),
        bounds: CanvasBounds {
            position: CanvasPoint { x: 0.0, y: 0.0 },
            size: CanvasSize {
                width: 320.0,
                height: 240.0,
            },
            rotation: 0.0,
            scale: 1.0,
        },
        z_index: 0,
        name: Some(format!("Image {id}")),
        caption: None,
        description: description.map(str::to_string),
        source: ImageSource::Upload,
        thumbnail_url: None,
        created_at: None,
        updated_at: None,
    }
}

pub fn connection(
    id: &str,
    source_image: &str,
    target_image: &str,
    label: Option<&str>,
) -> CanvasConnection {
    CanvasConnection {
        id: id.to_string(),
        source: ConnectionEndpoint {
            image_id: source_image.to_string(),
            anchor: ConnectionAnchor::Center,
        },
        target: ConnectionEndpoint {
            image_id: target_image.to_string(),
            anchor: ConnectionAnchor::Center,
        },
        path_points: Vec::new(),
        label: label.map(|text| ConnectionLabel {
            text: text.to_string(),
            position: CanvasPoint { x: 0.0, y: 0.0 },
            background: "#BFDBFE".to_string(),
            color: "#FFFFFF".to_string(),
        }),
        created_at: None,
        updated_at: None,
    }
}

pub fn snapshot(images: Vec<CanvasImage>, connections: Vec<CanvasConnection>) -> CanvasSnapshot {
    CanvasSnapshot {
        images,
        connections,
        ..CanvasSnapshot::default()
    }
}

pub fn node(id: &str, kind: NodeKind, prompt: Option<&str>) -> WorkflowNodeDefinition {
    let mut node = WorkflowNodeDefinition::new(id, kind, id);
    node.config.prompt = prompt.map(str::to_string);
    node
}

pub fn edge(id: &str, source: &str, target: &str) -> WorkflowEdge {
    WorkflowEdge {
        id: id.to_string(),
        source: PortRef::new(source),
        target: PortRef::new(target),
        label: None,
    }
}

pub fn definition(
    nodes: Vec<WorkflowNodeDefinition>,
    edges: Vec<WorkflowEdge>,
    output_ids: Vec<&str>,
) -> WorkflowDefinition {
    WorkflowDefinition {
        nodes,
        edges,
        output_ids: output_ids.into_iter().map(str::to_string).collect(),
        ..WorkflowDefinition::default()
    }
}

/// Snapshot embedding a three-node `custom` chain a -> b -> c.
pub fn chain_snapshot(fail_node: Option<&str>) -> CanvasSnapshot {
    let mut a = node("a", NodeKind::Custom, Some("alpha"));
    let mut b = node("b", NodeKind::Custom, Some("beta"));
    let mut c = node("c", NodeKind::Custom, Some("gamma"));
    for chain_node in [&mut a, &mut b, &mut c] {
        if fail_node == Some(chain_node.id.as_str()) {
            chain_node
                .config
                .parameters
                .insert("fail".to_string(), json!(true));
        }
    }
    CanvasSnapshot {
        workflow: Some(definition(
            vec![a, b, c],
            vec![edge("e1", "a", "b"), edge("e2", "b", "c")],
            vec!["c"],
        )),
        ..CanvasSnapshot::default()
    }
}

/// Replacement `custom` evaluator that counts evaluations and fails on
/// demand (when the node carries a truthy `fail` parameter).
pub struct CountingEvaluator {
    pub evaluations: Arc<AtomicUsize>,
}

impl CountingEvaluator {
    pub fn new() -> (Box<Self>, Arc<AtomicUsize>) {
        let evaluations = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Self {
                evaluations: evaluations.clone(),
            }),
            evaluations,
        )
    }
}

impl NodeEvaluator for CountingEvaluator {
    fn kind(&self) -> NodeKind {
        NodeKind::Custom
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<OperationResult, EvaluationError> {
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        if ctx
            .node
            .config
            .parameters
            .get("fail")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
        {
            return Err(EvaluationError::Node {
                node_id: ctx.node.id.clone(),
                message: "forced failure".to_string(),
            });
        }
        let prompt = ctx
            .combined_prompt()
            .or_else(|| ctx.node.config.prompt.clone())
            .unwrap_or_else(|| ctx.node.title.clone());
        let mut metadata = AHashMap::new();
        metadata.insert("prompt".to_string(), json!(prompt));
        Ok(OperationResult {
            node_id: ctx.node.id.clone(),
            asset_url: None,
            prompt: Some(prompt),
            metadata,
        })
    }
}

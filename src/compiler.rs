//! Canvas-to-graph compilation: derives a workflow definition from a raw
//! board snapshot when none is supplied.

use crate::canvas::CanvasSnapshot;
use crate::workflow::{
    NodeConfig, NodeKind, PortRef, WorkflowDefinition, WorkflowEdge, WorkflowNodeDefinition,
};
use ahash::AHashMap;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

/// Id of the synthetic aggregation sink appended to every derived graph.
pub const OUTPUT_NODE_ID: &str = "output";

/// Uses the snapshot's embedded workflow when it has nodes, otherwise
/// derives one from the canvas content.
pub fn ensure_definition(snapshot: &CanvasSnapshot) -> WorkflowDefinition {
    match &snapshot.workflow {
        Some(workflow) if !workflow.nodes.is_empty() => workflow.clone(),
        _ => derive_definition(snapshot),
    }
}

/// Derives a workflow definition from the canvas: one `input_image` node
/// per image, one edge per connection, plus a synthetic `output` sink fed
/// by every node without outgoing edges.
///
/// Connections referencing missing images are dropped. A non-empty
/// connection label is recorded both on the edge (for directive resolution
/// at evaluation time) and as a prompt fragment on the target node.
pub fn derive_definition(snapshot: &CanvasSnapshot) -> WorkflowDefinition {
    let mut nodes: Vec<WorkflowNodeDefinition> = Vec::with_capacity(snapshot.images.len() + 1);
    let mut image_to_node: AHashMap<&str, String> = AHashMap::new();

    for image in &snapshot.images {
        let node_id = format!("image-{}", image.id);
        let config = NodeConfig {
            prompt: non_empty(image.description.as_deref())
                .or_else(|| non_empty(image.caption.as_deref()))
                .or_else(|| non_empty(image.name.as_deref())),
            ..NodeConfig::default()
        };
        let mut metadata = AHashMap::new();
        metadata.insert("image_id".to_string(), json!(image.id));
        nodes.push(WorkflowNodeDefinition {
            id: node_id.clone(),
            kind: NodeKind::InputImage,
            title: non_empty(image.name.as_deref()).unwrap_or_else(|| "Image".to_string()),
            description: image.description.clone(),
            config,
            input_ids: Vec::new(),
            metadata,
            created_at: image.created_at,
            updated_at: image.updated_at,
        });
        image_to_node.insert(image.id.as_str(), node_id);
    }

    let mut edges: Vec<WorkflowEdge> = Vec::new();
    for connection in &snapshot.connections {
        let (Some(source_id), Some(target_id)) = (
            image_to_node.get(connection.source.image_id.as_str()),
            image_to_node.get(connection.target.image_id.as_str()),
        ) else {
            debug!(connection_id = %connection.id, "dropping connection to missing image");
            continue;
        };
        let label = connection
            .label
            .as_ref()
            .map(|label| label.text.trim().to_string())
            .filter(|text| !text.is_empty());
        edges.push(WorkflowEdge {
            id: connection.id.clone(),
            source: PortRef::with_port(source_id.clone(), connection.source.anchor.as_str()),
            target: PortRef::with_port(target_id.clone(), connection.target.anchor.as_str()),
            label: label.clone(),
        });
        if let Some(text) = label {
            if let Some(target) = nodes.iter_mut().find(|node| &node.id == target_id) {
                target.config.push_prompt_fragment(&text);
            }
        }
    }

    let mut incoming: AHashMap<&str, usize> =
        nodes.iter().map(|node| (node.id.as_str(), 0)).collect();
    let mut outgoing = incoming.clone();
    for edge in &edges {
        if let Some(degree) = incoming.get_mut(edge.target.node_id.as_str()) {
            *degree += 1;
        }
        if let Some(degree) = outgoing.get_mut(edge.source.node_id.as_str()) {
            *degree += 1;
        }
    }

    let mut entry_ids: Vec<String> = nodes
        .iter()
        .filter(|node| incoming.get(node.id.as_str()).copied() == Some(0))
        .map(|node| node.id.clone())
        .collect();

    // Every node without an outgoing edge feeds the synthetic sink, so the
    // graph always has a single aggregation point.
    for node in &nodes {
        if outgoing.get(node.id.as_str()).copied() == Some(0) {
            edges.push(WorkflowEdge {
                id: format!("auto-{}-{}", node.id, OUTPUT_NODE_ID),
                source: PortRef::new(node.id.clone()),
                target: PortRef::new(OUTPUT_NODE_ID),
                label: None,
            });
        }
    }

    let mut output_node =
        WorkflowNodeDefinition::new(OUTPUT_NODE_ID, NodeKind::Output, "Final Output");
    output_node.metadata.insert("auto".to_string(), json!(true));
    nodes.push(output_node);

    if entry_ids.is_empty() {
        debug!("no zero in-degree nodes; treating every non-output node as entry");
        entry_ids = nodes
            .iter()
            .filter(|node| node.id != OUTPUT_NODE_ID)
            .map(|node| node.id.clone())
            .collect();
    }

    let mut metadata = AHashMap::new();
    metadata.insert("auto_generated".to_string(), json!(true));
    metadata.insert("generated_at".to_string(), json!(Utc::now().to_rfc3339()));

    WorkflowDefinition {
        version: "1.0".to_string(),
        nodes,
        edges,
        entry_ids,
        output_ids: vec![OUTPUT_NODE_ID.to_string()],
        metadata,
    }
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.filter(|value| !value.is_empty()).map(str::to_string)
}

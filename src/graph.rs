//! Graph validation and topological scheduling.
//!
//! The index is rebuilt from scratch whenever a definition changes and is
//! purely id-keyed: it owns cloned edges and node ids, never references
//! back into the definition, so rebuild/prune cycles cannot alias.

use crate::error::ValidationError;
use crate::workflow::{WorkflowDefinition, WorkflowEdge, WorkflowNodeDefinition};
use ahash::{AHashMap, AHashSet};
use std::collections::VecDeque;
use tracing::debug;

/// Adjacency indices plus the execution order for one workflow graph.
#[derive(Debug, Clone, Default)]
pub struct GraphIndex {
    edges_by_source: AHashMap<String, Vec<WorkflowEdge>>,
    edges_by_target: AHashMap<String, Vec<WorkflowEdge>>,
    topological_order: Vec<String>,
}

impl GraphIndex {
    /// Rebuilds the index for `definition`.
    ///
    /// Edges whose endpoints reference missing nodes are dropped from the
    /// definition silently (user-edited graphs are expected to be
    /// transiently malformed), and every node's `input_ids` is re-derived
    /// from the surviving edge set. Fails if the graph is not a DAG.
    pub fn build(definition: &mut WorkflowDefinition) -> Result<Self, ValidationError> {
        let node_ids: AHashSet<&str> = definition
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect();

        let mut edges_by_source: AHashMap<String, Vec<WorkflowEdge>> = definition
            .nodes
            .iter()
            .map(|node| (node.id.clone(), Vec::new()))
            .collect();
        let mut edges_by_target = edges_by_source.clone();

        let mut cleaned = Vec::with_capacity(definition.edges.len());
        for edge in definition.edges.drain(..) {
            if !node_ids.contains(edge.source.node_id.as_str())
                || !node_ids.contains(edge.target.node_id.as_str())
            {
                debug!(edge_id = %edge.id, "dropping dangling edge");
                continue;
            }
            if let Some(outgoing) = edges_by_source.get_mut(&edge.source.node_id) {
                outgoing.push(edge.clone());
            }
            if let Some(incoming) = edges_by_target.get_mut(&edge.target.node_id) {
                incoming.push(edge.clone());
            }
            cleaned.push(edge);
        }
        definition.edges = cleaned;

        for node in &mut definition.nodes {
            node.input_ids = edges_by_target
                .get(&node.id)
                .map(|edges| {
                    edges
                        .iter()
                        .map(|edge| edge.source.node_id.clone())
                        .collect()
                })
                .unwrap_or_default();
        }

        let topological_order = topological_order(&definition.nodes, &edges_by_source)?;

        Ok(Self {
            edges_by_source,
            edges_by_target,
            topological_order,
        })
    }

    /// Edges arriving at `node_id`, in declaration order.
    pub fn incoming(&self, node_id: &str) -> &[WorkflowEdge] {
        self.edges_by_target
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Edges leaving `node_id`, in declaration order.
    pub fn outgoing(&self, node_id: &str) -> &[WorkflowEdge] {
        self.edges_by_source
            .get(node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn order(&self) -> &[String] {
        &self.topological_order
    }

    /// Node ids reachable from `seeds` through outgoing edges, seeds
    /// included. This is the dirty set used for partial recomputation:
    /// anything downstream of a changed node must be discarded too.
    pub fn downstream_closure<I>(&self, seeds: I) -> AHashSet<String>
    where
        I: IntoIterator<Item = String>,
    {
        let mut visited: AHashSet<String> = seeds.into_iter().collect();
        let mut queue: VecDeque<String> = visited.iter().cloned().collect();
        while let Some(current) = queue.pop_front() {
            for edge in self.outgoing(&current) {
                let target_id = &edge.target.node_id;
                if visited.contains(target_id) {
                    continue;
                }
                visited.insert(target_id.clone());
                queue.push_back(target_id.clone());
            }
        }
        visited
    }
}

/// Kahn's algorithm with a FIFO queue seeded in node declaration order, so
/// identical input always yields identical output.
fn topological_order(
    nodes: &[WorkflowNodeDefinition],
    edges_by_source: &AHashMap<String, Vec<WorkflowEdge>>,
) -> Result<Vec<String>, ValidationError> {
    let mut in_degree: AHashMap<&str, usize> =
        nodes.iter().map(|node| (node.id.as_str(), 0)).collect();
    for edges in edges_by_source.values() {
        for edge in edges {
            if let Some(degree) = in_degree.get_mut(edge.target.node_id.as_str()) {
                *degree += 1;
            }
        }
    }

    let mut seeded: AHashSet<&str> = AHashSet::with_capacity(nodes.len());
    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|node| node.id.as_str())
        .filter(|id| in_degree.get(id).copied() == Some(0) && seeded.insert(*id))
        .collect();

    let mut ordering = Vec::with_capacity(nodes.len());
    while let Some(node_id) = queue.pop_front() {
        ordering.push(node_id.to_string());
        if let Some(edges) = edges_by_source.get(node_id) {
            for edge in edges {
                if let Some(degree) = in_degree.get_mut(edge.target.node_id.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(edge.target.node_id.as_str());
                    }
                }
            }
        }
    }

    if ordering.len() != nodes.len() {
        return Err(ValidationError::CyclicGraph {
            ordered: ordering.len(),
            total: nodes.len(),
        });
    }

    Ok(ordering)
}

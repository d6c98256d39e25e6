//! Workflow definition model: the compiled shape of a board graph.

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of operation kinds a workflow node can carry.
///
/// Each kind is bound to exactly one evaluator in the engine's registry;
/// new kinds are added as new variants, never as stringly-typed branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    InputImage,
    Prompt,
    StyleTransfer,
    Composite,
    Upscale,
    Output,
    LlmDirective,
    Custom,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::InputImage => "input_image",
            NodeKind::Prompt => "prompt",
            NodeKind::StyleTransfer => "style_transfer",
            NodeKind::Composite => "composite",
            NodeKind::Upscale => "upscale",
            NodeKind::Output => "output",
            NodeKind::LlmDirective => "llm_directive",
            NodeKind::Custom => "custom",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameter key under which prompt fragments accumulate on a node.
pub const PROMPT_FRAGMENTS_KEY: &str = "prompts";

/// Parameter payload for a workflow node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub strength: Option<f64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub parameters: AHashMap<String, serde_json::Value>,
}

impl NodeConfig {
    /// Appends a prompt fragment to the growable `prompts` parameter list.
    pub fn push_prompt_fragment(&mut self, fragment: &str) {
        let entry = self
            .parameters
            .entry(PROMPT_FRAGMENTS_KEY.to_string())
            .or_insert_with(|| serde_json::Value::Array(Vec::new()));
        if let serde_json::Value::Array(fragments) = entry {
            fragments.push(serde_json::Value::String(fragment.to_string()));
        }
    }

    /// Accumulated prompt fragments, in insertion order.
    pub fn prompt_fragments(&self) -> Vec<String> {
        self.parameters
            .get(PROMPT_FRAGMENTS_KEY)
            .and_then(|value| value.as_array())
            .map(|fragments| {
                fragments
                    .iter()
                    .filter_map(|value| value.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Workflow connection port: a node id plus the anchor it attaches to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortRef {
    pub node_id: String,
    #[serde(default = "default_port")]
    pub port: String,
}

fn default_port() -> String {
    "default".to_string()
}

impl PortRef {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            port: default_port(),
        }
    }

    pub fn with_port(node_id: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            port: port.into(),
        }
    }
}

/// Directed edge between workflow nodes, optionally carrying a
/// natural-language directive label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    pub source: PortRef,
    pub target: PortRef,
    #[serde(default)]
    pub label: Option<String>,
}

/// Declarative description of a workflow node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowNodeDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: NodeConfig,
    /// Always re-derived from the edge set during graph rebuild; values
    /// arriving from the outside are ignored.
    #[serde(default)]
    pub input_ids: Vec<String>,
    #[serde(default)]
    pub metadata: AHashMap<String, serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkflowNodeDefinition {
    pub fn new(id: impl Into<String>, kind: NodeKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            description: None,
            config: NodeConfig::default(),
            input_ids: Vec::new(),
            metadata: AHashMap::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// Workflow composed on top of the canvas graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub nodes: Vec<WorkflowNodeDefinition>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
    #[serde(default)]
    pub entry_ids: Vec<String>,
    #[serde(default)]
    pub output_ids: Vec<String>,
    #[serde(default)]
    pub metadata: AHashMap<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for WorkflowDefinition {
    fn default() -> Self {
        Self {
            version: default_version(),
            nodes: Vec::new(),
            edges: Vec::new(),
            entry_ids: Vec::new(),
            output_ids: Vec::new(),
            metadata: AHashMap::new(),
        }
    }
}

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Advisory scheduling priority; recorded but not acted on internally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Caller-supplied options for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunOptions {
    /// Enables higher-fidelity directive resolution.
    #[serde(default)]
    pub use_llm: bool,
    /// Reserved; cache behavior is always dirty-set-aware.
    #[serde(default)]
    pub greedy_cache: bool,
    /// Advisory hint passed through to callers, not enforced internally.
    #[serde(default)]
    pub focus_node_ids: Vec<String>,
    #[serde(default)]
    pub priority: RunPriority,
    /// Free-form passthrough for auditing.
    #[serde(default)]
    pub metadata: AHashMap<String, serde_json::Value>,
}

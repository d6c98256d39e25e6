//! Directive resolution: turning a free-text connection label into a
//! structured prompt contribution.

use crate::workflow::{NodeKind, RunOptions, WorkflowEdge};
use ahash::AHashMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Resolution result for a natural-language directive on a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectiveResolution {
    pub connection_id: String,
    pub original_text: String,
    pub resolved_prompt: String,
    pub suggested_kind: NodeKind,
    #[serde(default)]
    pub parameters: AHashMap<String, serde_json::Value>,
    pub confidence: f64,
}

impl DirectiveResolution {
    fn empty(connection_id: &str) -> Self {
        Self {
            connection_id: connection_id.to_string(),
            original_text: String::new(),
            resolved_prompt: String::new(),
            suggested_kind: NodeKind::Custom,
            parameters: AHashMap::new(),
            confidence: 0.0,
        }
    }
}

/// Contract for resolving edge labels into prompt fragments.
///
/// This is the extension point for a real language-model backend. The
/// engine only requires that the resolved text is deterministic for a
/// given (label, options) pair within one run and that it can participate
/// in prompt aggregation like any other fragment.
pub trait DirectiveResolver: Send + Sync {
    fn resolve(&self, edge: &WorkflowEdge, options: &RunOptions) -> DirectiveResolution;
}

/// Confidence assigned to a plain trimmed passthrough.
pub const PASSTHROUGH_CONFIDENCE: f64 = 0.35;
/// Confidence assigned to the normalized variant when `use_llm` is set.
pub const NORMALIZED_CONFIDENCE: f64 = 0.75;

/// Deterministic resolver used until a language-model backend is wired in.
///
/// With `use_llm` disabled the label is passed through trimmed; enabled,
/// internal whitespace is collapsed as a light normalization stand-in.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubDirectiveResolver;

impl DirectiveResolver for StubDirectiveResolver {
    fn resolve(&self, edge: &WorkflowEdge, options: &RunOptions) -> DirectiveResolution {
        let text = edge.label.as_deref().unwrap_or("").trim();
        if text.is_empty() {
            return DirectiveResolution::empty(&edge.id);
        }

        let (resolved_prompt, confidence) = if options.use_llm {
            (text.split_whitespace().join(" "), NORMALIZED_CONFIDENCE)
        } else {
            (text.to_string(), PASSTHROUGH_CONFIDENCE)
        };

        DirectiveResolution {
            connection_id: edge.id.clone(),
            original_text: text.to_string(),
            resolved_prompt,
            suggested_kind: NodeKind::Custom,
            parameters: AHashMap::new(),
            confidence,
        }
    }
}

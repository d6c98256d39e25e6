//! Per-kind node evaluators behind a shared interface.
//!
//! Each `NodeKind` variant is bound to exactly one evaluator in the
//! registry. Callers can override a binding (the test seam for forced
//! failures, and the hook for real media operations later); unrecognized
//! kinds fall back to the `Custom` passthrough behavior.

use crate::canvas::CanvasSnapshot;
use crate::directive::DirectiveResolver;
use crate::error::EvaluationError;
use crate::workflow::{NodeKind, OperationResult, RunOptions, WorkflowEdge, WorkflowNodeDefinition};
use ahash::AHashMap;
use serde_json::json;

use super::{PROMPT_SEPARATOR, unique_prompts};

/// Everything a node evaluation can see: the node, the snapshot it runs
/// against, the run options, and the results of its direct upstreams
/// paired with the edges they arrived on (in edge declaration order).
pub struct EvalContext<'a> {
    pub node: &'a WorkflowNodeDefinition,
    pub snapshot: &'a CanvasSnapshot,
    pub options: &'a RunOptions,
    pub upstream: Vec<(&'a WorkflowEdge, &'a OperationResult)>,
    pub resolver: &'a dyn DirectiveResolver,
}

impl<'a> EvalContext<'a> {
    /// Aggregated prompt text in encounter order: upstream prompts,
    /// upstream metadata prompt fields, resolved directives for labeled
    /// incoming edges, the node's own configured prompt, then accumulated
    /// fragments. Deduplicated by trimmed text, first occurrence wins.
    pub fn combined_prompt(&self) -> Option<String> {
        let mut prompts: Vec<String> = Vec::new();
        for (edge, upstream) in &self.upstream {
            if let Some(prompt) = &upstream.prompt {
                prompts.push(prompt.clone());
            }
            if let Some(prompt) = upstream.metadata.get("prompt").and_then(|v| v.as_str()) {
                prompts.push(prompt.to_string());
            }
            if edge.label.as_deref().is_some_and(|l| !l.trim().is_empty()) {
                prompts.push(self.resolver.resolve(edge, self.options).resolved_prompt);
            }
        }
        if let Some(prompt) = &self.node.config.prompt {
            prompts.push(prompt.clone());
        }
        prompts.extend(self.node.config.prompt_fragments());

        let unique = unique_prompts(prompts);
        if unique.is_empty() {
            None
        } else {
            Some(unique.join(PROMPT_SEPARATOR))
        }
    }

    /// First asset found among upstream results, in edge order.
    pub fn first_upstream_asset(&self) -> Option<String> {
        self.upstream
            .iter()
            .find_map(|(_, upstream)| upstream.asset_url.clone())
    }

    /// Ids of the upstream nodes that contributed results.
    pub fn upstream_ids(&self) -> Vec<&str> {
        self.upstream
            .iter()
            .map(|(_, upstream)| upstream.node_id.as_str())
            .collect()
    }
}

/// Contract for evaluating one node kind.
pub trait NodeEvaluator: Send + Sync {
    fn kind(&self) -> NodeKind;
    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<OperationResult, EvaluationError>;
}

struct InputImageEvaluator;

impl NodeEvaluator for InputImageEvaluator {
    fn kind(&self) -> NodeKind {
        NodeKind::InputImage
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<OperationResult, EvaluationError> {
        let image_id = ctx.node.metadata.get("image_id").and_then(|v| v.as_str());
        let image = image_id.and_then(|id| ctx.snapshot.find_image(id));
        let asset_url = image.map(|image| image.url.clone());
        let prompt = ctx
            .combined_prompt()
            .or_else(|| image.and_then(|image| image.description.clone()))
            .unwrap_or_else(|| ctx.node.title.clone());

        let mut metadata = AHashMap::new();
        metadata.insert("prompt".to_string(), json!(prompt));
        if let Some(id) = image_id {
            metadata.insert("image_id".to_string(), json!(id));
        }
        if let Some(image) = image {
            metadata.insert("source".to_string(), json!(image.source));
        }
        Ok(OperationResult {
            node_id: ctx.node.id.clone(),
            asset_url,
            prompt: Some(prompt),
            metadata,
        })
    }
}

/// Text-only kinds: no asset, aggregated prompt (possibly empty).
macro_rules! define_prompt_evaluator {
    ($name:ident, $kind:expr) => {
        struct $name;

        impl NodeEvaluator for $name {
            fn kind(&self) -> NodeKind {
                $kind
            }

            fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<OperationResult, EvaluationError> {
                let prompt = ctx
                    .combined_prompt()
                    .or_else(|| ctx.node.config.prompt.clone())
                    .unwrap_or_default();
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
    };
}

/// Asset-transforming kinds: forward the first upstream asset, aggregate
/// prompts, and record which upstream nodes contributed.
macro_rules! define_transform_evaluator {
    ($name:ident, $kind:expr) => {
        struct $name;

        impl NodeEvaluator for $name {
            fn kind(&self) -> NodeKind {
                $kind
            }

            fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<OperationResult, EvaluationError> {
                let asset_url = ctx.first_upstream_asset();
                let prompt = ctx
                    .combined_prompt()
                    .or_else(|| ctx.node.config.prompt.clone())
                    .unwrap_or_default();
                let mut metadata = AHashMap::new();
                metadata.insert("prompt".to_string(), json!(prompt));
                metadata.insert("inputs".to_string(), json!(ctx.upstream_ids()));
                Ok(OperationResult {
                    node_id: ctx.node.id.clone(),
                    asset_url,
                    prompt: Some(prompt),
                    metadata,
                })
            }
        }
    };
}

define_prompt_evaluator!(PromptEvaluator, NodeKind::Prompt);
define_prompt_evaluator!(LlmDirectiveEvaluator, NodeKind::LlmDirective);
define_transform_evaluator!(StyleTransferEvaluator, NodeKind::StyleTransfer);
define_transform_evaluator!(CompositeEvaluator, NodeKind::Composite);
define_transform_evaluator!(UpscaleEvaluator, NodeKind::Upscale);

struct OutputEvaluator;

impl NodeEvaluator for OutputEvaluator {
    fn kind(&self) -> NodeKind {
        NodeKind::Output
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<OperationResult, EvaluationError> {
        let prompt = ctx
            .combined_prompt()
            .or_else(|| ctx.node.config.prompt.clone())
            .unwrap_or_default();
        let mut metadata = AHashMap::new();
        metadata.insert("prompt".to_string(), json!(prompt));
        metadata.insert("inputs".to_string(), json!(ctx.upstream_ids()));
        Ok(OperationResult {
            node_id: ctx.node.id.clone(),
            asset_url: None,
            prompt: Some(prompt),
            metadata,
        })
    }
}

/// Fallback behavior: forward the most recently evaluated upstream result,
/// overlaying newly aggregated prompt text. Placeholder semantics, pinned
/// by tests until real custom operations exist.
pub(crate) struct CustomEvaluator;

impl NodeEvaluator for CustomEvaluator {
    fn kind(&self) -> NodeKind {
        NodeKind::Custom
    }

    fn evaluate(&self, ctx: &EvalContext<'_>) -> Result<OperationResult, EvaluationError> {
        if let Some((_, upstream)) = ctx.upstream.last() {
            let prompt = ctx.combined_prompt().or_else(|| upstream.prompt.clone());
            let mut metadata = upstream.metadata.clone();
            if let Some(prompt) = &prompt {
                metadata.insert("prompt".to_string(), json!(prompt));
            }
            return Ok(OperationResult {
                node_id: ctx.node.id.clone(),
                asset_url: upstream.asset_url.clone(),
                prompt,
                metadata,
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

/// Kind-to-evaluator bindings for one engine instance.
pub struct EvaluatorRegistry {
    evaluators: AHashMap<NodeKind, Box<dyn NodeEvaluator>>,
    fallback: CustomEvaluator,
}

impl Default for EvaluatorRegistry {
    fn default() -> Self {
        let mut registry = Self {
            evaluators: AHashMap::new(),
            fallback: CustomEvaluator,
        };
        registry.register(Box::new(InputImageEvaluator));
        registry.register(Box::new(PromptEvaluator));
        registry.register(Box::new(LlmDirectiveEvaluator));
        registry.register(Box::new(StyleTransferEvaluator));
        registry.register(Box::new(CompositeEvaluator));
        registry.register(Box::new(UpscaleEvaluator));
        registry.register(Box::new(OutputEvaluator));
        registry.register(Box::new(CustomEvaluator));
        registry
    }
}

impl EvaluatorRegistry {
    /// Binds `evaluator` to its kind, replacing the default.
    pub fn register(&mut self, evaluator: Box<dyn NodeEvaluator>) {
        self.evaluators.insert(evaluator.kind(), evaluator);
    }

    pub fn get(&self, kind: NodeKind) -> &dyn NodeEvaluator {
        self.evaluators
            .get(&kind)
            .map(|evaluator| evaluator.as_ref())
            .unwrap_or(&self.fallback)
    }
}

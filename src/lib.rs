//! # Boardflow - Creative Board Workflow Engine
//!
//! **Boardflow** compiles the free-form node graph of a creative board
//! (images placed on a canvas, connected by labeled lines) into a directed
//! acyclic graph of typed operations, executes it in dependency order with
//! per-node memoization, and supports targeted partial recomputation when
//! only part of the graph changes.
//!
//! ## Core Workflow
//!
//! 1.  **Snapshot**: the board editor hands over a [`canvas::CanvasSnapshot`]
//!     (images, connections, layers), optionally carrying an explicit
//!     workflow definition.
//! 2.  **Compile**: when no definition is embedded, the compiler derives one
//!     (one `input_image` node per image, one edge per connection, plus a
//!     synthetic `output` sink every dead-end node feeds into).
//! 3.  **Validate & order**: adjacency indices are rebuilt, dangling edges
//!     dropped, and Kahn's algorithm produces a deterministic execution
//!     order. Cycles are rejected before anything runs.
//! 4.  **Execute**: the engine evaluates nodes sequentially, aggregating
//!     prompt text across upstream results and resolved connection labels,
//!     and memoizes each node's output for later partial recomputes.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use boardflow::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     // Parse a board snapshot (normally supplied by the draft store).
//!     let snapshot: CanvasSnapshot = serde_json::from_str(
//!         r#"{
//!             "images": [
//!                 {"id": "img1", "url": "https://cdn.example/1.png",
//!                  "description": "a lighthouse at dusk",
//!                  "bounds": {"position": {"x": 0.0, "y": 0.0},
//!                             "size": {"width": 320.0, "height": 240.0}}},
//!                 {"id": "img2", "url": "https://cdn.example/2.png",
//!                  "bounds": {"position": {"x": 400.0, "y": 0.0},
//!                             "size": {"width": 320.0, "height": 240.0}}}
//!             ],
//!             "connections": [
//!                 {"id": "c1",
//!                  "source": {"image_id": "img1"},
//!                  "target": {"image_id": "img2"},
//!                  "label": {"text": "match style of first image",
//!                            "position": {"x": 0.0, "y": 0.0}}}
//!             ]
//!         }"#,
//!     )
//!     .expect("valid snapshot JSON");
//!
//!     let registry = WorkflowRegistry::default();
//!     let state = registry.start("board-1", snapshot, None, Some("user-1"))?;
//!     assert_eq!(state.status, RunStatus::Completed);
//!
//!     // Recompute just one node later; everything upstream stays cached.
//!     let state = registry.recompute(
//!         state.workflow_id,
//!         None,
//!         None,
//!         &["image-img2".to_string()],
//!     )?;
//!     println!("final prompt: {:?}", registry.final_prompt(state.workflow_id)?);
//!     Ok(())
//! }
//! ```

pub mod canvas;
pub mod compiler;
pub mod directive;
pub mod engine;
pub mod error;
pub mod graph;
pub mod prelude;
pub mod registry;
pub mod workflow;

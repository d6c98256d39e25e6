//! Canvas snapshot input model.
//!
//! These types mirror the JSON payload the board editor produces. The
//! snapshot is treated as immutable input: the compiler reads it, the
//! engine looks up image assets in it, nothing mutates it.

use crate::workflow::WorkflowDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canvas coordinate expressed in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

/// Canvas dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f64,
    pub height: f64,
}

/// Position and size metadata for a canvas element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasBounds {
    pub position: CanvasPoint,
    pub size: CanvasSize,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// Image origin on the creative board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    #[default]
    Upload,
    Library,
    Generated,
    Url,
}

/// Placed image node on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasImage {
    pub id: String,
    pub url: String,
    pub bounds: CanvasBounds,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub source: ImageSource,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Anchor point for drawing a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionAnchor {
    #[default]
    Center,
    Top,
    Right,
    Bottom,
    Left,
}

impl ConnectionAnchor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionAnchor::Center => "center",
            ConnectionAnchor::Top => "top",
            ConnectionAnchor::Right => "right",
            ConnectionAnchor::Bottom => "bottom",
            ConnectionAnchor::Left => "left",
        }
    }
}

/// Source or target metadata for a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEndpoint {
    pub image_id: String,
    #[serde(default)]
    pub anchor: ConnectionAnchor,
}

/// Editable label shown on the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionLabel {
    pub text: String,
    #[serde(default)]
    pub position: CanvasPoint,
    #[serde(default = "default_label_background")]
    pub background: String,
    #[serde(default = "default_label_color")]
    pub color: String,
}

fn default_label_background() -> String {
    "#BFDBFE".to_string()
}

fn default_label_color() -> String {
    "#FFFFFF".to_string()
}

/// Dashed line between two images with an optional directive label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConnection {
    pub id: String,
    pub source: ConnectionEndpoint,
    pub target: ConnectionEndpoint,
    #[serde(default)]
    pub path_points: Vec<CanvasPoint>,
    #[serde(default)]
    pub label: Option<ConnectionLabel>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Logical layer grouping canvas elements for ordering control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasLayer {
    pub id: String,
    pub name: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub z_index: i32,
    #[serde(default)]
    pub image_ids: Vec<String>,
}

fn default_visible() -> bool {
    true
}

/// Canvas level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardCanvas {
    pub size: CanvasSize,
    pub grid_spacing: u32,
    pub show_grid: bool,
    pub background_color: String,
}

impl Default for BoardCanvas {
    fn default() -> Self {
        Self {
            size: CanvasSize {
                width: 1440.0,
                height: 900.0,
            },
            grid_spacing: 50,
            show_grid: true,
            background_color: "#F3F4F6".to_string(),
        }
    }
}

/// Serializable board state used for drafts and generation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanvasSnapshot {
    #[serde(default)]
    pub canvas: BoardCanvas,
    #[serde(default)]
    pub images: Vec<CanvasImage>,
    #[serde(default)]
    pub connections: Vec<CanvasConnection>,
    #[serde(default)]
    pub layers: Vec<CanvasLayer>,
    #[serde(default)]
    pub workflow: Option<WorkflowDefinition>,
}

impl CanvasSnapshot {
    pub fn find_image(&self, image_id: &str) -> Option<&CanvasImage> {
        self.images.iter().find(|image| image.id == image_id)
    }
}

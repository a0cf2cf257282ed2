//! Scene-item records as seen by the bridge.
//!
//! Three shapes are involved:
//!
//! - [`SceneItem`]: one entry of the scene tool's full item list.
//! - [`ManagedSceneItem`]: the subset the bridge synchronizes (its source
//!   name is on the allow-list).  Structurally identical to `SceneItem`; the
//!   separate type records that filtering has happened.
//! - [`ItemTransform`]: the tool's full pixel-space transform for one item,
//!   read before a write so that attributes the viewer does not control
//!   (rotation, crop, scale, alignment, ...) are written back untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One item of a scene, as listed by the scene tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneItem {
    /// Identifier unique within the scene.  Join key with relay commands.
    pub item_id: i64,
    /// Name of the source rendered by this item (e.g. `"gif"`).
    pub source_name: String,
    /// Rendered width in pixels.
    pub width: f64,
    /// Rendered height in pixels.
    pub height: f64,
    /// X position of the item on the canvas, in pixels.
    pub x: f64,
    /// Y position of the item on the canvas, in pixels.
    pub y: f64,
}

/// A scene item whose source is on the bridge's allow-list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagedSceneItem {
    pub item_id: i64,
    pub source_name: String,
    pub width_px: f64,
    pub height_px: f64,
    pub x_px: f64,
    pub y_px: f64,
}

impl From<&SceneItem> for ManagedSceneItem {
    fn from(item: &SceneItem) -> Self {
        Self {
            item_id: item.item_id,
            source_name: item.source_name.clone(),
            width_px: item.width,
            height_px: item.height,
            x_px: item.x,
            y_px: item.y,
        }
    }
}

/// The scene tool's transform record for a single item.
///
/// Only the four fields the bridge writes are modelled explicitly.  Every
/// other attribute the tool reports is kept verbatim in `extra` and
/// serialized back alongside them, so a read-modify-write cycle never drops
/// or resets state the viewer did not ask to change.
///
/// # Serde representation
///
/// ```json
/// {"positionX":10.0,"positionY":20.0,"boundsWidth":1.0,"boundsHeight":1.0,"rotation":0.0}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemTransform {
    #[serde(default)]
    pub position_x: f64,
    #[serde(default)]
    pub position_y: f64,
    #[serde(default)]
    pub bounds_width: f64,
    #[serde(default)]
    pub bounds_height: f64,
    /// Attributes the bridge does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Typed payloads carried in the `data` field of an [`ActionEnvelope`].
//!
//! | Action                      | Direction | Payload                        |
//! |-----------------------------|-----------|--------------------------------|
//! | `ping`                      | out       | `{}`                           |
//! | `welcome`                   | in        | none                           |
//! | `update_video_settings`     | out       | [`VideoSettingsPayload`]       |
//! | `update_bounds`             | out       | [`WindowBoundsConfig`]         |
//! | `update_info_window_config` | out       | [`InfoWindowConfig`]           |
//! | `update_scene_items`        | out       | `Vec<`[`SceneItemWrapper`]`>`  |
//! | `set_scene_item_transform`  | in        | [`TransformCommand`]           |
//!
//! [`ActionEnvelope`]: crate::protocol::envelope::ActionEnvelope

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Canvas size announced to the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoSettingsPayload {
    pub output_width: f64,
    pub output_height: f64,
}

/// Edges of one overlay window, as read from the window-bounds file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Static window-bounds configuration, keyed by window name.
///
/// ```json
/// {"bounds":{"chat":{"left":0.0,"top":0.0,"right":0.25,"bottom":1.0}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowBoundsConfig {
    #[serde(default)]
    pub bounds: BTreeMap<String, Bound>,
}

/// One entry of the info-window configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoEntry {
    pub title: String,
    pub description: String,
}

/// Static info-window configuration, keyed by window name.
///
/// ```json
/// {"infoWindow":{"gif":{"title":"GIF","description":"Drag me around"}}}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfoWindowConfig {
    #[serde(rename = "infoWindow", default)]
    pub info_window: BTreeMap<String, InfoEntry>,
}

/// Wire record for one managed scene item.
///
/// `width` and `height` are sent as decimal text (six fractional digits)
/// rather than numbers; the viewer expects strings here.  `info` and
/// `z_index` are fixed placeholders the protocol requires but does not use
/// yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneItemDetails {
    #[serde(rename = "name")]
    pub item_id: i64,
    pub x: f64,
    pub y: f64,
    pub width: String,
    pub height: String,
    pub info: String,
    #[serde(rename = "zIndex")]
    pub z_index: i32,
}

/// Per-item wrapper in the `update_scene_items` payload: `{"data":[details]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneItemWrapper {
    pub data: Vec<SceneItemDetails>,
}

/// Inbound request to move one item, in normalized canvas coordinates.
///
/// `x` and `y` are meant to lie in `[0, 1]` but are not validated: values
/// outside the range pass through the conversion unclamped.
///
/// The item id is accepted as `id` or `itemId`, the user id as `user_id` or
/// `userId`; both viewer generations are in the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformCommand {
    #[serde(rename = "id", alias = "itemId")]
    pub item_id: i64,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub color: String,
    #[serde(rename = "user_id", alias = "userId", default)]
    pub user_id: String,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

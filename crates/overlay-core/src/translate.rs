//! Coordinate and record translation between the relay and the scene tool.
//!
//! This module provides pure functions with no I/O side effects:
//!
//! ```text
//! Relay → Tool:  TransformCommand (normalized)  → pixel position
//!                call: to_pixel(), then apply_fixed_bounds()
//!
//! Tool → Relay:  SceneItem list → ManagedSceneItem subset → wire records
//!                call: select_managed_items(), then to_wire_details()
//! ```
//!
//! Every place that needs the managed subset goes through
//! [`select_managed_items`], so the handshake and the post-write broadcast can
//! never disagree about which items are synchronized.

use crate::domain::canvas::VideoCanvas;
use crate::domain::scene_item::{ItemTransform, ManagedSceneItem, SceneItem};
use crate::protocol::payloads::{SceneItemDetails, SceneItemWrapper, TransformCommand};

/// Bounding-box scale written with every transform.
///
/// The tool renders the item at its intended size only when both bounds are
/// reset to this value after a move.
pub const FIXED_BOUNDS_SCALE: f64 = 1.0;

/// Placeholder carried in the `info` field of every wire record.
pub const PLACEHOLDER_INFO: &str = "some data to register later";

/// Placeholder carried in the `zIndex` field of every wire record.
pub const PLACEHOLDER_Z_INDEX: i32 = 10;

/// Filters the tool's full item list down to the items whose source name is
/// on the allow-list.
///
/// The result keeps the tool's native ordering; it is never re-sorted.
pub fn select_managed_items<S: AsRef<str>>(
    all_items: &[SceneItem],
    allow_list: &[S],
) -> Vec<ManagedSceneItem> {
    all_items
        .iter()
        .filter(|item| {
            allow_list
                .iter()
                .any(|name| name.as_ref() == item.source_name)
        })
        .map(ManagedSceneItem::from)
        .collect()
}

/// Converts a command's normalized coordinates into canvas pixels.
///
/// `x_px = x * base_width`, `y_px = y * base_height`.  Values outside
/// `[0, 1]` are not clamped.
pub fn to_pixel(command: &TransformCommand, canvas: &VideoCanvas) -> (f64, f64) {
    (command.x * canvas.base_width, command.y * canvas.base_height)
}

/// Resets the bounding-box scale of `transform` to [`FIXED_BOUNDS_SCALE`].
pub fn apply_fixed_bounds(transform: &mut ItemTransform) {
    transform.bounds_width = FIXED_BOUNDS_SCALE;
    transform.bounds_height = FIXED_BOUNDS_SCALE;
}

/// Builds the `update_scene_items` payload: one single-record wrapper per
/// managed item, in input order.
pub fn to_wire_details(items: &[ManagedSceneItem]) -> Vec<SceneItemWrapper> {
    items
        .iter()
        .map(|item| SceneItemWrapper {
            data: vec![SceneItemDetails {
                item_id: item.item_id,
                x: item.x_px,
                y: item.y_px,
                width: format!("{:.6}", item.width_px),
                height: format!("{:.6}", item.height_px),
                info: PLACEHOLDER_INFO.to_string(),
                z_index: PLACEHOLDER_Z_INDEX,
            }],
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

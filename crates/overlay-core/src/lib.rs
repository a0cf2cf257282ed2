//! # overlay-core
//!
//! Shared library for the overlay bridge containing the relay wire protocol,
//! the scene-item model, and the coordinate translation between the viewer's
//! normalized space and the scene tool's pixel space.
//!
//! It has zero dependencies on sockets, async runtimes, or the scene tool's
//! RPC transport.
//!
//! # Architecture overview (for beginners)
//!
//! A streamer runs a scene-composition tool that renders overlay windows at
//! pixel positions on a fixed-size canvas.  A separate viewer client moves
//! those windows around, but it never talks to the tool directly: both sides
//! meet in a remote relay session.  The bridge sits between the tool and the
//! relay and keeps the two views in sync.
//!
//! This crate (`overlay-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – What travels over the relay.  Every message in both
//!   directions is a JSON `{"action": ..., "data": ...}` envelope.
//!
//! - **`domain`** – The canvas and scene-item records the bridge reasons
//!   about, independent of how the tool encodes them.
//!
//! - **`translate`** – Pure functions converting normalized `[0, 1]`
//!   coordinates into canvas pixels and scene items into wire records.

pub mod domain;
pub mod protocol;
pub mod translate;

// Re-export the most-used types at the crate root so callers can write
// `overlay_core::ActionEnvelope` instead of the full module path.
pub use domain::canvas::VideoCanvas;
pub use domain::scene_item::{ItemTransform, ManagedSceneItem, SceneItem};
pub use protocol::envelope::{Action, ActionEnvelope, ProtocolError};
pub use protocol::payloads::{
    InfoWindowConfig, SceneItemDetails, SceneItemWrapper, TransformCommand, VideoSettingsPayload,
    WindowBoundsConfig,
};

//! Domain entities for the overlay bridge.
//!
//! These types describe the scene tool's world (canvas size, scene items and
//! their transforms) in a shape the bridge can reason about.  They carry no
//! I/O and know nothing about the relay wire format.

pub mod canvas;
pub mod scene_item;

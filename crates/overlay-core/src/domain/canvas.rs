//! The scene tool's base output canvas.

use serde::{Deserialize, Serialize};

/// Base output resolution of the scene tool, in pixels.
///
/// The canvas is the reference frame for converting the viewer's normalized
/// coordinates into pixel positions.  It can change at any time (the streamer
/// may switch resolution), so the bridge refetches it before every
/// conversion instead of caching it across mutations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoCanvas {
    /// Canvas width in pixels.  Always greater than zero for a valid canvas.
    pub base_width: f64,
    /// Canvas height in pixels.  Always greater than zero for a valid canvas.
    pub base_height: f64,
}

impl VideoCanvas {
    /// Creates a canvas from its base dimensions.
    pub fn new(base_width: f64, base_height: f64) -> Self {
        Self {
            base_width,
            base_height,
        }
    }

    /// Returns `true` if both dimensions are finite and strictly positive.
    pub fn is_valid(&self) -> bool {
        self.base_width.is_finite()
            && self.base_height.is_finite()
            && self.base_width > 0.0
            && self.base_height > 0.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

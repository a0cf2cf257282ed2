//! Collaborator seams used by the bridge session.
//!
//! Infrastructure implementations talk to real sockets; tests substitute
//! recording fakes or `mockall` mocks.  Each trait has its own error type so
//! the controller can classify failures (fatal vs. logged) without string
//! matching.

use std::sync::Arc;

use async_trait::async_trait;
use overlay_core::{ActionEnvelope, ItemTransform, ProtocolError, SceneItem, VideoCanvas};
use thiserror::Error;

use crate::domain::NegotiatedSession;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure talking to the scene-composition tool.  Fatal to the session.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("failed to connect to control tool at {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("control tool authentication failed: {0}")]
    Authentication(String),

    #[error("control request '{request}' timed out")]
    Timeout { request: String },

    #[error("control connection closed")]
    ConnectionClosed,

    #[error("control request '{request}' failed ({code}): {comment}")]
    Request {
        request: String,
        code: u16,
        comment: String,
    },

    #[error("invalid response to '{request}': {reason}")]
    InvalidResponse { request: String, reason: String },
}

/// Failure bootstrapping a relay room.  Fatal to `start`.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("invalid relay url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("{url} answered with status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} answered with an empty body")]
    EmptyBody { url: String },
}

/// Failure writing one outbound relay message.  Logged, never fatal.
#[derive(Debug, Error)]
pub enum SendError {
    #[error(transparent)]
    Encode(#[from] ProtocolError),

    #[error("relay write failed: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

// ── Control tool ──────────────────────────────────────────────────────────────

/// Version strings reported by the control tool (diagnostic only).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionInfo {
    pub tool_version: String,
    pub adapter_version: String,
    pub rpc_version: u32,
}

/// Scene and video operations the bridge consumes from the control tool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ControlClient: Send + Sync {
    /// Returns the base (canvas) resolution.
    async fn get_video_canvas(&self) -> Result<VideoCanvas, ControlError>;

    /// Lists every item of `scene` in the tool's native order.
    async fn list_scene_items(&self, scene: &str) -> Result<Vec<SceneItem>, ControlError>;

    async fn get_item_transform(
        &self,
        scene: &str,
        item_id: i64,
    ) -> Result<ItemTransform, ControlError>;

    async fn set_item_transform(
        &self,
        scene: &str,
        item_id: i64,
        transform: &ItemTransform,
    ) -> Result<(), ControlError>;

    async fn get_version_info(&self) -> Result<VersionInfo, ControlError>;

    /// Releases the underlying connection.  Later calls fail with
    /// [`ControlError::ConnectionClosed`].
    async fn disconnect(&self) -> Result<(), ControlError>;
}

/// Opens a fresh [`ControlClient`] connection for each session.
#[async_trait]
pub trait ControlConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn ControlClient>, ControlError>;
}

// ── Relay ─────────────────────────────────────────────────────────────────────

/// Resolves a relay room for an external user identity.
///
/// No retries: the caller decides whether to try again.
#[async_trait]
pub trait SessionNegotiator: Send + Sync {
    async fn negotiate(&self, identity: &str) -> Result<NegotiatedSession, NegotiationError>;
}

/// Outbound half of the relay connection.
#[async_trait]
pub trait RelaySink: Send {
    /// Serializes `envelope` and writes it as one text frame.
    async fn send_envelope(&mut self, envelope: &ActionEnvelope) -> Result<(), SendError>;
}

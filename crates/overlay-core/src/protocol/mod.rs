//! Relay wire protocol: the action envelope and its typed payloads.

pub mod envelope;
pub mod payloads;

pub use envelope::{Action, ActionEnvelope, ProtocolError};

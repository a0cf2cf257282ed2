//! Domain layer for overlay-bridge.
//!
//! Pure types with no dependencies on I/O, sockets, or the async runtime:
//!
//! - Configuration structures ([`BridgeConfig`] and its sections)
//! - Session lifecycle types ([`SessionState`], [`NegotiatedSession`],
//!   [`CloseNotice`])
//!
//! Reading configuration from disk lives in `infrastructure::storage`.

pub mod config;
pub mod session;

pub use config::BridgeConfig;
pub use session::{CloseNotice, NegotiatedSession, SessionState};

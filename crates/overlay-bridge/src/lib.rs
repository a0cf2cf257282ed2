//! overlay-bridge library crate.
//!
//! This crate keeps the overlay windows of a local scene-composition tool in
//! sync with a remote relay session that a separate viewer client joins.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Viewer ⇄ Relay (JSON envelopes over WebSocket)
//!               ↕
//! [overlay-bridge]
//!   ├── domain/           Pure types: BridgeConfig, SessionState
//!   ├── application/      Controller, dispatch loop, collaborator traits
//!   └── infrastructure/
//!         ├── relay_transport/  Relay WebSocket + read loop (tokio-tungstenite)
//!         ├── negotiator/       Room bootstrap over HTTP (reqwest)
//!         ├── obs_client/       Scene-tool RPC adapter
//!         └── storage/          Config files (TOML + JSON)
//!               ↕
//! Scene tool (RPC over WebSocket)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `overlay-core`, and talks to the
//!   control tool and the lobby service only through the traits in
//!   [`application::ports`].  The controller owns the relay connection
//!   directly, because it manages that connection's lifetime.
//! - `infrastructure` implements those traits with real sockets.

/// Domain layer: configuration and session lifecycle types (no I/O).
pub mod domain;

/// Application layer: the bridge controller and its dispatch logic.
pub mod application;

/// Infrastructure layer: relay transport, bootstrap HTTP, scene-tool adapter.
pub mod infrastructure;

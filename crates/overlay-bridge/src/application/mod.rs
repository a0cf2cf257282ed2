//! Application layer for overlay-bridge.
//!
//! # What lives here
//!
//! The application layer orchestrates one bridge session: it decides *what*
//! to send and *when*, while the infrastructure layer decides *how* bytes
//! reach a socket.  Everything here depends only on the traits in [`ports`],
//! so the whole session logic runs in unit tests against recording fakes.
//!
//! # Sub-modules
//!
//! - **`ports`**      – The collaborator seams (`ControlClient`,
//!   `ControlConnector`, `SessionNegotiator`, `RelaySink`) and their errors.
//!
//! - **`dispatcher`** – Per-message handling: the welcome handshake, applying
//!   a transform command and re-broadcasting scene state, keepalive pings.
//!
//! - **`controller`** – `BridgeController`: the Start/Stop state machine, the
//!   session task with its dispatch loop, and shutdown.

pub mod controller;
pub mod dispatcher;
pub mod ports;

pub use controller::{BridgeController, BridgeError, SessionTiming};
pub use dispatcher::{DispatchSettings, Dispatcher};

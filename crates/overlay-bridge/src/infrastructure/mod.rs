//! Infrastructure layer for overlay-bridge.
//!
//! Contains the network- and file-facing adapters:
//!
//! - **`relay_transport`** – the relay WebSocket connection and its read loop.
//! - **`negotiator`**      – relay room bootstrap over HTTP
//!   ([`HttpNegotiator`] implements `SessionNegotiator`).
//! - **`obs_client`**      – the scene tool's RPC protocol
//!   ([`ObsConnector`] implements `ControlConnector`).
//! - **`storage`**         – `config.toml` and the JSON window files.

pub mod negotiator;
pub mod obs_client;
pub mod relay_transport;
pub mod storage;

pub use negotiator::HttpNegotiator;
pub use obs_client::{ObsClient, ObsConnector};
pub use relay_transport::{RelayInbound, RelayTransport, TransportError};
pub use storage::ConfigError;

//! Bridge configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is normally read from `config.toml` (see `infrastructure::storage`),
//! but every field has a default so a partial file, or no file at all, still
//! yields a usable configuration.
//!
//! ```toml
//! window_config_path = "windowConfig.json"
//! info_window_config_path = "infoWindowDataConfig.json"
//!
//! [control]
//! host = "127.0.0.1"
//! port = 4455
//! password = "secret"
//!
//! [relay]
//! base_url = "https://websocket.matissetec.dev"
//! username = "some_streamer"
//!
//! [session]
//! scene_name = "Scene"
//! managed_sources = ["gitEasy", "gif", "guest1"]
//! ping_interval_secs = 30
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// All runtime configuration for the bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Path of the static window-bounds JSON file sent during the handshake.
    #[serde(default = "default_window_config_path")]
    pub window_config_path: PathBuf,
    /// Path of the static info-window JSON file sent during the handshake.
    #[serde(default = "default_info_window_config_path")]
    pub info_window_config_path: PathBuf,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Connection settings for the scene tool's RPC endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_control_host")]
    pub host: String,
    #[serde(default = "default_control_port")]
    pub port: u16,
    /// Empty when the tool has authentication disabled.
    #[serde(default)]
    pub password: String,
    /// Upper bound on a single RPC round trip.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Relay lobby service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// HTTP(S) base of the lobby service.  The websocket address is derived
    /// from it (`https` → `wss`, `http` → `ws`).
    #[serde(default = "default_relay_base_url")]
    pub base_url: String,
    /// External user identity the relay room is scoped to.
    #[serde(default)]
    pub username: String,
    /// When `true`, `username` is first resolved to an external id through
    /// `resolver_url`.
    #[serde(default = "default_true")]
    pub resolve_username: bool,
    #[serde(default = "default_resolver_url")]
    pub resolver_url: String,
}

/// Per-session behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Scene whose items are synchronized.
    #[serde(default = "default_scene_name")]
    pub scene_name: String,
    /// Allow-list of source names that take part in synchronization.
    #[serde(default = "default_managed_sources")]
    pub managed_sources: Vec<String>,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// How long shutdown waits for the relay's close acknowledgement.
    #[serde(default = "default_close_timeout_secs")]
    pub close_timeout_secs: u64,
    /// `tracing` level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl ControlConfig {
    /// WebSocket address of the scene tool's RPC endpoint.
    pub fn address(&self) -> String {
        format!("ws://{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SessionConfig {
    /// Keepalive period, never shorter than one second.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_window_config_path() -> PathBuf {
    PathBuf::from("windowConfig.json")
}
fn default_info_window_config_path() -> PathBuf {
    PathBuf::from("infoWindowDataConfig.json")
}
fn default_control_host() -> String {
    "127.0.0.1".to_string()
}
fn default_control_port() -> u16 {
    4455
}
fn default_request_timeout_secs() -> u64 {
    10
}
fn default_relay_base_url() -> String {
    "https://websocket.matissetec.dev".to_string()
}
fn default_true() -> bool {
    true
}
fn default_resolver_url() -> String {
    "https://decapi.me/twitch/id".to_string()
}
fn default_scene_name() -> String {
    "Scene".to_string()
}
fn default_managed_sources() -> Vec<String> {
    ["gitEasy", "gif", "guest1"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_ping_interval_secs() -> u64 {
    30
}
fn default_close_timeout_secs() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            window_config_path: default_window_config_path(),
            info_window_config_path: default_info_window_config_path(),
            control: ControlConfig::default(),
            relay: RelayConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            host: default_control_host(),
            port: default_control_port(),
            password: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: default_relay_base_url(),
            username: String::new(),
            resolve_username: true,
            resolver_url: default_resolver_url(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scene_name: default_scene_name(),
            managed_sources: default_managed_sources(),
            ping_interval_secs: default_ping_interval_secs(),
            close_timeout_secs: default_close_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

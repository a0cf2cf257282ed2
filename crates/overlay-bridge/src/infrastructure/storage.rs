//! Configuration files on disk.
//!
//! - `config.toml` → [`BridgeConfig`] (TOML).  A missing file is not an
//!   error: the built-in defaults are used, so a first run works without any
//!   setup beyond a username.
//! - `windowConfig.json` → [`WindowBoundsConfig`] and
//!   `infoWindowDataConfig.json` → [`InfoWindowConfig`] (JSON).  Their
//!   contents are sent to the viewer verbatim during the welcome handshake,
//!   so both must exist.

use std::path::{Path, PathBuf};

use overlay_core::{InfoWindowConfig, WindowBoundsConfig};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

use crate::domain::BridgeConfig;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to parse JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Loads `config.toml`, falling back to defaults when the file is absent.
///
/// # Errors
///
/// [`ConfigError::Io`] for file-system errors other than "not found",
/// [`ConfigError::Toml`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("no config file at {}, using defaults", path.display());
            Ok(BridgeConfig::default())
        }
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads the window-bounds file (`{"bounds": {...}}`).
pub fn load_window_bounds(path: &Path) -> Result<WindowBoundsConfig, ConfigError> {
    load_json(path)
}

/// Loads the info-window file (`{"infoWindow": {...}}`).
pub fn load_info_window(path: &Path) -> Result<InfoWindowConfig, ConfigError> {
    load_json(path)
}

fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

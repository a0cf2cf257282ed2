//! overlay-bridge: entry point.
//!
//! Connects the local scene tool to a fresh relay room, serves the viewer
//! until Ctrl+C or until the relay session ends, then shuts both connections
//! down.  There is no automatic restart: run the binary again (or wrap it in
//! a supervisor) to open a new room.
//!
//! # Usage
//!
//! ```text
//! overlay-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>       Config file [default: config.toml]
//!   --username <NAME>     External user the relay room is created for
//!   --log-level <LEVEL>   Log level when RUST_LOG is unset
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                  | Overrides            |
//! |---------------------------|----------------------|
//! | `OVERLAY_BRIDGE_CONFIG`   | `--config`           |
//! | `OVERLAY_BRIDGE_USERNAME` | `relay.username`     |
//! | `RUST_LOG`                | every log level knob |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use overlay_bridge::application::{BridgeController, DispatchSettings, SessionTiming};
use overlay_bridge::domain::BridgeConfig;
use overlay_bridge::infrastructure::storage::{load_config, load_info_window, load_window_bounds};
use overlay_bridge::infrastructure::{HttpNegotiator, ObsConnector};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Keeps scene-tool overlay windows in sync with a remote relay session.
#[derive(Debug, Parser)]
#[command(name = "overlay-bridge", version)]
struct Cli {
    /// Path of the TOML config file.  A missing file means "all defaults".
    #[arg(long, default_value = "config.toml", env = "OVERLAY_BRIDGE_CONFIG")]
    config: PathBuf,

    /// External username; overrides `relay.username` from the config file.
    #[arg(long, env = "OVERLAY_BRIDGE_USERNAME")]
    username: Option<String>,

    /// Log level used when `RUST_LOG` is not set; overrides
    /// `session.log_level`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded config.
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(username) = &self.username {
            config.relay.username = username.clone();
        }
        if let Some(level) = &self.log_level {
            config.session.log_level = level.clone();
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    cli.apply(&mut config);

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.session.log_level)),
        )
        .init();

    if config.relay.username.trim().is_empty() {
        anyhow::bail!(
            "no username configured: set relay.username, --username or OVERLAY_BRIDGE_USERNAME"
        );
    }

    let window_bounds = load_window_bounds(&config.window_config_path)
        .context("failed to load the window-bounds file")?;
    let info_window = load_info_window(&config.info_window_config_path)
        .context("failed to load the info-window file")?;

    let settings = DispatchSettings {
        scene_name: config.session.scene_name.clone(),
        managed_sources: config.session.managed_sources.clone(),
        window_bounds,
        info_window,
    };
    let negotiator =
        HttpNegotiator::new(&config.relay).context("invalid relay configuration")?;
    let connector = ObsConnector::new(config.control.clone());

    info!(
        "overlay bridge starting: control={}, relay={}, scene={}",
        config.control.address(),
        config.relay.base_url,
        config.session.scene_name
    );

    let mut controller = BridgeController::new(
        config.relay.username.clone(),
        settings,
        SessionTiming::from(&config.session),
        Arc::new(negotiator),
        Arc::new(connector),
    );
    controller
        .start()
        .await
        .context("failed to start the bridge session")?;

    // Run until the session ends on its own or the user interrupts.
    let finished = tokio::select! {
        result = controller.wait() => Some(result),
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("received Ctrl+C, stopping"),
                Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
            }
            None
        }
    };
    let outcome = match finished {
        Some(result) => result,
        None => controller.stop().await,
    };
    outcome.context("bridge session ended with an error")?;

    info!("overlay bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_config_path() {
        let cli = Cli::parse_from(["overlay-bridge"]);
        if std::env::var_os("OVERLAY_BRIDGE_CONFIG").is_none() {
            assert_eq!(cli.config, PathBuf::from("config.toml"));
        }
    }

    #[test]
    fn test_cli_config_override() {
        let cli = Cli::parse_from(["overlay-bridge", "--config", "/etc/bridge.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/bridge.toml"));
    }

    #[test]
    fn test_cli_username_override_applies() {
        // Arrange
        let cli = Cli::parse_from(["overlay-bridge", "--username", "streamer"]);
        let mut config = BridgeConfig::default();

        // Act
        cli.apply(&mut config);

        // Assert
        assert_eq!(config.relay.username, "streamer");
    }

    #[test]
    fn test_cli_log_level_override_applies() {
        let cli = Cli::parse_from(["overlay-bridge", "--log-level", "debug"]);
        let mut config = BridgeConfig::default();

        cli.apply(&mut config);

        assert_eq!(config.session.log_level, "debug");
    }

    #[test]
    fn test_cli_without_overrides_keeps_config() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            username: None,
            log_level: None,
        };
        let mut config = BridgeConfig::default();
        config.relay.username = "from_file".to_string();

        cli.apply(&mut config);

        assert_eq!(config.relay.username, "from_file");
        assert_eq!(config.session.log_level, "info");
    }
}

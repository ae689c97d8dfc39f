//! # pulse-hub
//!
//! Pulse hub binary: loads settings, starts the WebSocket server and the
//! event sources, and shuts everything down on Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pulse_client::HttpPullSource;
use pulse_core::PullSource;
use pulse_server::metrics::install_recorder;
use pulse_server::sources::spawn_sources;
use pulse_server::{PulseServer, ServerConfig};
use pulse_settings::PulseSettings;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pulse real-time fan-out hub.
#[derive(Parser, Debug)]
#[command(name = "pulse-hub", about = "Pulse real-time fan-out hub")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.pulse/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level filter when `RUST_LOG` is unset (overrides settings).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Load settings and apply command-line overrides on top.
    fn settings(&self) -> Result<PulseSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(pulse_settings::settings_path);
        let mut settings = pulse_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let settings = args.settings()?;

    pulse_core::logging::init_subscriber(&settings.logging.level);

    let metrics = install_recorder().context("Failed to install metrics recorder")?;

    let server = PulseServer::new(ServerConfig::from(&settings)).with_metrics(metrics);

    let upstream: Arc<dyn PullSource> = Arc::new(
        HttpPullSource::new(&settings.upstream).context("Failed to build upstream client")?,
    );
    let sources = spawn_sources(
        &settings,
        upstream,
        server.dispatcher(),
        &server.shutdown().token(),
    )
    .context("Invalid source configuration")?;
    server.shutdown().track_all(sources);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    server.shutdown().track(handle);

    tracing::info!(
        selective = settings.broadcast.selective_subscriptions,
        enabled = settings.broadcast.enabled,
        upstream = %settings.upstream.base_url,
        "Pulse hub listening on ws://{addr}/ws"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    server
        .shutdown()
        .graceful_shutdown(Some(SHUTDOWN_TIMEOUT))
        .await;
    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["pulse-hub"]);
        assert!(cli.host.is_none());
        assert!(cli.port.is_none());
        assert!(cli.config.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn cli_flags_parse() {
        let cli = Cli::parse_from([
            "pulse-hub",
            "--host",
            "127.0.0.1",
            "--port",
            "9000",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"server": {"port": 7000, "host": "10.0.0.1"}, "logging": {"level": "warn"}}"#,
        )
        .unwrap();

        let cli = Cli::parse_from([
            "pulse-hub",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "7100",
        ]);
        let settings = cli.settings().unwrap();
        assert_eq!(settings.server.port, 7100);
        assert_eq!(settings.server.host, "10.0.0.1");
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        let cli = Cli::parse_from(["pulse-hub", "--config", path.to_str().unwrap()]);
        assert!(cli.settings().is_err());
    }
}

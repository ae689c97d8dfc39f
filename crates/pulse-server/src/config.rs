//! Server configuration.

use std::time::Duration;

use pulse_core::BundlePolicy;
use pulse_settings::PulseSettings;
use serde::{Deserialize, Serialize};

/// Runtime configuration for the hub's HTTP/WebSocket side.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close after this long without a pong, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Frames buffered per connection before a send counts as failed.
    pub send_queue_capacity: usize,
    /// Deadline for one socket write in milliseconds.
    pub send_timeout_ms: u64,
    /// Whether `/ws` accepts upgrades at all.
    pub enabled: bool,
    /// Whether client subscription declarations are honored.
    pub selective_subscriptions: bool,
    /// Bundle slicing for declared subscribers.
    pub bundle_policy: BundlePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 500,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 64 * 1024,
            send_queue_capacity: 64,
            send_timeout_ms: 5_000,
            enabled: true,
            selective_subscriptions: true,
            bundle_policy: BundlePolicy::Filter,
        }
    }
}

impl ServerConfig {
    /// Ping period.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Liveness deadline.
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Per-write deadline.
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl From<&PulseSettings> for ServerConfig {
    fn from(settings: &PulseSettings) -> Self {
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            heartbeat_interval_ms: settings.server.heartbeat_interval_ms,
            heartbeat_timeout_ms: settings.server.heartbeat_timeout_ms,
            max_message_size: settings.server.max_message_size,
            send_queue_capacity: settings.server.send_queue_capacity,
            send_timeout_ms: settings.server.send_timeout_ms,
            enabled: settings.broadcast.enabled,
            selective_subscriptions: settings.broadcast.selective_subscriptions,
            bundle_policy: settings.broadcast.bundle_policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_binds_loopback_on_any_port() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
    }

    #[test]
    fn default_switches_on() {
        let cfg = ServerConfig::default();
        assert!(cfg.enabled);
        assert!(cfg.selective_subscriptions);
        assert_eq!(cfg.bundle_policy, BundlePolicy::Filter);
    }

    #[test]
    fn durations() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.heartbeat_timeout(), Duration::from_secs(90));
        assert_eq!(cfg.send_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn from_settings() {
        let mut settings = PulseSettings::default();
        settings.server.port = 9100;
        settings.broadcast.selective_subscriptions = false;
        settings.broadcast.bundle_policy = BundlePolicy::Whole;
        let cfg = ServerConfig::from(&settings);
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.host, "0.0.0.0");
        assert!(!cfg.selective_subscriptions);
        assert_eq!(cfg.bundle_policy, BundlePolicy::Whole);
    }
}

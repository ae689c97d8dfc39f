//! Hub network, broadcast and logging settings.

use pulse_core::BundlePolicy;
use serde::{Deserialize, Serialize};

/// Network and per-connection transport settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Interval between server pings in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close a connection after this long without a pong.
    pub heartbeat_timeout_ms: u64,
    /// Largest accepted inbound frame in bytes.
    pub max_message_size: usize,
    /// Frames buffered per connection before it counts as too slow.
    pub send_queue_capacity: usize,
    /// Deadline for a single socket write in milliseconds.
    pub send_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            max_connections: 500,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            max_message_size: 64 * 1024,
            send_queue_capacity: 64,
            send_timeout_ms: 5_000,
        }
    }
}

/// Administrative switches for the push channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BroadcastSettings {
    /// Master switch: when off `/ws` refuses upgrades and no source runs.
    pub enabled: bool,
    /// Honor client subscription declarations. When off every connection
    /// receives every topic.
    pub selective_subscriptions: bool,
    /// How composite bundles are cut for connections with a declaration.
    pub bundle_policy: BundlePolicy,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            selective_subscriptions: true,
            bundle_policy: BundlePolicy::Filter,
        }
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Fallback filter when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

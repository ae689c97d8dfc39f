//! Client-side connection settings.

use pulse_core::retry::ReconnectConfig;
use serde::{Deserialize, Serialize};

use super::sources::UpstreamSettings;

/// Settings for a viewer connecting to the hub.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// WebSocket URL of the hub.
    pub url: String,
    /// Topics to declare on connect.
    pub topics: Vec<String>,
    /// Reconnect delay bounds.
    pub reconnect: ReconnectConfig,
    /// Deadline for a single connection attempt in milliseconds.
    pub connect_timeout_ms: u64,
    /// Pull period while the push channel is down, in milliseconds.
    pub fallback_interval_ms: u64,
    /// REST endpoint used while the push channel is down.
    pub fallback: UpstreamSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8090/ws".to_string(),
            topics: vec![
                "metrics".to_string(),
                "containers".to_string(),
                "sessions".to_string(),
                "session_events".to_string(),
                "system_alerts".to_string(),
            ],
            reconnect: ReconnectConfig::default(),
            connect_timeout_ms: 10_000,
            fallback_interval_ms: 10_000,
            fallback: UpstreamSettings::default(),
        }
    }
}

//! Event source, alert and upstream settings.

use std::collections::BTreeMap;

use pulse_core::Topic;
use serde::{Deserialize, Serialize};

/// Timing and topic selection for the hub's event sources.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceSettings {
    /// Period of the sampling source in milliseconds.
    pub sample_interval_ms: u64,
    /// Period of the change detectors in milliseconds.
    pub change_interval_ms: u64,
    /// Topic names shipped in the composite bundle. Resolved at startup;
    /// an unknown or event-kind name is a fatal configuration error.
    pub sampled_topics: Vec<String>,
    /// Per-category on/off switches.
    pub topics: TopicToggles,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: 3_000,
            change_interval_ms: 3_000,
            sampled_topics: vec![
                "metrics".to_string(),
                "containers".to_string(),
                "sessions".to_string(),
            ],
            topics: TopicToggles::default(),
        }
    }
}

/// Per-category event source switches. All on by default.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct TopicToggles {
    /// Upstream metrics in the bundle.
    pub metrics: bool,
    /// Container stats in the bundle.
    pub containers: bool,
    /// Session summary in the bundle.
    pub sessions: bool,
    /// Session created/destroyed events.
    pub session_events: bool,
    /// Threshold alerts.
    pub system_alerts: bool,
}

impl Default for TopicToggles {
    fn default() -> Self {
        Self {
            metrics: true,
            containers: true,
            sessions: true,
            session_events: true,
            system_alerts: true,
        }
    }
}

impl TopicToggles {
    /// Whether the source for `topic` should run.
    pub fn is_enabled(&self, topic: Topic) -> bool {
        match topic {
            Topic::Metrics => self.metrics,
            Topic::Containers => self.containers,
            Topic::Sessions => self.sessions,
            Topic::SessionEvents => self.session_events,
            Topic::SystemAlerts => self.system_alerts,
        }
    }
}

/// Threshold alert settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertSettings {
    /// Aggregated container CPU percent above which an alert is raised.
    pub cpu_threshold: f64,
    /// Aggregated container memory percent above which an alert is raised.
    pub memory_threshold: f64,
    /// Upstream error rate (0.0–1.0) above which an alert is raised.
    pub error_rate_threshold: f64,
    /// Minimum seconds between two broadcasts of the same alert key.
    pub cooldown_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            cpu_threshold: 80.0,
            memory_threshold: 85.0,
            error_rate_threshold: 0.05,
            cooldown_secs: 60,
        }
    }
}

/// Where topic values are pulled from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpstreamSettings {
    /// Base URL of the upstream REST API.
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Topic name → path appended to `base_url`.
    pub paths: BTreeMap<String, String>,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 5_000,
            paths: default_paths(),
        }
    }
}

/// Dashboard REST routes for the sampled topics.
pub fn default_paths() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("metrics".to_string(), "/api/v1/system/metrics".to_string()),
        (
            "containers".to_string(),
            "/api/v1/system/containers".to_string(),
        ),
        ("sessions".to_string(), "/api/v1/sessions/count".to_string()),
    ])
}

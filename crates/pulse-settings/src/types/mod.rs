//! Settings types.
//!
//! All structs deserialize with `camelCase` keys and `#[serde(default)]`, so
//! a settings file only needs the keys it changes.

mod client;
mod server;
mod sources;

pub use client::ClientSettings;
pub use server::{BroadcastSettings, LoggingSettings, ServerSettings};
pub use sources::{AlertSettings, SourceSettings, TopicToggles, UpstreamSettings, default_paths};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PulseSettings {
    /// Network and transport.
    pub server: ServerSettings,
    /// Administrative switches for the push channel.
    pub broadcast: BroadcastSettings,
    /// Event source timing and topic selection.
    pub sources: SourceSettings,
    /// Threshold alerts.
    pub alerts: AlertSettings,
    /// Upstream REST API the hub samples.
    pub upstream: UpstreamSettings,
    /// Viewer-side settings.
    pub client: ClientSettings,
    /// Logging.
    pub logging: LoggingSettings,
}

impl PulseSettings {
    /// Reject values that would make the hub misbehave at runtime.
    pub fn validate(&self) -> Result<()> {
        let nonzero = [
            ("server.heartbeatIntervalMs", self.server.heartbeat_interval_ms),
            ("server.heartbeatTimeoutMs", self.server.heartbeat_timeout_ms),
            ("server.sendTimeoutMs", self.server.send_timeout_ms),
            ("sources.sampleIntervalMs", self.sources.sample_interval_ms),
            ("sources.changeIntervalMs", self.sources.change_interval_ms),
            ("upstream.timeoutMs", self.upstream.timeout_ms),
            ("client.connectTimeoutMs", self.client.connect_timeout_ms),
            ("client.fallbackIntervalMs", self.client.fallback_interval_ms),
            ("client.reconnect.minDelayMs", self.client.reconnect.min_delay_ms),
        ];
        for (key, value) in nonzero {
            if value == 0 {
                return Err(SettingsError::InvalidValue(format!("{key} must be > 0")));
            }
        }
        if self.server.send_queue_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "server.sendQueueCapacity must be > 0".into(),
            ));
        }
        if self.server.max_connections == 0 {
            return Err(SettingsError::InvalidValue(
                "server.maxConnections must be > 0".into(),
            ));
        }
        if self.client.reconnect.min_delay_ms > self.client.reconnect.max_delay_ms {
            return Err(SettingsError::InvalidValue(format!(
                "client.reconnect.minDelayMs ({}) exceeds maxDelayMs ({})",
                self.client.reconnect.min_delay_ms, self.client.reconnect.max_delay_ms
            )));
        }
        if self.upstream.base_url.trim().is_empty() {
            return Err(SettingsError::InvalidValue(
                "upstream.baseUrl must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alerts.error_rate_threshold) {
            return Err(SettingsError::InvalidValue(format!(
                "alerts.errorRateThreshold must be within 0.0..=1.0, got {}",
                self.alerts.error_rate_threshold
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pulse_core::{BundlePolicy, Topic};

    #[test]
    fn defaults_are_valid() {
        PulseSettings::default().validate().unwrap();
    }

    #[test]
    fn default_values() {
        let s = PulseSettings::default();
        assert_eq!(s.sources.sample_interval_ms, 3_000);
        assert!(s.broadcast.enabled);
        assert!(s.broadcast.selective_subscriptions);
        assert_eq!(s.broadcast.bundle_policy, BundlePolicy::Filter);
        assert_eq!(s.alerts.cooldown_secs, 60);
        assert_eq!(s.client.reconnect.min_delay_ms, 1_000);
        assert_eq!(s.client.reconnect.max_delay_ms, 30_000);
        for topic in Topic::ALL {
            assert!(s.sources.topics.is_enabled(topic));
        }
    }

    #[test]
    fn empty_object_deserializes_to_defaults() {
        let s: PulseSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(s, PulseSettings::default());
    }

    #[test]
    fn camel_case_keys() {
        let s: PulseSettings = serde_json::from_str(
            r#"{"broadcast":{"selectiveSubscriptions":false,"bundlePolicy":"whole"},
                "sources":{"topics":{"systemAlerts":false}}}"#,
        )
        .unwrap();
        assert!(!s.broadcast.selective_subscriptions);
        assert_eq!(s.broadcast.bundle_policy, BundlePolicy::Whole);
        assert!(!s.sources.topics.is_enabled(Topic::SystemAlerts));
        assert!(s.sources.topics.is_enabled(Topic::SessionEvents));
    }

    #[test]
    fn zero_interval_rejected() {
        let mut s = PulseSettings::default();
        s.sources.sample_interval_ms = 0;
        let err = s.validate().unwrap_err();
        assert_matches!(err, SettingsError::InvalidValue(msg) if msg.contains("sampleIntervalMs"));
    }

    #[test]
    fn inverted_backoff_rejected() {
        let mut s = PulseSettings::default();
        s.client.reconnect.min_delay_ms = 60_000;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn empty_upstream_rejected() {
        let mut s = PulseSettings::default();
        s.upstream.base_url = "  ".into();
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn error_rate_out_of_range_rejected() {
        let mut s = PulseSettings::default();
        s.alerts.error_rate_threshold = 5.0;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn default_paths_cover_sampled_topics() {
        let paths = default_paths();
        for name in &SourceSettings::default().sampled_topics {
            assert!(paths.contains_key(name), "{name}");
        }
    }
}

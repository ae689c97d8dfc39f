//! Topic registry: the closed, compile-time set of subscribable categories.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::PulseError;

/// A named category of data a viewer can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    /// Upstream service metrics (throughput, latency, error rate).
    Metrics,
    /// Container resource usage.
    Containers,
    /// Session summary (active count and friends).
    Sessions,
    /// Session lifecycle transitions.
    SessionEvents,
    /// Threshold alerts.
    SystemAlerts,
}

/// How a topic's data is produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopicKind {
    /// Sampled on a fixed period and shipped in the composite bundle.
    Sampled,
    /// Emitted only when an underlying value changes.
    Event,
}

impl Topic {
    /// Every topic, in wire order.
    pub const ALL: [Topic; 5] = [
        Topic::Metrics,
        Topic::Containers,
        Topic::Sessions,
        Topic::SessionEvents,
        Topic::SystemAlerts,
    ];

    /// Wire name of the topic.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Containers => "containers",
            Self::Sessions => "sessions",
            Self::SessionEvents => "session_events",
            Self::SystemAlerts => "system_alerts",
        }
    }

    /// Whether this topic is sampled or event-driven.
    pub fn kind(self) -> TopicKind {
        match self {
            Self::Metrics | Self::Containers | Self::Sessions => TopicKind::Sampled,
            Self::SessionEvents | Self::SystemAlerts => TopicKind::Event,
        }
    }

    /// Whether `name` is a member of the registry.
    pub fn is_valid(name: &str) -> bool {
        name.parse::<Topic>().is_ok()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = PulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "metrics" => Ok(Self::Metrics),
            "containers" => Ok(Self::Containers),
            "sessions" => Ok(Self::Sessions),
            "session_events" => Ok(Self::SessionEvents),
            "system_alerts" => Ok(Self::SystemAlerts),
            other => Err(PulseError::UnknownTopic(other.to_string())),
        }
    }
}

/// Keep the valid names from client input, silently dropping the rest.
pub fn filter_valid<S: AsRef<str>>(names: &[S]) -> BTreeSet<Topic> {
    names
        .iter()
        .filter_map(|n| n.as_ref().parse().ok())
        .collect()
}

/// Parse a configured topic list, failing on the first unknown name.
///
/// Used at startup where a typo must stop the process instead of being
/// silently ignored.
pub fn parse_topic_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<Topic>, PulseError> {
    let mut topics = Vec::with_capacity(names.len());
    for name in names {
        let topic: Topic = name.as_ref().parse()?;
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    }
    Ok(topics)
}

//! Topic-tagged messages produced by event sources and rendered for the wire.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::topic::Topic;

/// The `type` field of a server → client frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Composite periodic snapshot.
    RealtimeUpdate,
    /// Session created/destroyed.
    SessionEvent,
    /// Threshold alert raised or cleared.
    SystemAlert,
    /// Reply to a client ping.
    Heartbeat,
    /// Acknowledgement of a subscription declaration.
    Subscribed,
}

impl MessageKind {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RealtimeUpdate => "realtime_update",
            Self::SessionEvent => "session_event",
            Self::SystemAlert => "system_alert",
            Self::Heartbeat => "heartbeat",
            Self::Subscribed => "subscribed",
        }
    }
}

/// How a composite bundle is cut for connections with an explicit subscription.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundlePolicy {
    /// Send only the bundle entries the connection subscribed to.
    #[default]
    Filter,
    /// Send the entire bundle whenever any of its topics matches.
    Whole,
}

/// Message body.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// One value per sampled topic; rendered under `data`.
    Bundle(BTreeMap<Topic, Value>),
    /// A single event object; rendered under `event`.
    Event(Value),
}

/// An immutable, topic-tagged unit of dispatch.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    kind: MessageKind,
    topics: BTreeSet<Topic>,
    payload: Payload,
    timestamp: DateTime<Utc>,
}

impl Message {
    /// Composite snapshot. Its topics are the bundle keys.
    pub fn bundle(entries: BTreeMap<Topic, Value>) -> Self {
        Self {
            kind: MessageKind::RealtimeUpdate,
            topics: entries.keys().copied().collect(),
            payload: Payload::Bundle(entries),
            timestamp: Utc::now(),
        }
    }

    /// Single event tagged with one topic.
    pub fn event(kind: MessageKind, topic: Topic, event: Value) -> Self {
        Self {
            kind,
            topics: BTreeSet::from([topic]),
            payload: Payload::Event(event),
            timestamp: Utc::now(),
        }
    }

    /// Override the creation timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Frame type.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Topics this message belongs to.
    pub fn topics(&self) -> &BTreeSet<Topic> {
        &self.topics
    }

    /// Message body.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Creation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Decide which slice of the message a recipient gets.
    ///
    /// `declared` is the recipient's explicit topic set, or `None` when it
    /// receives everything. Returns `None` for "the whole message" and
    /// `Some(topics)` for a filtered bundle.
    pub fn view_for(
        &self,
        policy: BundlePolicy,
        declared: Option<&BTreeSet<Topic>>,
    ) -> Option<BTreeSet<Topic>> {
        let declared = declared?;
        if policy == BundlePolicy::Whole || !matches!(self.payload, Payload::Bundle(_)) {
            return None;
        }
        let view: BTreeSet<Topic> = self.topics.intersection(declared).copied().collect();
        (view.len() < self.topics.len()).then_some(view)
    }

    /// Render the JSON frame, optionally restricted to a bundle view.
    pub fn render(&self, view: Option<&BTreeSet<Topic>>) -> Result<String, serde_json::Error> {
        let (data, event) = match &self.payload {
            Payload::Bundle(entries) => {
                let data = entries
                    .iter()
                    .filter(|(topic, _)| view.is_none_or(|v| v.contains(topic)))
                    .map(|(topic, value)| (topic.as_str(), value))
                    .collect();
                (Some(data), None)
            }
            Payload::Event(value) => (None, Some(value)),
        };
        serde_json::to_string(&Frame {
            kind: self.kind.as_str(),
            data,
            event,
            timestamp: format_timestamp(self.timestamp),
        })
    }
}

#[derive(Serialize)]
struct Frame<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<BTreeMap<&'static str, &'a Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a Value>,
    timestamp: String,
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

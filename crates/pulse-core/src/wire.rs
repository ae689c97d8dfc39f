//! Frames that are not topic-tagged broadcasts: client requests, direct
//! replies, and the generic envelope clients decode.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::errors::PulseError;
use crate::message::{MessageKind, format_timestamp};
use crate::topic::Topic;

/// A frame received from a client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// Replace the subscription with these raw names (unvalidated).
    Subscribe(Vec<String>),
    /// Liveness check; answered with a heartbeat.
    Ping,
    /// Well-formed JSON with a `type` nobody handles.
    Other(String),
}

impl ClientMessage {
    /// Decode a text frame.
    ///
    /// Accepts the bare text `ping` for compatibility with older dashboards.
    /// Non-string entries in a subscription list are dropped rather than
    /// rejecting the frame.
    pub fn parse(text: &str) -> Result<Self, PulseError> {
        if text.trim() == "ping" {
            return Ok(Self::Ping);
        }
        let value: Value =
            serde_json::from_str(text).map_err(|e| PulseError::Malformed(e.to_string()))?;
        let Some(kind) = value.get("type").and_then(Value::as_str) else {
            return Err(PulseError::Malformed("missing \"type\" field".into()));
        };
        match kind {
            "ping" => Ok(Self::Ping),
            "subscribe" => match value.get("subscriptions") {
                None | Some(Value::Null) => Ok(Self::Subscribe(Vec::new())),
                Some(Value::Array(items)) => Ok(Self::Subscribe(
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect(),
                )),
                Some(_) => Err(PulseError::Malformed(
                    "\"subscriptions\" must be an array".into(),
                )),
            },
            other => Ok(Self::Other(other.to_string())),
        }
    }

    /// Encode a subscription declaration.
    pub fn subscribe_frame(topics: &[Topic]) -> String {
        let names: Vec<&str> = topics.iter().map(|t| t.as_str()).collect();
        json!({ "type": "subscribe", "subscriptions": names }).to_string()
    }

    /// Encode a ping.
    pub fn ping_frame() -> String {
        json!({ "type": "ping" }).to_string()
    }
}

/// Direct reply to a ping.
pub fn heartbeat_frame(at: DateTime<Utc>) -> String {
    json!({
        "type": MessageKind::Heartbeat.as_str(),
        "timestamp": format_timestamp(at),
    })
    .to_string()
}

/// Direct acknowledgement of a subscription declaration.
///
/// `selective` is false when the hub ignores declarations and delivers every
/// topic regardless.
pub fn subscribed_frame<'a>(
    topics: impl IntoIterator<Item = &'a Topic>,
    selective: bool,
    at: DateTime<Utc>,
) -> String {
    let names: Vec<&str> = topics.into_iter().map(|t| t.as_str()).collect();
    json!({
        "type": MessageKind::Subscribed.as_str(),
        "subscriptions": names,
        "selective": selective,
        "timestamp": format_timestamp(at),
    })
    .to_string()
}

/// Any server → client frame, decoded loosely.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ServerMessage {
    /// Frame type (`realtime_update`, `session_event`, ...).
    #[serde(rename = "type")]
    pub kind: String,
    /// Bundle entries keyed by topic name.
    #[serde(default)]
    pub data: Option<Map<String, Value>>,
    /// Event body.
    #[serde(default)]
    pub event: Option<Value>,
    /// Server timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Acknowledged topics (only on `subscribed`).
    #[serde(default)]
    pub subscriptions: Option<Vec<String>>,
    /// Whether the server honors declarations (only on `subscribed`).
    #[serde(default)]
    pub selective: Option<bool>,
}

impl ServerMessage {
    /// Decode a text frame.
    pub fn decode(text: &str) -> Result<Self, PulseError> {
        serde_json::from_str(text).map_err(|e| PulseError::Malformed(e.to_string()))
    }

    /// Known frame type, if any.
    pub fn message_kind(&self) -> Option<MessageKind> {
        serde_json::from_value(Value::String(self.kind.clone())).ok()
    }
}

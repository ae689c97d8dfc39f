//! Error types shared across the workspace.

use thiserror::Error;

use crate::topic::Topic;

/// Errors raised by core parsing and configuration checks.
#[derive(Debug, Error)]
pub enum PulseError {
    /// A topic name outside the registry appeared where it must be valid.
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    /// A topic was configured for a source that cannot produce it.
    #[error("topic {topic} cannot be used as {expected}")]
    WrongTopicKind {
        /// The offending topic.
        topic: Topic,
        /// What the configuration slot expects.
        expected: &'static str,
    },
    /// An inbound frame could not be decoded.
    #[error("malformed message: {0}")]
    Malformed(String),
    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to obtain a value from an upstream collaborator.
///
/// Always transient from the hub's point of view: the caller skips the
/// current tick and tries again on the next one.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The upstream answered with an error or could not be reached.
    #[error("upstream unavailable for {topic}: {reason}")]
    Unavailable {
        /// Topic being fetched.
        topic: Topic,
        /// Human-readable cause.
        reason: String,
    },
    /// The request did not complete within its deadline.
    #[error("upstream timed out for {0}")]
    Timeout(Topic),
    /// The collaborator has no mapping for this topic.
    #[error("topic {0} is not served by this source")]
    Unsupported(Topic),
}

impl UpstreamError {
    /// Shorthand for [`UpstreamError::Unavailable`].
    pub fn unavailable(topic: Topic, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            topic,
            reason: reason.into(),
        }
    }
}

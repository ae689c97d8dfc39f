//! Collaborator interfaces for the data the hub fans out.
//!
//! The hub never owns metric, container or session data. It asks a
//! [`PullSource`] for the current value of a topic, or a [`ChangeFeed`]
//! whether an event-worthy transition happened since the last check.

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::UpstreamError;
use crate::topic::Topic;

/// Request/response access to the current value of a topic.
#[async_trait]
pub trait PullSource: Send + Sync {
    /// Fetch the latest value for `topic`.
    async fn get(&self, topic: Topic) -> Result<Value, UpstreamError>;
}

/// A transition reported by a [`ChangeFeed`].
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    /// Signal value before the transition.
    pub previous: Value,
    /// Signal value after the transition.
    pub current: Value,
    /// Full upstream value the signal was read from.
    pub snapshot: Value,
}

/// Edge-triggered change notification for event topics.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Return the transition since the previous call, if there was one.
    ///
    /// The first call for a topic establishes a baseline and reports nothing.
    async fn check_for_change(&self, topic: Topic) -> Result<Option<Change>, UpstreamError>;
}

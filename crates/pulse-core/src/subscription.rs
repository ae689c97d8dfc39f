//! Per-connection subscription state.

use std::collections::BTreeSet;

use crate::topic::{self, Topic};

/// What a connection has asked to receive.
///
/// `Unset` and `Set(∅)` are deliberately different: a connection that never
/// declared anything receives every topic, while one that declared an empty
/// (or entirely invalid) list receives nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Subscription {
    /// No declaration received yet. Everything is delivered.
    #[default]
    Unset,
    /// Explicit declaration. Only these topics are delivered.
    Set(BTreeSet<Topic>),
}

impl Subscription {
    /// Build an explicit subscription from raw client names.
    ///
    /// Unknown names are dropped; an empty result is still an explicit set.
    pub fn from_requested<S: AsRef<str>>(names: &[S]) -> Self {
        Self::Set(topic::filter_valid(names))
    }

    /// Whether this state admits `topic`, ignoring any administrative switch.
    pub fn allows(&self, topic: Topic) -> bool {
        match self {
            Self::Unset => true,
            Self::Set(topics) => topics.contains(&topic),
        }
    }

    /// The explicit set, if one was declared.
    pub fn topics(&self) -> Option<&BTreeSet<Topic>> {
        match self {
            Self::Unset => None,
            Self::Set(topics) => Some(topics),
        }
    }

    /// Whether no declaration has been received.
    pub fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

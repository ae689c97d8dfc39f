//! Latest value per topic, fed by both pushes and fallback pulls.

use std::collections::HashMap;

use parking_lot::Mutex;
use pulse_core::{MessageKind, Topic};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Which path produced an update.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Pushed by the hub.
    Push,
    /// Pulled while the push channel was down.
    Pull,
}

/// One change observed by consumers.
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    /// Topic the value belongs to.
    pub topic: Option<Topic>,
    /// Message kind it arrived as.
    pub kind: MessageKind,
    /// The value or event body.
    pub value: Value,
    /// Push or pull.
    pub origin: Origin,
}

/// Handed out when a pull starts; redeemed when it completes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PullTicket {
    topic: Topic,
    push_seq: u64,
}

impl PullTicket {
    /// Topic being pulled.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[derive(Debug, Default)]
struct Entry {
    value: Option<Value>,
    push_seq: u64,
}

/// Latest-value cache shared by the push handler and the fallback poller.
///
/// A pull result is applied only if no push for the same topic arrived
/// since the pull began.
pub struct LatestStore {
    entries: Mutex<HashMap<Topic, Entry>>,
    updates: broadcast::Sender<Update>,
}

impl LatestStore {
    /// An empty store.
    pub fn new() -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            updates,
        }
    }

    /// Record a pushed value.
    pub fn apply_push(&self, topic: Topic, value: Value) {
        // Announce under the lock so the update stream orders like the store.
        let mut entries = self.entries.lock();
        let entry = entries.entry(topic).or_default();
        entry.push_seq += 1;
        entry.value = Some(value.clone());
        let _ = self.updates.send(Update {
            topic: Some(topic),
            kind: MessageKind::RealtimeUpdate,
            value,
            origin: Origin::Push,
        });
    }

    /// Start a pull for `topic`.
    pub fn begin_pull(&self, topic: Topic) -> PullTicket {
        let push_seq = self.entries.lock().get(&topic).map_or(0, |e| e.push_seq);
        PullTicket { topic, push_seq }
    }

    /// Apply a pulled value unless a push overtook it. Returns whether it
    /// was applied.
    pub fn apply_pull(&self, ticket: PullTicket, value: Value) -> bool {
        let mut entries = self.entries.lock();
        let entry = entries.entry(ticket.topic).or_default();
        if entry.push_seq != ticket.push_seq {
            debug!(topic = %ticket.topic, "discarding pull overtaken by a push");
            return false;
        }
        entry.value = Some(value.clone());
        let _ = self.updates.send(Update {
            topic: Some(ticket.topic),
            kind: MessageKind::RealtimeUpdate,
            value,
            origin: Origin::Pull,
        });
        true
    }

    /// Forward a pushed event. Events are not cached.
    pub fn apply_event(&self, kind: MessageKind, event: Value) {
        let topic = match kind {
            MessageKind::SessionEvent => Some(Topic::SessionEvents),
            MessageKind::SystemAlert => Some(Topic::SystemAlerts),
            _ => None,
        };
        let _ = self.updates.send(Update {
            topic,
            kind,
            value: event,
            origin: Origin::Push,
        });
    }

    /// The most recent value for `topic`.
    pub fn latest(&self, topic: Topic) -> Option<Value> {
        self.entries.lock().get(&topic).and_then(|e| e.value.clone())
    }

    /// Receive every subsequent update.
    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.updates.subscribe()
    }
}

impl Default for LatestStore {
    fn default() -> Self {
        Self::new()
    }
}

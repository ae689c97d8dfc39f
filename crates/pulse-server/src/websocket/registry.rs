//! Live connections and their subscriptions.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};
use pulse_core::{Subscription, Topic};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::connection::ClientConnection;
use crate::metrics::{SUBSCRIPTION_UPDATES_TOTAL, WS_CONNECTIONS_ACTIVE};

/// Owns every live connection for the lifetime of the hub.
///
/// The map lock only guards membership. Subscription state lives inside each
/// [`ClientConnection`], so declaring topics on one connection never blocks
/// dispatch to another.
pub struct ConnectionRegistry {
    /// Connected clients indexed by connection ID.
    connections: RwLock<HashMap<String, Arc<ClientConnection>>>,
    /// Tracks the map size so counts never take the lock.
    active_count: AtomicUsize,
    /// When false every connection receives every topic.
    selective: bool,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new(selective: bool) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            active_count: AtomicUsize::new(0),
            selective,
        }
    }

    /// Whether subscription declarations are honored.
    pub fn is_selective(&self) -> bool {
        self.selective
    }

    /// Register a connection. Its subscription starts `Unset`.
    ///
    /// Returns `false` and keeps the existing entry if the ID is taken.
    pub async fn add(&self, connection: Arc<ClientConnection>) -> bool {
        let mut conns = self.connections.write().await;
        if conns.contains_key(&connection.id) {
            debug!(conn_id = %connection.id, "connection already registered");
            return false;
        }
        let _ = conns.insert(connection.id.clone(), connection);
        let active = self.active_count.fetch_add(1, Ordering::Relaxed) + 1;
        record_active(active);
        true
    }

    /// Remove and close a connection.
    ///
    /// Safe to call while a dispatch that already holds the connection is in
    /// flight: later sends to it are refused.
    pub async fn remove(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        let mut conns = self.connections.write().await;
        let removed = conns.remove(connection_id);
        if let Some(conn) = &removed {
            let active = self.active_count.fetch_sub(1, Ordering::Relaxed) - 1;
            drop(conns);
            conn.close();
            record_active(active);
        }
        removed
    }

    /// Look up a connection.
    pub async fn get(&self, connection_id: &str) -> Option<Arc<ClientConnection>> {
        self.connections.read().await.get(connection_id).cloned()
    }

    /// Replace a connection's subscription with the valid subset of `requested`.
    ///
    /// Returns the stored set, or `None` when the connection is unknown or
    /// selective subscriptions are disabled (then nothing is stored).
    pub async fn set_subscriptions<S: AsRef<str>>(
        &self,
        connection_id: &str,
        requested: &[S],
    ) -> Option<BTreeSet<Topic>> {
        if !self.selective {
            debug!(conn_id = connection_id, "selective subscriptions disabled, ignoring declaration");
            return None;
        }
        let conn = self.get(connection_id).await?;
        let subscription = Subscription::from_requested(requested);
        let stored = subscription.topics().cloned().unwrap_or_default();
        let rejected = requested.len().saturating_sub(stored.len());
        conn.replace_subscription(subscription);
        counter!(SUBSCRIPTION_UPDATES_TOTAL).increment(1);
        info!(
            conn_id = connection_id,
            topics = ?stored,
            rejected,
            "subscriptions updated"
        );
        Some(stored)
    }

    /// Whether a registered connection should receive `topic`.
    ///
    /// Unknown connections receive nothing.
    pub async fn is_subscribed(&self, connection_id: &str, topic: Topic) -> bool {
        match self.get(connection_id).await {
            Some(conn) => self.allows(&conn, topic),
            None => false,
        }
    }

    /// The delivery rule: feature disabled, or nothing declared, or declared.
    pub fn allows(&self, connection: &ClientConnection, topic: Topic) -> bool {
        !self.selective || connection.with_subscription(|s| s.allows(topic))
    }

    /// Whether `connection` should receive a message tagged with `topics`.
    pub fn wants_any(&self, connection: &ClientConnection, topics: &BTreeSet<Topic>) -> bool {
        topics.iter().any(|topic| self.allows(connection, *topic))
    }

    /// The connection's explicit topic set, if one is in effect.
    pub fn declared_topics(&self, connection: &ClientConnection) -> Option<BTreeSet<Topic>> {
        if !self.selective {
            return None;
        }
        connection.with_subscription(|s| s.topics().cloned())
    }

    /// Clone the current membership so sends happen without the lock.
    pub async fn snapshot(&self) -> Vec<Arc<ClientConnection>> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Number of active connections.
    pub fn connection_count(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Close and drop every connection. Returns how many were closed.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<_> = {
            let mut conns = self.connections.write().await;
            // Count changes only under the write lock, in step with the map.
            self.active_count.store(0, Ordering::Relaxed);
            conns.drain().collect()
        };
        record_active(0);
        for (_, conn) in &drained {
            conn.close();
        }
        drained.len()
    }
}

#[allow(clippy::cast_precision_loss)]
fn record_active(active: usize) {
    gauge!(WS_CONNECTIONS_ACTIVE).set(active as f64);
}

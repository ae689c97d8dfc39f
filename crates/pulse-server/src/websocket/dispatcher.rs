//! Selective fan-out of topic-tagged messages.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use metrics::counter;
use pulse_core::{BundlePolicy, Message, Topic};
use tracing::{debug, warn};

use super::registry::ConnectionRegistry;
use crate::metrics::{
    BROADCAST_DELIVERIES_TOTAL, BROADCAST_SEND_FAILURES_TOTAL, BROADCASTS_TOTAL,
};

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Connections whose subscription matched.
    pub recipients: usize,
    /// Frames queued successfully.
    pub delivered: usize,
    /// Sends that failed; those connections were removed.
    pub failed: usize,
    /// Connections that did not match or were already closing.
    pub skipped: usize,
}

/// Delivers each message to every connection subscribed to at least one of
/// its topics.
///
/// Sends never wait on a socket: each connection has a bounded queue drained
/// by its own writer task, and a full or closed queue counts as a failed send
/// that disconnects that client only.
pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    policy: BundlePolicy,
}

impl Dispatcher {
    /// Create a dispatcher over `registry`.
    pub fn new(registry: Arc<ConnectionRegistry>, policy: BundlePolicy) -> Self {
        Self { registry, policy }
    }

    /// The registry this dispatcher reads.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Fan `message` out. At-most-once: failed sends are not retried.
    pub async fn broadcast(&self, message: &Message) -> DispatchReport {
        let connections = self.registry.snapshot().await;
        let mut report = DispatchReport::default();
        let mut rendered: HashMap<Option<BTreeSet<Topic>>, Arc<String>> = HashMap::new();
        let mut failed_ids = Vec::new();

        for conn in &connections {
            if conn.is_closed() || !self.registry.wants_any(conn, message.topics()) {
                report.skipped += 1;
                continue;
            }
            report.recipients += 1;

            let declared = self.registry.declared_topics(conn);
            let view = message.view_for(self.policy, declared.as_ref());
            let frame = match rendered.entry(view) {
                Entry::Occupied(entry) => Arc::clone(entry.get()),
                Entry::Vacant(entry) => match message.render(entry.key().as_ref()) {
                    Ok(json) => Arc::clone(entry.insert(Arc::new(json))),
                    Err(e) => {
                        warn!(kind = message.kind().as_str(), error = %e, "failed to render message");
                        break;
                    }
                },
            };

            if conn.send(frame) {
                report.delivered += 1;
            } else {
                report.failed += 1;
                failed_ids.push(conn.id.clone());
            }
        }

        for id in &failed_ids {
            if self.registry.remove(id).await.is_some() {
                warn!(conn_id = %id, "send failed, disconnecting client");
            }
        }

        counter!(BROADCASTS_TOTAL, "kind" => message.kind().as_str()).increment(1);
        counter!(BROADCAST_DELIVERIES_TOTAL).increment(report.delivered as u64);
        counter!(BROADCAST_SEND_FAILURES_TOTAL).increment(report.failed as u64);
        debug!(
            kind = message.kind().as_str(),
            topics = ?message.topics(),
            recipients = report.recipients,
            delivered = report.delivered,
            failed = report.failed,
            views = rendered.len(),
            "broadcast"
        );
        report
    }
}

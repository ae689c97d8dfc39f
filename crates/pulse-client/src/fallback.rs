//! Polling fallback while the push channel is down.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use pulse_core::{PullSource, Topic, TopicKind};
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::state::ConnectionState;
use crate::store::LatestStore;

/// Pulls the needed topics into the store whenever the controller is not
/// connected, and stops as soon as it is.
pub struct FallbackCoordinator {
    pull: Arc<dyn PullSource>,
    store: Arc<LatestStore>,
    topics: RwLock<Vec<Topic>>,
    interval: Duration,
}

impl FallbackCoordinator {
    /// Create a coordinator. Only sampled topics are pulled; event topics
    /// have no request/response form.
    pub fn new(
        pull: Arc<dyn PullSource>,
        store: Arc<LatestStore>,
        topics: &[Topic],
        interval: Duration,
    ) -> Self {
        Self {
            pull,
            store,
            topics: RwLock::new(pullable(topics)),
            interval,
        }
    }

    /// Replace the set of topics to pull.
    pub fn set_topics(&self, topics: &[Topic]) {
        *self.topics.write() = pullable(topics);
    }

    /// Topics currently pulled.
    pub fn topics(&self) -> Vec<Topic> {
        self.topics.read().clone()
    }

    /// Pull every topic once, concurrently. Returns how many values were
    /// applied to the store.
    pub async fn pull_once(&self) -> usize {
        let topics = self.topics();
        let pulls = topics.into_iter().map(|topic| {
            let ticket = self.store.begin_pull(topic);
            async move {
                match self.pull.get(topic).await {
                    Ok(value) => self.store.apply_pull(ticket, value),
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "fallback pull failed");
                        false
                    }
                }
            }
        });
        futures::future::join_all(pulls)
            .await
            .into_iter()
            .filter(|applied| *applied)
            .count()
    }

    /// Follow `state` until `cancel` fires, pulling on every interval while
    /// it is not `Connected`. The first pull happens on entering that state.
    #[instrument(skip_all, name = "fallback")]
    pub async fn run(
        self: Arc<Self>,
        mut state: watch::Receiver<ConnectionState>,
        cancel: CancellationToken,
    ) {
        loop {
            while state.borrow_and_update().is_connected() {
                tokio::select! {
                    changed = state.changed() => if changed.is_err() { return; },
                    () = cancel.cancelled() => return,
                }
            }

            info!(topics = ?self.topics(), "push channel down, polling");
            let mut ticker = time::interval(self.interval);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let applied = self.pull_once().await;
                        debug!(applied, "fallback pull");
                    }
                    changed = state.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        if state.borrow().is_connected() {
                            info!("push channel restored, polling stopped");
                            break;
                        }
                    }
                    () = cancel.cancelled() => return,
                }
            }
        }
    }
}

fn pullable(topics: &[Topic]) -> Vec<Topic> {
    topics
        .iter()
        .copied()
        .filter(|t| t.kind() == TopicKind::Sampled)
        .collect()
}

//! Periodic composite snapshot of the sampled topics.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use pulse_core::{Message, PullSource, Topic};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::metrics::{SOURCE_TICKS_SKIPPED_TOTAL, UPSTREAM_FAILURES_TOTAL};
use crate::websocket::dispatcher::{DispatchReport, Dispatcher};

/// Pulls every sampled topic on a fixed period and broadcasts one
/// `realtime_update` bundle per tick.
pub struct SamplingSource {
    topics: Vec<Topic>,
    pull: Arc<dyn PullSource>,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl SamplingSource {
    /// Create a sampling source over `topics`.
    pub fn new(
        topics: Vec<Topic>,
        pull: Arc<dyn PullSource>,
        dispatcher: Arc<Dispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            topics,
            pull,
            dispatcher,
            interval,
        }
    }

    /// Topics included in each bundle.
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Pull all topics concurrently and assemble a bundle.
    ///
    /// Unavailable topics are left out; returns `None` if none answered.
    pub async fn sample_once(&self) -> Option<Message> {
        let pulls = self.topics.iter().map(|&topic| {
            let pull = Arc::clone(&self.pull);
            async move { (topic, pull.get(topic).await) }
        });

        let mut entries = BTreeMap::new();
        for (topic, result) in futures::future::join_all(pulls).await {
            match result {
                Ok(value) => {
                    let _ = entries.insert(topic, value);
                }
                Err(e) => {
                    counter!(UPSTREAM_FAILURES_TOTAL, "topic" => topic.as_str()).increment(1);
                    warn!(topic = %topic, error = %e, "sample unavailable");
                }
            }
        }

        if entries.is_empty() {
            None
        } else {
            Some(Message::bundle(entries))
        }
    }

    /// One tick: skip when nobody is connected, otherwise sample under a
    /// deadline of one period and broadcast.
    pub async fn tick(&self) -> Option<DispatchReport> {
        if self.dispatcher.registry().connection_count() == 0 {
            debug!("no connections, skipping sample");
            return None;
        }

        match time::timeout(self.interval, self.sample_once()).await {
            Ok(Some(message)) => Some(self.dispatcher.broadcast(&message).await),
            Ok(None) => {
                warn!("no sampled topic available, nothing sent");
                None
            }
            Err(_) => {
                counter!(SOURCE_TICKS_SKIPPED_TOTAL, "source" => "sampling").increment(1);
                warn!(
                    deadline_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
                    "sampling stalled, skipping tick"
                );
                None
            }
        }
    }

    /// Tick every period until `cancel` fires. Missed ticks are dropped.
    #[instrument(skip_all, name = "sampling")]
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        info!(topics = ?self.topics, "sampling source started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.tick().await;
                }
                () = cancel.cancelled() => break,
            }
        }
        info!("sampling source stopped");
    }
}

//! Change detection for event topics.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use parking_lot::Mutex;
use pulse_core::{Change, ChangeFeed, Message, PullSource, Topic, UpstreamError};
use serde_json::Value;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::edge::EdgeTrigger;
use crate::metrics::{SOURCE_TICKS_SKIPPED_TOTAL, UPSTREAM_FAILURES_TOTAL};
use crate::websocket::dispatcher::{DispatchReport, Dispatcher};

/// Where an event topic's signal is read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signal {
    /// Topic pulled from upstream.
    pub source: Topic,
    /// JSON pointer into the pulled value.
    pub pointer: String,
    /// Reject readings that are not integers.
    pub integer: bool,
}

impl Signal {
    /// Watch one field of `source`.
    pub fn at(source: Topic, pointer: impl Into<String>) -> Self {
        Self {
            source,
            pointer: pointer.into(),
            integer: false,
        }
    }

    /// Only accept integer readings.
    #[must_use]
    pub fn integer(mut self) -> Self {
        self.integer = true;
        self
    }

    fn extract(&self, snapshot: &Value) -> Result<Value, String> {
        let value = snapshot
            .pointer(&self.pointer)
            .ok_or_else(|| format!("signal {} missing from response", self.pointer))?;
        if self.integer && !value.is_i64() {
            return Err(format!("signal {} is not an integer: {value}", self.pointer));
        }
        Ok(value.clone())
    }
}

/// [`ChangeFeed`] built on polling a [`PullSource`].
pub struct PollingChangeFeed {
    pull: Arc<dyn PullSource>,
    signals: HashMap<Topic, Signal>,
    triggers: Mutex<HashMap<Topic, EdgeTrigger<Value>>>,
}

impl PollingChangeFeed {
    /// A feed that watches nothing yet.
    pub fn new(pull: Arc<dyn PullSource>) -> Self {
        Self {
            pull,
            signals: HashMap::new(),
            triggers: Mutex::new(HashMap::new()),
        }
    }

    /// Report changes for `topic` by watching `signal`.
    #[must_use]
    pub fn watch(mut self, topic: Topic, signal: Signal) -> Self {
        let _ = self.signals.insert(topic, signal);
        self
    }

    /// Like [`watch`](Self::watch), but compare the first reading against
    /// `baseline` instead of taking it silently.
    #[must_use]
    pub fn watch_from(self, topic: Topic, signal: Signal, baseline: Value) -> Self {
        let _ = self
            .triggers
            .lock()
            .insert(topic, EdgeTrigger::with_baseline(baseline));
        self.watch(topic, signal)
    }
}

#[async_trait]
impl ChangeFeed for PollingChangeFeed {
    async fn check_for_change(&self, topic: Topic) -> Result<Option<Change>, UpstreamError> {
        let signal = self
            .signals
            .get(&topic)
            .ok_or(UpstreamError::Unsupported(topic))?;
        let snapshot = self.pull.get(signal.source).await?;
        let current = signal
            .extract(&snapshot)
            .map_err(|reason| UpstreamError::unavailable(signal.source, reason))?;

        let transition = self
            .triggers
            .lock()
            .entry(topic)
            .or_default()
            .observe(current);
        Ok(transition.map(|(previous, current)| Change {
            previous,
            current,
            snapshot,
        }))
    }
}

/// Turns a reported [`Change`] into the message to broadcast.
pub trait EventShaper: Send {
    /// Shape `change`, or return `None` to suppress it.
    fn shape(&mut self, change: &Change) -> Option<Message>;

    /// Called after a successful check that saw no change. Lets a shaper
    /// release something it held back earlier.
    fn on_quiet(&mut self) -> Option<Message> {
        None
    }
}

/// Periodically asks a [`ChangeFeed`] about one event topic and broadcasts
/// what the shaper makes of each change.
pub struct ChangeSource<S> {
    topic: Topic,
    feed: Arc<dyn ChangeFeed>,
    shaper: S,
    dispatcher: Arc<Dispatcher>,
    interval: Duration,
}

impl<S: EventShaper> ChangeSource<S> {
    /// Create a change source.
    pub fn new(
        topic: Topic,
        feed: Arc<dyn ChangeFeed>,
        shaper: S,
        dispatcher: Arc<Dispatcher>,
        interval: Duration,
    ) -> Self {
        Self {
            topic,
            feed,
            shaper,
            dispatcher,
            interval,
        }
    }

    /// Run one check. Returns the dispatch report when something was sent.
    ///
    /// The check is bounded by one interval; upstream errors and timeouts
    /// are logged and skipped.
    pub async fn check_once(&mut self) -> Option<DispatchReport> {
        let message = match time::timeout(self.interval, self.feed.check_for_change(self.topic)).await {
            Ok(Ok(Some(change))) => self.shaper.shape(&change)?,
            Ok(Ok(None)) => self.shaper.on_quiet()?,
            Ok(Err(e)) => {
                counter!(UPSTREAM_FAILURES_TOTAL, "topic" => self.topic.as_str()).increment(1);
                warn!(topic = %self.topic, error = %e, "change check failed");
                return None;
            }
            Err(_) => {
                counter!(SOURCE_TICKS_SKIPPED_TOTAL, "source" => self.topic.as_str()).increment(1);
                warn!(topic = %self.topic, "change check timed out, skipping tick");
                return None;
            }
        };

        let report = self.dispatcher.broadcast(&message).await;
        debug!(topic = %self.topic, recipients = report.recipients, "event broadcast");
        Some(report)
    }

    /// Check every interval until `cancel` fires.
    #[instrument(skip_all, fields(topic = %self.topic))]
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
        info!(interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX), "change source started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.check_once().await;
                }
                () = cancel.cancelled() => break,
            }
        }
        info!("change source stopped");
    }
}

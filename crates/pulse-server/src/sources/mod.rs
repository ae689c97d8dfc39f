//! Event sources: the producers that feed the dispatcher.
//!
//! - [`sampling`]: composite `realtime_update` bundle on a fixed period
//! - [`change`]: edge-triggered detectors for event topics
//! - [`sessions`], [`alerts`]: shapers for the two event topics

pub mod alerts;
pub mod change;
pub mod edge;
pub mod sampling;
pub mod sessions;

use std::sync::Arc;
use std::time::Duration;

use pulse_core::topic::parse_topic_list;
use pulse_core::{PulseError, PullSource, Topic, TopicKind};
use pulse_settings::PulseSettings;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use self::alerts::{AlertEvaluator, AlertShaper};
use self::change::{ChangeSource, PollingChangeFeed, Signal};
use self::sampling::SamplingSource;
use self::sessions::SessionEventShaper;
use crate::websocket::dispatcher::Dispatcher;

/// Resolve the configured sampled topic names.
///
/// Unknown names and event topics are configuration errors.
pub fn resolve_sampled_topics<S: AsRef<str>>(names: &[S]) -> Result<Vec<Topic>, PulseError> {
    let topics = parse_topic_list(names)?;
    if let Some(topic) = topics.iter().find(|t| t.kind() != TopicKind::Sampled) {
        return Err(PulseError::WrongTopicKind {
            topic: *topic,
            expected: "a sampled topic",
        });
    }
    Ok(topics)
}

/// Spawn one task per enabled source, all stopped by `cancel`.
///
/// `pull` serves the sampled topics; alert evaluation is layered on top of
/// it here. Fails before spawning anything if the topic configuration is
/// invalid. Spawns nothing while the push channel is administratively off.
pub fn spawn_sources(
    settings: &PulseSettings,
    pull: Arc<dyn PullSource>,
    dispatcher: &Arc<Dispatcher>,
    cancel: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>, PulseError> {
    let toggles = &settings.sources.topics;
    let sampled: Vec<Topic> = resolve_sampled_topics(&settings.sources.sampled_topics)?
        .into_iter()
        .filter(|t| toggles.is_enabled(*t))
        .collect();

    if !settings.broadcast.enabled {
        info!("broadcasting disabled, no sources started");
        return Ok(Vec::new());
    }

    let mut handles = Vec::new();

    if !sampled.is_empty() {
        let source = SamplingSource::new(
            sampled,
            Arc::clone(&pull),
            Arc::clone(dispatcher),
            Duration::from_millis(settings.sources.sample_interval_ms),
        );
        handles.push(tokio::spawn(source.run(cancel.clone())));
    }

    let change_interval = Duration::from_millis(settings.sources.change_interval_ms);
    let evaluator: Arc<dyn PullSource> =
        Arc::new(AlertEvaluator::new(pull, settings.alerts.clone()));
    let feed = Arc::new(
        PollingChangeFeed::new(evaluator)
            .watch(
                Topic::SessionEvents,
                Signal::at(Topic::Sessions, "/active_sessions").integer(),
            )
            .watch_from(
                Topic::SystemAlerts,
                Signal::at(Topic::SystemAlerts, "/active"),
                json!([]),
            ),
    );

    if toggles.session_events {
        let source = ChangeSource::new(
            Topic::SessionEvents,
            feed.clone(),
            SessionEventShaper::new(),
            Arc::clone(dispatcher),
            change_interval,
        );
        handles.push(tokio::spawn(source.run(cancel.clone())));
    }

    if toggles.system_alerts {
        let source = ChangeSource::new(
            Topic::SystemAlerts,
            feed,
            AlertShaper::new(Duration::from_secs(settings.alerts.cooldown_secs)),
            Arc::clone(dispatcher),
            change_interval,
        );
        handles.push(tokio::spawn(source.run(cancel.clone())));
    }

    info!(sources = handles.len(), "event sources started");
    Ok(handles)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pulse_core::{PullSource, Topic, UpstreamError};
    use serde_json::Value;

    /// In-memory upstream with settable per-topic answers.
    #[derive(Default)]
    pub(crate) struct ScriptedSource {
        values: Mutex<HashMap<Topic, Option<Value>>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub(crate) fn set(&self, topic: Topic, value: Value) {
            let _ = self.values.lock().insert(topic, Some(value));
        }

        pub(crate) fn fail(&self, topic: Topic) {
            let _ = self.values.lock().insert(topic, None);
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PullSource for ScriptedSource {
        async fn get(&self, topic: Topic) -> Result<Value, UpstreamError> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match self.values.lock().get(&topic) {
                Some(Some(value)) => Ok(value.clone()),
                Some(None) => Err(UpstreamError::unavailable(topic, "scripted failure")),
                None => Err(UpstreamError::Unsupported(topic)),
            }
        }
    }
}

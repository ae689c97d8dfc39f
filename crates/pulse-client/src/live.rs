//! `LiveClient`: push channel, polling fallback and store wired together.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pulse_core::topic::parse_topic_list;
use pulse_core::wire::ServerMessage;
use pulse_core::{MessageKind, PullSource, Topic};
use pulse_settings::ClientSettings;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::{ConnectionController, ControllerConfig};
use crate::errors::ClientError;
use crate::fallback::FallbackCoordinator;
use crate::pull::HttpPullSource;
use crate::state::ConnectionState;
use crate::store::LatestStore;

/// A viewer's view of the hub: latest values arrive by push when the
/// WebSocket is up and by pull when it is not.
pub struct LiveClient {
    controller: ConnectionController,
    fallback: Arc<FallbackCoordinator>,
    store: Arc<LatestStore>,
    topics: Mutex<Vec<Topic>>,
    cancel: CancellationToken,
    fallback_task: Mutex<Option<JoinHandle<()>>>,
}

impl LiveClient {
    /// Assemble a client. `topics` is declared on every connect.
    pub fn new(
        config: ControllerConfig,
        pull: Arc<dyn PullSource>,
        topics: Vec<Topic>,
        fallback_interval: Duration,
    ) -> Self {
        let store = Arc::new(LatestStore::new());
        let fallback = Arc::new(FallbackCoordinator::new(
            pull,
            Arc::clone(&store),
            &topics,
            fallback_interval,
        ));
        Self {
            controller: ConnectionController::new(config),
            fallback,
            store,
            topics: Mutex::new(topics),
            cancel: CancellationToken::new(),
            fallback_task: Mutex::new(None),
        }
    }

    /// Build from settings, pulling from the configured REST fallback.
    pub fn from_settings(settings: &ClientSettings) -> Result<Self, ClientError> {
        let topics = parse_topic_list(&settings.topics)?;
        let pull = Arc::new(HttpPullSource::new(&settings.fallback)?);
        Ok(Self::new(
            ControllerConfig::from(settings),
            pull,
            topics,
            Duration::from_millis(settings.fallback_interval_ms),
        ))
    }

    /// Connect and start the fallback poller.
    pub fn start(&self) -> Result<(), ClientError> {
        if self.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        let store = Arc::clone(&self.store);
        self.controller
            .on_message(move |message| apply_message(&store, message));
        self.controller.set_subscriptions(&self.topics.lock());
        self.controller.connect()?;

        let mut task = self.fallback_task.lock();
        if task.is_none() {
            *task = Some(tokio::spawn(
                Arc::clone(&self.fallback).run(self.controller.watch_state(), self.cancel.clone()),
            ));
        }
        info!(topics = ?self.topics.lock(), "live client started");
        Ok(())
    }

    /// Change the declared topics (sent immediately if connected) and the
    /// topics pulled while disconnected.
    pub fn set_subscriptions(&self, topics: &[Topic]) {
        *self.topics.lock() = topics.to_vec();
        self.fallback.set_topics(topics);
        self.controller.set_subscriptions(topics);
    }

    /// Push channel state.
    pub fn state(&self) -> ConnectionState {
        self.controller.state()
    }

    /// Shared latest-value store.
    pub fn store(&self) -> &Arc<LatestStore> {
        &self.store
    }

    /// The underlying controller.
    pub fn controller(&self) -> &ConnectionController {
        &self.controller
    }

    /// Stop the controller and the poller and wait for both.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.controller.disconnect().await;
        let task = self.fallback_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for LiveClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Route one pushed frame into the store.
fn apply_message(store: &LatestStore, message: ServerMessage) {
    match message.message_kind() {
        Some(MessageKind::RealtimeUpdate) => {
            for (name, value) in message.data.into_iter().flatten() {
                match Topic::from_str(&name) {
                    Ok(topic) => store.apply_push(topic, value),
                    Err(_) => debug!(topic = %name, "ignoring unknown topic in bundle"),
                }
            }
        }
        Some(kind @ (MessageKind::SessionEvent | MessageKind::SystemAlert)) => {
            if let Some(event) = message.event {
                store.apply_event(kind, event);
            }
        }
        Some(MessageKind::Subscribed) => {
            debug!(
                subscriptions = ?message.subscriptions,
                selective = ?message.selective,
                "subscription acknowledged"
            );
        }
        Some(MessageKind::Heartbeat) => {}
        None => debug!(kind = %message.kind, "ignoring unknown frame type"),
    }
}

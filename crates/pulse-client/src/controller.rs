//! Reconnecting WebSocket controller.
//!
//! One background task owns the transport. It walks
//! `disconnected → connecting → connected → disconnected`, re-declares the
//! desired subscriptions on every connect, and waits a backoff delay between
//! attempts.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use pulse_core::Topic;
use pulse_core::retry::{ReconnectBackoff, ReconnectConfig};
use pulse_core::wire::{ClientMessage, ServerMessage};
use pulse_settings::ClientSettings;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::errors::ClientError;
use crate::state::ConnectionState;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Callback for every decoded server frame.
pub type MessageHandler = Arc<dyn Fn(ServerMessage) + Send + Sync>;

/// Controller configuration.
#[derive(Clone, Debug)]
pub struct ControllerConfig {
    /// Hub WebSocket URL.
    pub url: String,
    /// Delay bounds between attempts.
    pub reconnect: ReconnectConfig,
    /// Deadline for one connection attempt, and for each socket write.
    pub connect_timeout: Duration,
}

impl ControllerConfig {
    /// Config for `url` with default timing.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ClientSettings> for ControllerConfig {
    fn from(settings: &ClientSettings) -> Self {
        Self {
            url: settings.url.clone(),
            reconnect: settings.reconnect.clone(),
            connect_timeout: Duration::from_millis(settings.connect_timeout_ms),
        }
    }
}

#[derive(Default)]
struct Outbox {
    desired: Option<Vec<Topic>>,
    tx: Option<mpsc::UnboundedSender<String>>,
}

struct Inner {
    config: ControllerConfig,
    state: watch::Sender<ConnectionState>,
    outbox: Mutex<Outbox>,
    handler: Mutex<Option<MessageHandler>>,
    cancel: CancellationToken,
}

/// Owns the push channel to the hub.
pub struct ConnectionController {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionController {
    /// A controller that has not connected yet.
    pub fn new(config: ControllerConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                outbox: Mutex::new(Outbox::default()),
                handler: Mutex::new(None),
                cancel: CancellationToken::new(),
            }),
            task: Mutex::new(None),
        }
    }

    /// Register the handler for decoded frames, replacing any previous one.
    pub fn on_message(&self, handler: impl Fn(ServerMessage) + Send + Sync + 'static) {
        *self.inner.handler.lock() = Some(Arc::new(handler));
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Start the background task. Calling it again while running is a no-op.
    pub fn connect(&self) -> Result<(), ClientError> {
        if self.inner.cancel.is_cancelled() {
            return Err(ClientError::Closed);
        }
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }
        *task = Some(tokio::spawn(run(Arc::clone(&self.inner))));
        Ok(())
    }

    /// Replace the desired topic set. Sent now if connected, otherwise on
    /// the next connect.
    pub fn set_subscriptions(&self, topics: &[Topic]) {
        let mut outbox = self.inner.outbox.lock();
        outbox.desired = Some(topics.to_vec());
        if let Some(tx) = &outbox.tx {
            let _ = tx.send(ClientMessage::subscribe_frame(topics));
        }
    }

    /// The desired topic set, if one was declared.
    pub fn subscriptions(&self) -> Option<Vec<Topic>> {
        self.inner.outbox.lock().desired.clone()
    }

    /// Stop for good and wait for the task. No handler call happens after
    /// this returns.
    pub async fn disconnect(&self) {
        self.inner.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        let _ = self.inner.state.send_replace(ConnectionState::Disconnected);
    }
}

impl Drop for ConnectionController {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

impl Inner {
    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "connection state");
        }
    }

    fn deliver(&self, text: &str) {
        let message = match ServerMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping undecodable frame");
                return;
            }
        };
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(message);
        }
    }

    /// Pump one live socket until it fails or the controller is cancelled.
    async fn session(&self, socket: Socket) -> &'static str {
        let (mut sink, mut stream) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut outbox = self.outbox.lock();
            if let Some(topics) = &outbox.desired {
                let _ = tx.send(ClientMessage::subscribe_frame(topics));
            }
            outbox.tx = Some(tx);
        }
        self.set_state(ConnectionState::Connected);

        // A stalled socket must not pin the task, or `disconnect` never returns.
        let write_timeout = self.config.connect_timeout;
        let reason = loop {
            tokio::select! {
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => self.deliver(text.as_str()),
                    Some(Ok(WsMessage::Close(_))) | None => break "server closed",
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "read failed");
                        break "read failed";
                    }
                },
                Some(text) = rx.recv() => {
                    match time::timeout(write_timeout, sink.send(WsMessage::Text(text.into()))).await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            debug!(error = %e, "write failed");
                            break "write failed";
                        }
                        Err(_) => break "write timed out",
                    }
                }
                () = self.cancel.cancelled() => {
                    let _ = time::timeout(write_timeout, sink.send(WsMessage::Close(None))).await;
                    break "disconnected";
                }
            }
        };

        self.outbox.lock().tx = None;
        reason
    }
}

#[instrument(skip_all, fields(url = %inner.config.url))]
async fn run(inner: Arc<Inner>) {
    let mut backoff = ReconnectBackoff::new(inner.config.reconnect.clone());

    while !inner.cancel.is_cancelled() {
        inner.set_state(ConnectionState::Connecting);
        let attempt = tokio::select! {
            result = time::timeout(inner.config.connect_timeout, connect_async(inner.config.url.as_str())) => result,
            () = inner.cancel.cancelled() => break,
        };

        match attempt {
            Ok(Ok((socket, _))) => {
                backoff.reset();
                info!("connected");
                let reason = inner.session(socket).await;
                info!(reason, "connection lost");
            }
            Ok(Err(e)) => warn!(error = %e, "connect failed"),
            Err(_) => warn!("connect timed out"),
        }

        inner.set_state(ConnectionState::Disconnected);
        if inner.cancel.is_cancelled() {
            break;
        }

        let delay = backoff.next_delay();
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            attempt = backoff.attempts(),
            "reconnecting"
        );
        tokio::select! {
            () = time::sleep(delay) => {}
            () = inner.cancel.cancelled() => break,
        }
    }

    inner.set_state(ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let controller = ConnectionController::new(ControllerConfig::new("ws://127.0.0.1:1/ws"));
        assert_eq!(controller.state(), ConnectionState::Disconnected);
        assert!(controller.subscriptions().is_none());
    }

    #[test]
    fn desired_set_is_kept_while_disconnected() {
        let controller = ConnectionController::new(ControllerConfig::new("ws://127.0.0.1:1/ws"));
        controller.set_subscriptions(&[Topic::Metrics]);
        controller.set_subscriptions(&[Topic::Sessions]);
        assert_eq!(controller.subscriptions(), Some(vec![Topic::Sessions]));
    }

    #[test]
    fn config_from_settings() {
        let settings = ClientSettings::default();
        let config = ControllerConfig::from(&settings);
        assert_eq!(config.url, "ws://localhost:8090/ws");
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect.min_delay_ms, 1000);
    }

    #[tokio::test]
    async fn connect_after_disconnect_is_refused() {
        let controller = ConnectionController::new(ControllerConfig::new("ws://127.0.0.1:1/ws"));
        controller.disconnect().await;
        assert!(matches!(controller.connect(), Err(ClientError::Closed)));
    }

    #[tokio::test]
    async fn unreachable_hub_cycles_back_to_disconnected() {
        let mut config = ControllerConfig::new("ws://127.0.0.1:1/ws");
        config.reconnect = ReconnectConfig {
            min_delay_ms: 10,
            max_delay_ms: 20,
        };
        let controller = ConnectionController::new(config);
        let mut states = controller.watch_state();
        controller.connect().unwrap();

        time::timeout(Duration::from_secs(5), async {
            loop {
                states.changed().await.unwrap();
                if *states.borrow_and_update() == ConnectionState::Connecting {
                    break;
                }
            }
        })
        .await
        .unwrap();

        controller.disconnect().await;
        assert_eq!(controller.state(), ConnectionState::Disconnected);
    }
}

//! WebSocket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pulse_core::Subscription;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A connected viewer.
///
/// Owned by the [`ConnectionRegistry`](super::registry::ConnectionRegistry);
/// the session task holds the other end of `tx`.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    /// What this viewer asked for. Only the registry mutates it.
    subscription: Mutex<Subscription>,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the client has responded to the last ping.
    pub is_alive: AtomicBool,
    /// Count of frames that could not be queued.
    pub dropped_messages: AtomicU64,
    /// Cancelled once the connection is removed; the session tears down on it.
    closed: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection with no subscription declared.
    pub fn new(id: String, tx: mpsc::Sender<Arc<String>>) -> Self {
        Self {
            id,
            subscription: Mutex::new(Subscription::Unset),
            tx,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
            dropped_messages: AtomicU64::new(0),
            closed: CancellationToken::new(),
        }
    }

    /// Fresh time-ordered connection ID.
    pub fn generate_id() -> String {
        format!("conn_{}", Uuid::now_v7())
    }

    /// Current subscription state.
    pub fn subscription(&self) -> Subscription {
        self.subscription.lock().clone()
    }

    /// Evaluate `f` against the subscription without cloning it.
    pub fn with_subscription<R>(&self, f: impl FnOnce(&Subscription) -> R) -> R {
        f(&self.subscription.lock())
    }

    pub(crate) fn replace_subscription(&self, subscription: Subscription) {
        *self.subscription.lock() = subscription;
    }

    /// Queue a text frame without waiting.
    ///
    /// Returns `false` if the connection is closed or its queue is full or
    /// closed, and increments the dropped message counter.
    pub fn send(&self, message: Arc<String>) -> bool {
        if !self.is_closed() && self.tx.try_send(message).is_ok() {
            true
        } else {
            let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Queue an owned string.
    pub fn send_text(&self, message: String) -> bool {
        self.send(Arc::new(message))
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Mark the connection as alive (pong or inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the connection was alive since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Signal the session to close the socket. Idempotent.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token cancelled when the connection closes.
    pub fn closed_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::Topic;
    use std::collections::BTreeSet;

    fn make_connection() -> (ClientConnection, mpsc::Receiver<Arc<String>>) {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new("conn_1".into(), tx);
        (conn, rx)
    }

    #[test]
    fn new_connection_is_unset_and_alive() {
        let (conn, _rx) = make_connection();
        assert_eq!(conn.id, "conn_1");
        assert!(conn.subscription().is_unset());
        assert!(conn.is_alive.load(Ordering::Relaxed));
        assert!(!conn.is_closed());
    }

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = ClientConnection::generate_id();
        let b = ClientConnection::generate_id();
        assert_ne!(a, b);
        assert!(a.starts_with("conn_"));
    }

    #[tokio::test]
    async fn send_message_success() {
        let (conn, mut rx) = make_connection();
        assert!(conn.send(Arc::new("hello".into())));
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn send_to_closed_channel_returns_false() {
        let (tx, rx) = mpsc::channel(32);
        let conn = ClientConnection::new("conn_2".into(), tx);
        drop(rx);
        assert!(!conn.send_text("hello".into()));
        assert_eq!(conn.drop_count(), 1);
    }

    #[tokio::test]
    async fn send_to_full_channel_returns_false() {
        let (tx, _rx) = mpsc::channel(1);
        let conn = ClientConnection::new("conn_3".into(), tx);
        assert!(conn.send_text("msg1".into()));
        assert!(!conn.send_text("msg2".into()));
    }

    #[tokio::test]
    async fn send_after_close_returns_false() {
        let (conn, mut rx) = make_connection();
        conn.close();
        assert!(conn.is_closed());
        assert!(!conn.send_text("late".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn close_cancels_token() {
        let (conn, _rx) = make_connection();
        let token = conn.closed_token();
        conn.close();
        conn.close();
        assert!(token.is_cancelled());
    }

    #[test]
    fn replace_subscription() {
        let (conn, _rx) = make_connection();
        conn.replace_subscription(Subscription::Set(BTreeSet::from([Topic::Metrics])));
        assert!(conn.with_subscription(|s| s.allows(Topic::Metrics)));
        assert!(!conn.with_subscription(|s| s.allows(Topic::Containers)));
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection();
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection();
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }
}

//! One WebSocket session: writer, reader and heartbeat for a single viewer.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::connection::ClientConnection;
use super::handler;
use super::heartbeat::{self, HeartbeatResult};
use super::registry::ConnectionRegistry;
use crate::config::ServerConfig;
use crate::metrics::{WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Register the socket, pump frames until any side gives up, then unregister.
///
/// The writer drains the connection's queue with a per-write deadline, so a
/// stalled socket ends the session instead of backing up the hub. Removal
/// from the registry (send failure, shutdown) closes the socket from here.
pub async fn run_session(
    socket: WebSocket,
    registry: Arc<ConnectionRegistry>,
    config: Arc<ServerConfig>,
) {
    let (tx, mut rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity);
    let connection = Arc::new(ClientConnection::new(ClientConnection::generate_id(), tx));
    let conn_id = connection.id.clone();
    if !registry.add(Arc::clone(&connection)).await {
        return;
    }
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(conn_id = %conn_id, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = {
        let closed = connection.closed_token();
        let conn_id = conn_id.clone();
        let send_timeout = config.send_timeout();
        let ping_every = config.heartbeat_interval();
        async move {
            let mut ping_interval = time::interval(ping_every);
            ping_interval.tick().await;

            loop {
                let outgoing = tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(text) => WsMessage::Text(text.to_string().into()),
                        None => break,
                    },
                    _ = ping_interval.tick() => WsMessage::Ping(Vec::new().into()),
                    () = closed.cancelled() => {
                        let _ = time::timeout(send_timeout, ws_tx.send(WsMessage::Close(None))).await;
                        break;
                    }
                };
                match time::timeout(send_timeout, ws_tx.send(outgoing)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(conn_id = %conn_id, error = %e, "socket write failed");
                        break;
                    }
                    Err(_) => {
                        warn!(conn_id = %conn_id, "socket write timed out, disconnecting slow client");
                        break;
                    }
                }
            }
        }
    };

    let reader = async {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    connection.mark_alive();
                    let reply =
                        handler::handle_client_text(text.as_str(), &connection, &registry).await;
                    if let Some(reply) = reply {
                        if !connection.send_text(reply) {
                            break;
                        }
                    }
                }
                Ok(WsMessage::Pong(_) | WsMessage::Ping(_)) => connection.mark_alive(),
                Ok(WsMessage::Close(_)) => break,
                Ok(WsMessage::Binary(_)) => {
                    debug!(conn_id = %conn_id, "ignoring binary frame");
                }
                Err(e) => {
                    debug!(conn_id = %conn_id, error = %e, "socket read failed");
                    break;
                }
            }
        }
    };

    // Not tied to `closed`: on close the writer must get to send its Close
    // frame, and the select below drops this future either way.
    let liveness = heartbeat::run_heartbeat(
        Arc::clone(&connection),
        config.heartbeat_interval(),
        config.heartbeat_timeout(),
        CancellationToken::new(),
    );

    let reason = tokio::select! {
        () = writer => "writer closed",
        () = reader => "client closed",
        result = liveness => match result {
            HeartbeatResult::TimedOut => "heartbeat timeout",
            HeartbeatResult::Cancelled => "heartbeat stopped",
        },
    };

    let _ = registry.remove(&conn_id).await;
    connection.close();
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    info!(
        conn_id = %conn_id,
        reason,
        age_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
}

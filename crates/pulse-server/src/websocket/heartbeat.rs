//! Ping/pong liveness monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::ClientConnection;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Watch a connection's alive flag until it goes quiet or `cancel` fires.
///
/// The session's reader marks the connection alive on every pong or inbound
/// frame. Each `interval` tick consumes the flag; `timeout / interval`
/// consecutive quiet ticks (at least one) end the loop with `TimedOut`.
pub async fn run_heartbeat(
    connection: Arc<ClientConnection>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    check_interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    // The first tick fires immediately; the connection is fresh.
    check_interval.tick().await;

    let interval_ms = interval.as_millis().max(1);
    let max_missed = u32::try_from((timeout.as_millis() / interval_ms).max(1)).unwrap_or(u32::MAX);
    let mut missed: u32 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}

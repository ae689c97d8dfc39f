//! Session lifecycle events from session count transitions.

use pulse_core::{Change, Message, MessageKind, Topic};
use serde_json::json;
use tokio::time::Instant;
use tracing::{info, warn};

use super::change::EventShaper;

/// Shapes an `active_sessions` transition into a `session_event`.
#[derive(Debug)]
pub struct SessionEventShaper {
    last_event: Instant,
}

impl SessionEventShaper {
    /// A shaper whose first interval is measured from now.
    pub fn new() -> Self {
        Self {
            last_event: Instant::now(),
        }
    }
}

impl Default for SessionEventShaper {
    fn default() -> Self {
        Self::new()
    }
}

impl EventShaper for SessionEventShaper {
    fn shape(&mut self, change: &Change) -> Option<Message> {
        let (Some(previous), Some(current)) = (change.previous.as_i64(), change.current.as_i64())
        else {
            warn!(
                previous = %change.previous,
                current = %change.current,
                "session count is not an integer"
            );
            return None;
        };

        let Some(delta) = current.checked_sub(previous) else {
            warn!(previous, current, "session count delta overflows");
            return None;
        };
        let event_type = if delta > 0 {
            "session_created"
        } else {
            "session_destroyed"
        };
        let now = Instant::now();
        let since_last = now.duration_since(self.last_event).as_secs_f64();
        self.last_event = now;

        info!(event_type, delta, current, "session event detected");
        Some(Message::event(
            MessageKind::SessionEvent,
            Topic::SessionEvents,
            json!({
                "event_type": event_type,
                "data": {
                    "current_count": current,
                    "previous_count": previous,
                    "delta": delta,
                    "time_since_last_event": since_last,
                },
            }),
        ))
    }
}

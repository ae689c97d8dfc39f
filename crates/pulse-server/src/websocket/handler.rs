//! Inbound client frame handling.

use chrono::Utc;
use metrics::counter;
use pulse_core::Topic;
use pulse_core::wire::{self, ClientMessage};
use tracing::{debug, instrument, warn};

use super::connection::ClientConnection;
use super::registry::ConnectionRegistry;
use crate::metrics::MALFORMED_MESSAGES_TOTAL;

/// Handle one text frame from a client and return the direct reply, if any.
///
/// Malformed frames are logged and dropped; they never close the connection.
#[instrument(skip_all, fields(conn_id = %connection.id))]
pub async fn handle_client_text(
    text: &str,
    connection: &ClientConnection,
    registry: &ConnectionRegistry,
) -> Option<String> {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            counter!(MALFORMED_MESSAGES_TOTAL).increment(1);
            warn!(error = %e, len = text.len(), "dropping malformed client message");
            return None;
        }
    };

    match message {
        ClientMessage::Ping => Some(wire::heartbeat_frame(Utc::now())),
        ClientMessage::Subscribe(names) => {
            match registry
                .set_subscriptions(&connection.id, names.as_slice())
                .await
            {
                Some(stored) => Some(wire::subscribed_frame(&stored, true, Utc::now())),
                None if !registry.is_selective() => {
                    Some(wire::subscribed_frame(&Topic::ALL, false, Utc::now()))
                }
                None => None,
            }
        }
        ClientMessage::Other(kind) => {
            debug!(kind, "ignoring unsupported client message");
            None
        }
    }
}

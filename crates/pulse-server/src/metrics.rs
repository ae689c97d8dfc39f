//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus metrics recorder (global).
///
/// Returns the handle used to render the `/metrics` endpoint. Call once at
/// startup before any metric is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Render Prometheus text format from the installed recorder.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

// Metric name constants to avoid typos across modules.

/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Upgrades refused because of the connection cap or a disabled hub (counter).
pub const WS_REJECTED_TOTAL: &str = "ws_rejected_total";
/// Broadcasts dispatched (counter, labels: kind).
pub const BROADCASTS_TOTAL: &str = "broadcasts_total";
/// Frames handed to connection queues (counter).
pub const BROADCAST_DELIVERIES_TOTAL: &str = "broadcast_deliveries_total";
/// Sends that failed and removed the connection (counter).
pub const BROADCAST_SEND_FAILURES_TOTAL: &str = "broadcast_send_failures_total";
/// Subscription declarations applied (counter).
pub const SUBSCRIPTION_UPDATES_TOTAL: &str = "subscription_updates_total";
/// Inbound frames dropped as malformed (counter).
pub const MALFORMED_MESSAGES_TOTAL: &str = "malformed_messages_total";
/// Upstream fetch failures (counter, labels: topic).
pub const UPSTREAM_FAILURES_TOTAL: &str = "upstream_failures_total";
/// Source ticks skipped on stall (counter, labels: source).
pub const SOURCE_TICKS_SKIPPED_TOTAL: &str = "source_ticks_skipped_total";

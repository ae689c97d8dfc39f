//! `PulseServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::metrics::WS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::dispatcher::Dispatcher;
use crate::websocket::registry::ConnectionRegistry;
use crate::websocket::session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The Pulse hub server.
pub struct PulseServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<Dispatcher>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
}

impl PulseServer {
    /// Create a new server with an empty registry.
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.selective_subscriptions));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&registry),
            config.bundle_policy,
        ));
        Self {
            config: Arc::new(config),
            registry,
            dispatcher,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this recorder handle.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            registry: self.registry.clone(),
            shutdown: self.shutdown.clone(),
            config: self.config.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind and serve in a background task.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    /// Cancelling the shutdown token stops accepting, then closes every
    /// WebSocket connection.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local = listener.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let router = self.router();
        let token = self.shutdown.token();
        let registry = Arc::clone(&self.registry);
        let handle = tokio::spawn(async move {
            let on_shutdown = async move {
                token.cancelled().await;
                let closed = registry.shutdown().await;
                info!(closed, "closed websocket connections");
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(on_shutdown)
                .await
            {
                error!(error = %e, "server terminated with error");
            }
        });

        info!(addr = %local, "pulse server listening");
        Ok((local, handle))
    }

    /// The connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// The dispatcher sources broadcast through.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// The server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(
    State(state): State<AppState>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !state.config.enabled || state.shutdown.is_shutting_down() {
        counter!(WS_REJECTED_TOTAL, "reason" => "disabled").increment(1);
        return (StatusCode::SERVICE_UNAVAILABLE, "websocket broadcasting disabled").into_response();
    }
    let connections = state.registry.connection_count();
    if connections >= state.config.max_connections {
        counter!(WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        warn!(
            connections,
            max = state.config.max_connections,
            "rejecting websocket upgrade, at capacity"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    }

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let registry = state.registry.clone();
    let config = state.config.clone();
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| session::run_session(socket, registry, config))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.connection_count(),
        state.config.selective_subscriptions,
        state.config.enabled,
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            crate::metrics::render(handle),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

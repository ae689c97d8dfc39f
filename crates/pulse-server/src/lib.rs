//! # pulse-server
//!
//! The Pulse hub: an Axum WebSocket server that fans out topic-tagged
//! monitoring messages to many viewers, each receiving only the topics it
//! declared.
//!
//! - [`websocket`]: connection registry, dispatcher, per-connection session
//! - [`sources`]: sampling ticker and change detectors that feed the dispatcher
//! - [`server`]: router (`/ws`, `/health`, `/metrics`) and listener
//! - [`shutdown`]: cancellation and task draining

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod sources;
pub mod websocket;

pub use config::ServerConfig;
pub use errors::ServerError;
pub use server::PulseServer;

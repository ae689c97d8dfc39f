//! WebSocket connection management and selective fan-out.

pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod session;

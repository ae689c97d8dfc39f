//! # pulse-client
//!
//! Viewer side of the Pulse hub.
//!
//! - [`controller`]: reconnecting WebSocket controller with backoff
//! - [`fallback`]: REST polling while the push channel is down
//! - [`store`]: latest value per topic, shared by push and pull
//! - [`pull`]: `reqwest`-backed [`PullSource`](pulse_core::PullSource)
//! - [`live`]: everything wired together

#![deny(unsafe_code)]

pub mod controller;
pub mod errors;
pub mod fallback;
pub mod live;
pub mod pull;
pub mod state;
pub mod store;

pub use controller::{ConnectionController, ControllerConfig};
pub use errors::ClientError;
pub use fallback::FallbackCoordinator;
pub use live::LiveClient;
pub use pull::HttpPullSource;
pub use state::ConnectionState;
pub use store::{LatestStore, Origin, PullTicket, Update};

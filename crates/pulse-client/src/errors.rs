//! Client error types.

use pulse_core::PulseError;
use thiserror::Error;

/// Errors surfaced by the client's public API.
///
/// Transport failures while running are not errors here: the controller
/// absorbs them into its reconnect loop.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The controller was shut down and cannot be restarted.
    #[error("client has been shut down")]
    Closed,
    /// Topic or path configuration was invalid.
    #[error("invalid client configuration: {0}")]
    Config(#[from] PulseError),
    /// The HTTP client could not be built.
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

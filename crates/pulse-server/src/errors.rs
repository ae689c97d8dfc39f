//! Server error types.

use pulse_core::PulseError;
use thiserror::Error;

/// Errors that stop the hub from starting.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving the listener failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Source configuration referenced a bad topic.
    #[error("invalid source configuration: {0}")]
    Config(#[from] PulseError),
}

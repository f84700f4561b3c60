/*!
Error types for client construction and transports.

None of these escape `perform_communication()`: a running client folds
transport failures into its link state.
*/

use thiserror::Error;

/// Result type for client construction
pub type Result<T> = std::result::Result<T, ClientError>;

/// Failures of the byte transport underneath a client
#[derive(Error, Debug)]
pub enum TransportError {
    /// The link is not open; bytes cannot be queued
    #[error("transport closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The background I/O thread could not be started
    #[error("failed to start I/O worker: {0}")]
    Worker(String),
}

/// Failures building a client from its configuration
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid configuration for telescope '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ClientError {
    pub fn invalid_config(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/*!
Common error types for the telescope control components.
*/

use thiserror::Error;

/// Common result type used throughout the shared library
pub type Result<T> = std::result::Result<T, SharedError>;

/// Error type for codec and coordinate operations
#[derive(Error, Debug)]
pub enum SharedError {
    /// A wire frame that cannot be decoded
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// Coordinate text or values out of range
    #[error("Invalid coordinate data: {0}")]
    InvalidCoordinates(String),

    /// A device reply that does not match the outstanding command
    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SharedError {
    /// Create a new malformed frame error
    pub fn malformed_frame(msg: impl Into<String>) -> Self {
        Self::MalformedFrame(msg.into())
    }

    /// Create a new invalid coordinates error
    pub fn invalid_coordinates(msg: impl Into<String>) -> Self {
        Self::InvalidCoordinates(msg.into())
    }

    /// Create a new unexpected reply error
    pub fn unexpected_reply(msg: impl Into<String>) -> Self {
        Self::UnexpectedReply(msg.into())
    }
}

//! Error types for courier

use serde_json::Value;
use thiserror::Error;

/// The main error type for courier operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// The outgoing payload did not resolve to a message type
    #[error("messageType is undefined")]
    MissingMessageType,

    /// No reply arrived before the invocation's timer fired
    #[error("Request timed out after {timeout_ms}ms: {message_type} (request id: {})", .request_id.as_deref().unwrap_or("-"))]
    Timeout {
        message_type: String,
        request_id: Option<String>,
        timeout_ms: u64,
        /// The caller's default response, kept when default responses are disabled
        fallback: Option<Value>,
    },

    /// Transport send/subscribe failures
    #[error("Transport error: {0}")]
    Transport(String),

    /// The pending invocation was dropped before it settled
    #[error("Request cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    /// Whether this error is the timeout indicator of an invocation
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

/// A specialized Result type for courier operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

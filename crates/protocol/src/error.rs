//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering every way a Bot API exchange can fail.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Serialization errors
    /// Failed to serialize a request body.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize a response body.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Transport errors
    /// The request never produced a response (DNS, TLS, connect, reset).
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// The request did not complete in time.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The server answered with a status other than 200.
    #[error("unexpected HTTP status: {status}")]
    UnexpectedStatus {
        /// Status code returned by the server.
        status: u16,
    },

    /// The server answered `ok: false`.
    #[error("bot API error: {0}")]
    Api(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut => ProtocolError::Timeout(err.to_string()),
            _ => ProtocolError::ConnectionFailed(err.to_string()),
        }
    }
}

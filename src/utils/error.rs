//! Error types for `solana-log-stream` operations.
//!
//! This module defines a single error enumeration using `thiserror` so that
//! configuration problems, transport failures and terminal retry exhaustion
//! are reported through one type.

use thiserror::Error;

/// Custom error type for log-stream operations.
///
/// Only configuration errors and the terminal outcome of a connector are ever
/// returned to callers. Transport and protocol errors are handled inside the
/// supervisor loop and only surface as the `last_error` of
/// [`LogStreamError::RetryExhausted`].
#[derive(Debug, Error)]
pub enum LogStreamError {
    /// Errors related to configuration.
    ///
    /// Raised synchronously by the config builder and by
    /// `LogStreamConnector::new`. Never retried.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connection error (handshake, send or receive failure on the WebSocket).
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A bounded wait (handshake or subscription acknowledgment) elapsed.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// The endpoint answered the subscribe request with a JSON-RPC error.
    #[error("Subscription rejected (code {code}): {message}")]
    SubscriptionRejected {
        /// JSON-RPC error code.
        code: i64,
        /// Error message reported by the endpoint.
        message: String,
    },

    /// A payload could not be parsed or was not understood.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The registered event handler reported a failure.
    #[error("Handler error: {0}")]
    HandlerError(String),

    /// JSON serialization failures.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic errors for operations that don't fit other categories.
    #[error("Internal error: {0}")]
    InternalError(String),

    /// All reconnection attempts were exhausted.
    ///
    /// Contains the number of connection attempts made and the last error message.
    #[error("Retry exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted {
        /// Total number of connection attempts (initial attempt + retries).
        attempts: u32,
        /// String representation of the last transport error.
        last_error: String,
    },
}

/// Type alias for Results using `LogStreamError`.
pub type Result<T> = std::result::Result<T, LogStreamError>;

impl From<tokio_tungstenite::tungstenite::Error> for LogStreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::Url(e) => LogStreamError::ConfigError(format!("Invalid endpoint URL: {e}")),
            WsError::HttpFormat(e) => {
                LogStreamError::ConfigError(format!("Invalid endpoint URL: {e}"))
            }
            other => LogStreamError::ConnectionError(other.to_string()),
        }
    }
}

//! Error types for AIOrg
//!
//! This module defines the error taxonomy for the chat core and the
//! configuration layer, using `thiserror` for ergonomic error handling.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Main error type for AIOrg operations
///
/// Transport and parse failures are delivered to the consumer through
/// [`crate::chat::ChatEvents::on_error`]; `InvalidState` is returned
/// synchronously to the caller of the offending method. Every variant is
/// `Clone` so that a failure can be reported to both the log and the consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AiorgError {
    /// The model server refused the connection or could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// No complete line arrived within the idle window
    #[error("Timed out after {}s without data from the model server", .0.as_secs_f64())]
    Timeout(Duration),

    /// The server answered with a non-2xx status before streaming began
    #[error("Server error {status}: {body}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// A streamed line was malformed or violated the record schema
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The consumer fell behind and the dispatch queue filled up
    #[error("Consumer overloaded: more than {capacity} chunks pending delivery")]
    Overload {
        /// Configured queue capacity that was exceeded
        capacity: usize,
    },

    /// The request was aborted explicitly
    #[error("Request cancelled")]
    Cancelled,

    /// API misuse, e.g. `send` while a send is in flight
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// `send` was given blank text
    #[error("Cannot send an empty message")]
    EmptyMessage,

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AiorgError {
    /// Returns the fieldless kind of this error
    ///
    /// # Examples
    ///
    /// ```
    /// use aiorg::error::{AiorgError, ErrorKind};
    ///
    /// let error = AiorgError::Protocol("not-json".to_string());
    /// assert_eq!(error.kind(), ErrorKind::Protocol);
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Server { .. } => ErrorKind::Server,
            Self::Protocol(_) => ErrorKind::Protocol,
            Self::Overload { .. } => ErrorKind::Overload,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::EmptyMessage => ErrorKind::EmptyMessage,
            Self::Config(_) => ErrorKind::Config,
        }
    }
}

/// Error category handed to consumers alongside a human readable message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Timeout,
    Server,
    Protocol,
    Overload,
    Cancelled,
    InvalidState,
    EmptyMessage,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connection => "ConnectionError",
            Self::Timeout => "Timeout",
            Self::Server => "ServerError",
            Self::Protocol => "ProtocolError",
            Self::Overload => "OverloadError",
            Self::Cancelled => "Cancelled",
            Self::InvalidState => "InvalidState",
            Self::EmptyMessage => "EmptyMessage",
            Self::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

/// Result type for the chat core, carrying a typed [`AiorgError`]
pub type ChatResult<T> = std::result::Result<T, AiorgError>;

/// Result type alias for application-level operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;

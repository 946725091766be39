//! Error types for the resilient WebSocket adapter.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use resilient_ws::{Adapter, Result};
//!
//! async fn example(adapter: &Adapter) -> Result<()> {
//!     adapter.connect().await?;
//!     adapter.send("hello")?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`] |
//! | Connection | [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::Transport`] |
//! | Liveness | [`Error::HeartbeatTimeout`] |
//! | Terminal | [`Error::MaxReconnectAttempts`], [`Error::UnsupportedTransport`] |
//! | Sending | [`Error::SendWhileDisconnected`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;
use url::ParseError;

use crate::adapter::ConnectionState;
use crate::transport::Platform;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when adapter configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// URL could not be parsed.
    #[error("Invalid URL: {0}")]
    Url(#[from] ParseError),

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// The transport did not open within the connection timeout.
    ///
    /// Recoverable by calling `connect()` again.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The underlying transport reported an error.
    ///
    /// Does not by itself change the connection state.
    #[error("Transport error: {message}")]
    Transport {
        /// Description reported by the transport.
        message: String,
    },

    /// The connection closed before a pending operation completed.
    ///
    /// Returned to pending `connect()` futures when the transport closes
    /// before opening or when `disconnect()` is called.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Liveness Errors
    // ========================================================================
    /// No heartbeat acknowledgment arrived in time.
    ///
    /// The adapter force-closes the transport after reporting this.
    #[error("Heartbeat timeout after {timeout_ms}ms")]
    HeartbeatTimeout {
        /// Milliseconds waited for the acknowledgment.
        timeout_ms: u64,
    },

    // ========================================================================
    // Terminal Errors
    // ========================================================================
    /// Automatic reconnection gave up.
    ///
    /// The adapter stays closed until `connect()` is called explicitly.
    #[error("Maximum reconnect attempts reached ({attempts})")]
    MaxReconnectAttempts {
        /// Number of attempts that were made.
        attempts: u32,
    },

    /// The platform cannot provide any transport.
    #[error("No transport available for platform: {platform}")]
    UnsupportedTransport {
        /// The platform that was asked for a transport.
        platform: Platform,
    },

    // ========================================================================
    // Sending Errors
    // ========================================================================
    /// `send()` was called while not open and queueing is disabled.
    #[error("Cannot send while {state} and message queueing is disabled")]
    SendWhileDisconnected {
        /// State of the adapter at the time of the call.
        state: ConnectionState,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a transport error.
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a heartbeat timeout error.
    #[inline]
    pub fn heartbeat_timeout(timeout_ms: u64) -> Self {
        Self::HeartbeatTimeout { timeout_ms }
    }

    /// Creates a max reconnect attempts error.
    #[inline]
    pub fn max_reconnect_attempts(attempts: u32) -> Self {
        Self::MaxReconnectAttempts { attempts }
    }

    /// Creates an unsupported transport error.
    #[inline]
    pub fn unsupported_transport(platform: Platform) -> Self {
        Self::UnsupportedTransport { platform }
    }

    /// Creates a send-while-disconnected error.
    #[inline]
    pub fn send_while_disconnected(state: ConnectionState) -> Self {
        Self::SendWhileDisconnected { state }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::HeartbeatTimeout { .. }
        )
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Transport { .. }
                | Self::HeartbeatTimeout { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if no further automatic recovery will happen.
    ///
    /// Terminal errors leave the adapter closed until the caller acts.
    #[inline]
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::MaxReconnectAttempts { .. } | Self::UnsupportedTransport { .. }
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::Transport { .. }
                | Self::HeartbeatTimeout { .. }
                | Self::SendWhileDisconnected { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::transport("connection refused");
        assert_eq!(err.to_string(), "Transport error: connection refused");
    }

    #[test]
    fn test_send_while_disconnected_display() {
        let err = Error::send_while_disconnected(ConnectionState::Connecting);
        assert_eq!(
            err.to_string(),
            "Cannot send while connecting and message queueing is disabled"
        );
    }

    #[test]
    fn test_unsupported_transport_display() {
        let err = Error::unsupported_transport(Platform::Server);
        assert_eq!(err.to_string(), "No transport available for platform: server");
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::connection_timeout(50).is_timeout());
        assert!(Error::heartbeat_timeout(200).is_timeout());
        assert!(!Error::transport("test").is_timeout());
    }

    #[test]
    fn test_is_terminal() {
        assert!(Error::max_reconnect_attempts(5).is_terminal());
        assert!(Error::unsupported_transport(Platform::Server).is_terminal());
        assert!(!Error::connection_timeout(10).is_terminal());
        assert!(!Error::ConnectionClosed.is_terminal());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::transport("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::connection_timeout(1000).is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::connection_timeout(1000).is_recoverable());
        assert!(!Error::max_reconnect_attempts(3).is_recoverable());
        assert!(!Error::config("test").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::ConnectionRefused, "refused");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_url_error() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::Url(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}

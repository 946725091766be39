//! Resilient WebSocket - Self-healing persistent connection client.
//!
//! This library manages a single logical bidirectional connection over a
//! pluggable transport, keeping it alive across network failures.
//!
//! # Architecture
//!
//! The adapter is a transport-agnostic state machine:
//!
//! - **Transport (pluggable)**: Opens sockets, emits open/close/error/message events
//! - **Adapter (core)**: Owns connection state and reacts to transport events
//!
//! Key design principles:
//!
//! - One active transport at a time; replaced instances are ignored by identity
//! - Every timer is a tracked tokio task, cancelled on any state exit
//! - Callbacks never run while internal state is locked
//! - No wire protocol of its own (text passes through, JSON is encoded)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use resilient_ws::{Adapter, Platform, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let adapter = Adapter::builder("ws://localhost:8080/socket")
//!         .platform(Platform::Native)
//!         .heartbeat_interval(Duration::from_secs(15))
//!         .on_message(|value| println!("received {value}"))
//!         .on_reconnecting(|attempt| println!("reconnecting ({attempt})"))
//!         .build()?;
//!
//!     adapter.connect().await?;
//!     adapter.send_json(&serde_json::json!({ "type": "subscribe", "channel": "news" }))?;
//!
//!     tokio::time::sleep(Duration::from_secs(60)).await;
//!     adapter.disconnect_normal();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | [`Adapter`] state machine, queue, heartbeat, reconnection |
//! | [`config`] | [`AdapterConfig`], [`Callbacks`], [`AdapterBuilder`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Payload encoding and close codes |
//! | [`transport`] | Transport traits, implementations, and selection |
//!
//! # Features
//!
//! - **Automatic reconnection**: Exponential backoff with a configurable cap and limit
//! - **Heartbeat**: Ping/pong liveness detection with forced close on timeout
//! - **Offline queue**: Bounded FIFO buffering while disconnected, flushed in order
//! - **Platform selection**: Native socket or standard WebSocket transport

// ============================================================================
// Modules
// ============================================================================

/// Connection state machine and its collaborators.
///
/// - [`Adapter`] - Public handle
/// - [`ConnectionState`] - Lifecycle state
/// - [`MessageQueue`] - Offline buffer
pub mod adapter;

/// Adapter configuration.
///
/// Use [`Adapter::builder()`] to create a configured adapter.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Payload encoding and close semantics.
pub mod protocol;

/// Transport layer.
///
/// Traits the adapter talks to, the tungstenite-backed implementations,
/// and platform-based selection.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Adapter types
pub use adapter::{Adapter, ConnectionState, QueuedMessage};

// Configuration types
pub use config::{AdapterBuilder, AdapterConfig, Callbacks};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::TransportId;

// Protocol types
pub use protocol::{CloseEvent, Payload};

// Transport types
pub use transport::{
    Platform, Transport, TransportConnector, TransportEvent, TransportFactory, TransportKind,
};

//! Resilient connection adapter.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Adapter`] | Public handle and connection state machine |
//! | [`ConnectionState`] | Lifecycle state |
//! | [`MessageQueue`] | Bounded outbound buffer used while not open |
//! | [`HeartbeatMonitor`] | Probe/ack liveness bookkeeping |
//! | [`ReconnectionScheduler`] | Exponential backoff and attempt limit |
//!
//! # Lifecycle
//!
//! ```text
//! connect() ──► Connecting ──Open──► Open ──(heartbeat starts, queue flushes)
//!                   │                  │
//!                   │ timeout          │ missed pong / remote close
//!                   ▼                  ▼
//!                Closing ──Close──► Closed ──(unless disconnect())──► backoff ──► Connecting
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Connection state machine.
pub mod core;

/// Heartbeat liveness monitor.
pub mod heartbeat;

/// Bounded outbound message queue.
pub mod queue;

/// Exponential-backoff reconnection scheduler.
pub mod reconnect;

/// Connection lifecycle state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::Adapter;
pub use heartbeat::HeartbeatMonitor;
pub use queue::{MessageQueue, QueuedMessage};
pub use reconnect::{ReconnectDecision, ReconnectionScheduler, delay_for_attempt};
pub use state::ConnectionState;

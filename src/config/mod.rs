//! Adapter configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`AdapterConfig`] | Immutable settings with defaults and validation |
//! | [`Callbacks`] | Optional lifecycle callbacks |
//! | [`AdapterBuilder`] | Fluent builder combining both with transport selection |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for adapters.
pub mod builder;

/// Lifecycle callbacks.
pub mod callbacks;

/// Settings and defaults.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::AdapterBuilder;
pub use callbacks::Callbacks;
pub(crate) use callbacks::Notification;
pub use options::{
    AdapterConfig, DEFAULT_CONNECTION_TIMEOUT, DEFAULT_HEARTBEAT_INTERVAL,
    DEFAULT_HEARTBEAT_MESSAGE, DEFAULT_HEARTBEAT_TIMEOUT, DEFAULT_MAX_QUEUE_SIZE,
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_MAX_RECONNECT_DELAY, DEFAULT_PONG_MESSAGE,
    DEFAULT_RECONNECT_DELAY,
};

//! Message encoding and close semantics.
//!
//! The adapter rides on an existing full-duplex message transport and does
//! not define a wire protocol. This module only covers how payloads are
//! turned into text and back, and the close codes the adapter uses.
//!
//! # Heartbeat Wire Contract
//!
//! | Direction | Default marker | Matching |
//! |-----------|----------------|----------|
//! | Outbound probe | `ping` | sent as raw text |
//! | Inbound ack | `pong` | exact equality after decode |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `close` | Close codes and [`CloseEvent`] |
//! | `payload` | [`Payload`] encoding and inbound decoding |

// ============================================================================
// Submodules
// ============================================================================

/// Close codes and close event details.
pub mod close;

/// Payload encoding and decoding.
pub mod payload;

// ============================================================================
// Re-exports
// ============================================================================

pub use close::{
    ABNORMAL_CLOSURE, CloseEvent, GOING_AWAY, HEARTBEAT_TIMEOUT_CLOSE, NORMAL_CLOSURE,
    NORMAL_CLOSURE_REASON,
};
pub use payload::{Payload, decode, is_marker};

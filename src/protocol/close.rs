//! Close codes and close event details.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Normal closure (RFC 6455 §7.4.1).
pub const NORMAL_CLOSURE: u16 = 1000;

/// Endpoint is going away.
pub const GOING_AWAY: u16 = 1001;

/// Close frame carried no status code. Never sent on the wire.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Connection dropped without a close frame. Never sent on the wire.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Application code used when the heartbeat deadline expires.
pub const HEARTBEAT_TIMEOUT_CLOSE: u16 = 4000;

/// Default reason sent by `disconnect()`.
pub const NORMAL_CLOSURE_REASON: &str = "Normal closure";

// ============================================================================
// CloseEvent
// ============================================================================

/// Details of a transport close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseEvent {
    /// Close code.
    pub code: u16,
    /// Close reason, possibly empty.
    pub reason: String,
    /// Whether the closing handshake completed.
    pub was_clean: bool,
}

impl CloseEvent {
    /// Creates a close event.
    #[inline]
    pub fn new(code: u16, reason: impl Into<String>, was_clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean,
        }
    }

    /// Creates an abnormal close event (code 1006, not clean).
    #[inline]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(ABNORMAL_CLOSURE, reason, false)
    }

    /// Returns `true` for a normal closure code.
    #[inline]
    #[must_use]
    pub fn is_normal(&self) -> bool {
        self.code == NORMAL_CLOSURE
    }
}

impl fmt::Display for CloseEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "code {} ({})", self.code, self.reason)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abnormal() {
        let event = CloseEvent::abnormal("connection reset");
        assert_eq!(event.code, ABNORMAL_CLOSURE);
        assert!(!event.was_clean);
        assert!(!event.is_normal());
    }

    #[test]
    fn test_display() {
        assert_eq!(CloseEvent::new(1000, "", true).to_string(), "code 1000");
        assert_eq!(
            CloseEvent::new(4000, "Heartbeat timeout", false).to_string(),
            "code 4000 (Heartbeat timeout)"
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let json = serde_json::to_value(CloseEvent::new(1000, "bye", true)).unwrap();
        assert_eq!(json["wasClean"], true);
        assert_eq!(json["code"], 1000);
    }
}

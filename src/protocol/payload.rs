//! Outbound payload encoding and inbound message decoding.
//!
//! The adapter does not define a wire protocol of its own. Outbound
//! payloads are either passed through as text or encoded as JSON, and
//! inbound text is decoded as JSON when possible.
//!
//! # Format
//!
//! | Outbound | On the wire |
//! |----------|-------------|
//! | `Payload::Text("ping")` | `ping` |
//! | `Payload::Json({"a": 1})` | `{"a":1}` |
//!
//! | Inbound | Decoded |
//! |---------|---------|
//! | `{"a":1}` | `Value::Object` |
//! | `pong` | `Value::String("pong")` (not valid JSON, kept raw) |
//! | `"pong"` | `Value::String("pong")` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Serialize;
use serde_json::{Value, from_str, to_string, to_value};

use crate::error::Result;

// ============================================================================
// Payload
// ============================================================================

/// An outbound message.
///
/// Strings pass through unchanged; structured values are encoded as JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw text sent as-is.
    Text(String),
    /// Structured value sent as JSON text.
    Json(Value),
}

impl Payload {
    /// Creates a JSON payload from any serializable value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self::Json(to_value(value)?))
    }

    /// Encodes the payload as wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if JSON encoding fails.
    pub fn encode(&self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Json(value) => Ok(to_string(value)?),
        }
    }

    /// Consumes the payload and encodes it as wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if JSON encoding fails.
    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Json(value) => Ok(to_string(&value)?),
        }
    }

    /// Returns `true` if this is a text payload.
    #[inline]
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Json(value) => write!(f, "{value}"),
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decodes inbound text.
///
/// Attempts a JSON decode first and falls back to the raw string.
#[must_use]
pub fn decode(text: &str) -> Value {
    from_str::<Value>(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}

/// Returns `true` if a decoded value is the given marker string.
#[inline]
#[must_use]
pub fn is_marker(value: &Value, marker: &str) -> bool {
    matches!(value, Value::String(s) if s == marker)
}

// ============================================================================
// Tests
// ============================================================================

//! Platform-based transport selection.
//!
//! The factory is a pure function of the [`Platform`] it is given. The
//! adapter never inspects its environment to choose a transport; callers
//! say which platform they run on.
//!
//! # Selection Table
//!
//! | Platform | Selected | Available |
//! |----------|----------|-----------|
//! | `Browser` | `WebSocket` | `WebSocket` |
//! | `Native` | `NativeSocket` | `NativeSocket`, `WebSocket` |
//! | `Server` | unsupported | none |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::{NativeConnector, TransportConnector, WebSocketConnector};

// ============================================================================
// Platform
// ============================================================================

/// Runtime the adapter is running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Browser-style runtime with a standard WebSocket.
    Browser,
    /// Native application runtime (desktop or mobile) with raw sockets.
    Native,
    /// Server-only runtime without a client socket capability.
    Server,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Browser => "browser",
            Self::Native => "native",
            Self::Server => "server",
        };
        f.write_str(name)
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "browser" | "web" => Ok(Self::Browser),
            "native" | "mobile" | "desktop" => Ok(Self::Native),
            "server" | "node" => Ok(Self::Server),
            other => Err(Error::config(format!("Unknown platform: {other}"))),
        }
    }
}

// ============================================================================
// TransportKind
// ============================================================================

/// Kind of concrete transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Standard WebSocket transport.
    WebSocket,
    /// Native socket transport.
    NativeSocket,
}

impl TransportKind {
    /// Creates a connector for this kind.
    #[must_use]
    pub fn connector(self) -> Arc<dyn TransportConnector> {
        match self {
            Self::WebSocket => Arc::new(WebSocketConnector::new()),
            Self::NativeSocket => Arc::new(NativeConnector::new()),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WebSocket => "websocket",
            Self::NativeSocket => "native_socket",
        };
        f.write_str(name)
    }
}

// ============================================================================
// TransportFactory
// ============================================================================

/// Selects and constructs transports for a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportFactory {
    /// Platform to select for.
    platform: Platform,
}

impl TransportFactory {
    /// Creates a factory for the given platform.
    #[inline]
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Returns the platform this factory selects for.
    #[inline]
    #[must_use]
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// Returns the preferred transport kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedTransport`] for server-only platforms.
    pub fn select(&self) -> Result<TransportKind> {
        match self.platform {
            Platform::Browser => Ok(TransportKind::WebSocket),
            Platform::Native => Ok(TransportKind::NativeSocket),
            Platform::Server => Err(Error::unsupported_transport(self.platform)),
        }
    }

    /// Creates the preferred connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedTransport`] for server-only platforms.
    pub fn create(&self) -> Result<Arc<dyn TransportConnector>> {
        let kind = self.select()?;
        debug!(platform = %self.platform, %kind, "Transport selected");
        Ok(kind.connector())
    }

    /// Creates the preferred connector, falling back to the standard
    /// WebSocket transport if the platform cannot provide one.
    #[must_use]
    pub fn create_with_fallback(&self) -> Arc<dyn TransportConnector> {
        match self.create() {
            Ok(connector) => connector,
            Err(e) => {
                warn!(
                    platform = %self.platform,
                    error = %e,
                    "Falling back to standard WebSocket transport"
                );
                TransportKind::WebSocket.connector()
            }
        }
    }

    /// Lists the transport kinds usable on this platform, preferred first.
    #[must_use]
    pub fn available(&self) -> Vec<TransportKind> {
        match self.platform {
            Platform::Browser => vec![TransportKind::WebSocket],
            Platform::Native => vec![TransportKind::NativeSocket, TransportKind::WebSocket],
            Platform::Server => Vec::new(),
        }
    }

    /// Returns `true` if the given kind is usable on this platform.
    #[inline]
    #[must_use]
    pub fn is_available(&self, kind: TransportKind) -> bool {
        self.available().contains(&kind)
    }
}

// ============================================================================
// Tests
// ============================================================================

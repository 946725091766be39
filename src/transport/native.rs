//! Native socket transport.
//!
//! Dials the TCP socket directly with tokio, applies socket options, and
//! runs the WebSocket client handshake over that stream. Only plain `ws://`
//! URLs are supported.

// ============================================================================
// Imports
// ============================================================================

use tokio::net::TcpStream;
use tokio_tungstenite::client_async;
use tracing::{debug, trace};
use url::{Host, Url};

use crate::error::{Error, Result};

use super::connection::{SocketTransport, client_request};
use super::{EventSink, Transport, TransportConnector};

// ============================================================================
// Constants
// ============================================================================

/// Port used when the URL does not name one.
const DEFAULT_WS_PORT: u16 = 80;

// ============================================================================
// NativeConnector
// ============================================================================

/// Connector for the native socket transport.
#[derive(Debug, Clone, Copy)]
pub struct NativeConnector {
    /// Disable Nagle's algorithm on the dialed socket.
    nodelay: bool,
}

impl Default for NativeConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeConnector {
    /// Creates a connector with `TCP_NODELAY` enabled.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { nodelay: true }
    }

    /// Sets whether `TCP_NODELAY` is enabled.
    #[inline]
    #[must_use]
    pub const fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Returns whether `TCP_NODELAY` is enabled.
    #[inline]
    #[must_use]
    pub const fn nodelay(&self) -> bool {
        self.nodelay
    }
}

/// Extracts a dialable host string from the URL.
fn dial_host(url: &Url) -> Result<String> {
    match url.host() {
        Some(Host::Domain(domain)) => Ok(domain.to_owned()),
        Some(Host::Ipv4(addr)) => Ok(addr.to_string()),
        Some(Host::Ipv6(addr)) => Ok(addr.to_string()),
        None => Err(Error::config(format!("URL has no host: {url}"))),
    }
}

impl TransportConnector for NativeConnector {
    fn name(&self) -> &'static str {
        "native"
    }

    fn open(
        &self,
        url: &Url,
        sub_protocols: &[String],
        events: EventSink,
    ) -> Result<Box<dyn Transport>> {
        if url.scheme() != "ws" {
            return Err(Error::config(format!(
                "Native transport supports only ws:// URLs, got {}://",
                url.scheme()
            )));
        }

        let host = dial_host(url)?;
        let port = url.port_or_known_default().unwrap_or(DEFAULT_WS_PORT);
        let request = client_request(url, sub_protocols)?;
        let nodelay = self.nodelay;

        debug!(%host, port, nodelay, "Opening native transport");

        let handshake = async move {
            let stream = TcpStream::connect((host.as_str(), port)).await?;
            stream.set_nodelay(nodelay)?;
            trace!(peer = ?stream.peer_addr().ok(), "TCP connection established");

            let (ws_stream, _response) = client_async(request, stream).await?;
            Ok::<_, Error>(ws_stream)
        };

        Ok(Box::new(SocketTransport::spawn(self.name(), handshake, events)))
    }
}

// ============================================================================
// Tests
// ============================================================================

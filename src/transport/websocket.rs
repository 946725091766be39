//! Standard WebSocket transport.
//!
//! Opens connections with `tokio_tungstenite::connect_async`, which handles
//! DNS resolution and the TCP dial itself. This is the transport every
//! platform with socket support can use, and the one the factory falls
//! back to.

// ============================================================================
// Imports
// ============================================================================

use tokio_tungstenite::connect_async;
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

use super::connection::{SocketTransport, client_request};
use super::{EventSink, Transport, TransportConnector};

// ============================================================================
// WebSocketConnector
// ============================================================================

/// Connector for the standard WebSocket transport.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Creates a new connector.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl TransportConnector for WebSocketConnector {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn open(
        &self,
        url: &Url,
        sub_protocols: &[String],
        events: EventSink,
    ) -> Result<Box<dyn Transport>> {
        let request = client_request(url, sub_protocols)?;

        debug!(%url, protocols = ?sub_protocols, "Opening WebSocket transport");

        let handshake = async move {
            let (ws_stream, response) = connect_async(request).await?;
            trace!(status = %response.status(), "WebSocket upgrade response");
            Ok::<_, Error>(ws_stream)
        };

        Ok(Box::new(SocketTransport::spawn(self.name(), handshake, events)))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::TransportEvent;

    #[tokio::test]
    async fn test_refused_connection_reports_error_then_close() {
        // Bind then drop to get a port with nothing listening
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = Url::parse(&format!("ws://127.0.0.1:{port}")).unwrap();
        let (events, mut rx) = EventSink::channel();
        let _transport = WebSocketConnector::new()
            .open(&url, &[], events)
            .expect("open should start");

        assert!(matches!(rx.recv().await, Some(TransportEvent::Error(_))));
        assert!(matches!(rx.recv().await, Some(TransportEvent::Close(c)) if !c.was_clean));
    }

    #[test]
    fn test_name() {
        assert_eq!(WebSocketConnector::new().name(), "websocket");
    }
}

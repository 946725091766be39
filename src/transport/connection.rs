//! Socket event loop shared by the tungstenite-based transports.
//!
//! # Event Loop
//!
//! Each [`SocketTransport`] spawns a tokio task that handles:
//!
//! - The client handshake (abortable by a close request)
//! - Incoming frames from the server (text, binary, close)
//! - Outgoing messages and close requests from the adapter
//! - Translating all of the above into [`TransportEvent`](super::TransportEvent)s

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{CloseEvent, close::NO_STATUS_RECEIVED};

use super::{EventSink, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for writing our close frame.
const CLOSE_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Send a text frame.
    Send(String),
    /// Send a close frame and stop.
    Close { code: u16, reason: String },
}

// ============================================================================
// SocketTransport
// ============================================================================

/// Transport backed by a tungstenite WebSocket stream.
///
/// The handle only holds a command channel; all I/O happens in the
/// spawned event loop task.
pub struct SocketTransport {
    /// Channel for sending commands to the event loop.
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    /// Connector name for logs.
    name: &'static str,
}

impl SocketTransport {
    /// Spawns the event loop around a pending handshake.
    ///
    /// `handshake` resolves to an established stream; until then, a close
    /// request aborts it.
    pub(crate) fn spawn<F, S>(name: &'static str, handshake: F, events: EventSink) -> Self
    where
        F: Future<Output = Result<WebSocketStream<S>>> + Send + 'static,
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_event_loop(name, handshake, command_rx, events));

        Self { command_tx, name }
    }
}

impl Transport for SocketTransport {
    fn send(&self, text: String) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Send(text))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self, code: u16, reason: &str) {
        trace!(transport = self.name, code, reason, "Close requested");
        let _ = self.command_tx.send(SocketCommand::Close {
            code,
            reason: reason.to_owned(),
        });
    }
}

// ============================================================================
// Handshake Helpers
// ============================================================================

/// Builds the client handshake request, advertising sub-protocols if any.
pub(crate) fn client_request(url: &Url, sub_protocols: &[String]) -> Result<Request> {
    let mut request = url.as_str().into_client_request()?;

    if !sub_protocols.is_empty() {
        let value = HeaderValue::from_str(&sub_protocols.join(", "))
            .map_err(|e| Error::config(format!("Invalid sub-protocol list: {e}")))?;
        request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
    }

    Ok(request)
}

// ============================================================================
// Event Loop
// ============================================================================

/// Event loop that handles the handshake and WebSocket I/O.
async fn run_event_loop<F, S>(
    name: &'static str,
    handshake: F,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    events: EventSink,
) where
    F: Future<Output = Result<WebSocketStream<S>>> + Send + 'static,
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::pin!(handshake);

    let ws_stream = loop {
        tokio::select! {
            result = &mut handshake => {
                match result {
                    Ok(stream) => break stream,
                    Err(e) => {
                        debug!(transport = name, error = %e, "Handshake failed");
                        events.error(e.to_string());
                        events.close(CloseEvent::abnormal("Connection failed"));
                        return;
                    }
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Close { code, reason }) => {
                        debug!(transport = name, "Handshake aborted by close request");
                        events.close(CloseEvent::new(code, reason, false));
                        return;
                    }

                    Some(SocketCommand::Send(_)) => {
                        warn!(transport = name, "Dropping message sent before open");
                    }

                    None => {
                        debug!(transport = name, "Transport dropped during handshake");
                        events.close(CloseEvent::abnormal("Transport dropped"));
                        return;
                    }
                }
            }
        }
    };

    debug!(transport = name, "WebSocket handshake completed");
    events.open();

    let (mut ws_write, mut ws_read) = ws_stream.split();

    let close_event = loop {
        tokio::select! {
            // Incoming frames from the server
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        trace!(transport = name, len = text.len(), "Text frame received");
                        events.message(text.as_str());
                    }

                    Some(Ok(Message::Binary(data))) => {
                        match String::from_utf8(data.to_vec()) {
                            Ok(text) => {
                                events.message(text);
                            }
                            Err(_) => {
                                trace!(transport = name, len = data.len(), "Ignoring non-UTF-8 binary frame");
                            }
                        }
                    }

                    Some(Ok(Message::Close(frame))) => {
                        debug!(transport = name, ?frame, "WebSocket closed by remote");
                        let _ = timeout(CLOSE_WRITE_TIMEOUT, ws_write.flush()).await;
                        break match frame {
                            Some(frame) => {
                                CloseEvent::new(u16::from(frame.code), frame.reason.as_str(), true)
                            }
                            None => CloseEvent::new(NO_STATUS_RECEIVED, "", true),
                        };
                    }

                    Some(Err(e)) => {
                        debug!(transport = name, error = %e, "WebSocket read error");
                        events.error(e.to_string());
                        break CloseEvent::abnormal(e.to_string());
                    }

                    None => {
                        debug!(transport = name, "WebSocket stream ended");
                        break CloseEvent::abnormal("Stream ended");
                    }

                    // Ping/Pong are answered by tungstenite
                    _ => {}
                }
            }

            // Commands from the adapter
            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Send(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            debug!(transport = name, error = %e, "WebSocket write error");
                            events.error(e.to_string());
                            break CloseEvent::abnormal(e.to_string());
                        }
                    }

                    Some(SocketCommand::Close { code, reason }) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.clone().into(),
                        };
                        let sent = timeout(
                            CLOSE_WRITE_TIMEOUT,
                            ws_write.send(Message::Close(Some(frame))),
                        )
                        .await;
                        let was_clean = matches!(sent, Ok(Ok(())));
                        debug!(transport = name, code, was_clean, "Close frame sent");
                        break CloseEvent::new(code, reason, was_clean);
                    }

                    None => {
                        debug!(transport = name, "Transport handle dropped");
                        let _ = timeout(CLOSE_WRITE_TIMEOUT, ws_write.close()).await;
                        break CloseEvent::abnormal("Transport dropped");
                    }
                }
            }
        }
    };

    events.close(close_event);
    trace!(transport = name, "Event loop terminated");
}

// ============================================================================
// Tests
// ============================================================================

//! Transport layer.
//!
//! A transport is the underlying bidirectional message channel. The adapter
//! only sees it through two small traits, so each runtime can provide its
//! own implementation and tests can inject a fake one.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   open(url, protocols, sink)   ┌──────────────────┐
//! │     Adapter      │───────────────────────────────►│ TransportConnector│
//! │                  │                                └────────┬─────────┘
//! │  pump task  ◄────┼── TransportEvent (mpsc) ──┐             │ Box<dyn Transport>
//! │                  │                           │    ┌────────▼─────────┐
//! │  send / close ───┼──────────────────────────►└────│    Transport     │
//! └──────────────────┘                                └──────────────────┘
//! ```
//!
//! # Event Contract
//!
//! - `open` returns immediately; the outcome arrives as an event.
//! - A successful connection delivers [`TransportEvent::Open`].
//! - A failure delivers [`TransportEvent::Error`] followed by [`TransportEvent::Close`].
//! - `close()` must eventually deliver exactly one [`TransportEvent::Close`].
//! - Nothing is delivered after `Close`; [`EventSink`] enforces this.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Socket event loop shared by the tungstenite transports |
//! | `websocket` | Standard WebSocket transport (universal fallback) |
//! | `native` | Native socket transport (direct TCP dial) |
//! | `factory` | Platform-based transport selection |
//! | `mock` | Scriptable in-memory transport for tests |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::trace;
use url::Url;

use crate::error::Result;
use crate::protocol::CloseEvent;

// ============================================================================
// Submodules
// ============================================================================

/// Socket event loop shared by the tungstenite transports.
pub mod connection;

/// Platform-based transport selection.
pub mod factory;

/// Scriptable in-memory transport.
pub mod mock;

/// Native socket transport.
pub mod native;

/// Standard WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::SocketTransport;
pub use factory::{Platform, TransportFactory, TransportKind};
pub use mock::{MockBehavior, MockConnector, MockHandle};
pub use native::NativeConnector;
pub use websocket::WebSocketConnector;

// ============================================================================
// TransportEvent
// ============================================================================

/// Event emitted by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Connection is open and ready for traffic.
    Open,
    /// Connection closed. Always the last event.
    Close(CloseEvent),
    /// Transport-level error. Does not imply close.
    Error(String),
    /// Inbound text message.
    Message(String),
}

// ============================================================================
// EventSink
// ============================================================================

/// Sending half of a transport's event stream.
///
/// Cloneable; all clones share one closed flag so that no event is
/// delivered after the first `Close`.
#[derive(Clone)]
pub struct EventSink {
    /// Channel to the adapter's event pump.
    tx: mpsc::UnboundedSender<TransportEvent>,
    /// Set once `Close` has been emitted.
    closed: Arc<AtomicBool>,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl EventSink {
    /// Creates a sink over an existing channel.
    #[inline]
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Creates a sink together with its receiving half.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// Emits an event.
    ///
    /// Returns `false` if the event was dropped because the stream already
    /// closed or the receiver is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            trace!(?event, "Dropping event after close");
            return false;
        }

        if matches!(event, TransportEvent::Close(_))
            && self.closed.swap(true, Ordering::AcqRel)
        {
            return false;
        }

        self.tx.send(event).is_ok()
    }

    /// Emits [`TransportEvent::Open`].
    #[inline]
    pub fn open(&self) -> bool {
        self.emit(TransportEvent::Open)
    }

    /// Emits [`TransportEvent::Close`].
    #[inline]
    pub fn close(&self, event: CloseEvent) -> bool {
        self.emit(TransportEvent::Close(event))
    }

    /// Emits [`TransportEvent::Error`].
    #[inline]
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(message.into()))
    }

    /// Emits [`TransportEvent::Message`].
    #[inline]
    pub fn message(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(text.into()))
    }

    /// Returns `true` once `Close` has been emitted.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

// ============================================================================
// Traits
// ============================================================================

/// A live transport instance.
///
/// Both methods are non-blocking.
pub trait Transport: Send + Sync {
    /// Queues text for transmission.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport can no longer send.
    fn send(&self, text: String) -> Result<()>;

    /// Requests the connection be closed.
    ///
    /// The transport must eventually emit exactly one `Close` event.
    fn close(&self, code: u16, reason: &str);
}

/// Opens transport instances for one kind of runtime.
pub trait TransportConnector: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Starts opening a connection and returns immediately.
    ///
    /// Connection progress is reported through `events`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot even be attempted
    /// (for example an unsupported URL scheme).
    fn open(
        &self,
        url: &Url,
        sub_protocols: &[String],
        events: EventSink,
    ) -> Result<Box<dyn Transport>>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_delivers_in_order() {
        let (sink, mut rx) = EventSink::channel();
        assert!(sink.open());
        assert!(sink.message("hello"));
        assert!(sink.error("oops"));

        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Open);
        assert_eq!(
            rx.try_recv().unwrap(),
            TransportEvent::Message("hello".into())
        );
        assert_eq!(rx.try_recv().unwrap(), TransportEvent::Error("oops".into()));
    }

    #[test]
    fn test_sink_drops_everything_after_close() {
        let (sink, mut rx) = EventSink::channel();
        let clone = sink.clone();

        assert!(sink.close(CloseEvent::abnormal("gone")));
        assert!(!clone.close(CloseEvent::abnormal("again")));
        assert!(!clone.message("late"));
        assert!(sink.is_closed());

        assert!(matches!(rx.try_recv().unwrap(), TransportEvent::Close(_)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_sink_reports_dropped_receiver() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert!(!sink.message("nobody listening"));
    }
}

//! Mock transport for testing.
//!
//! Provides a scriptable, in-memory [`TransportConnector`] so that the
//! adapter's state machine can be driven deterministically without a
//! network.
//!
//! # Example
//!
//! ```
//! use resilient_ws::transport::{MockBehavior, MockConnector};
//!
//! // First attempt never opens, later attempts open immediately
//! let connector = MockConnector::new()
//!     .script([MockBehavior::Pending])
//!     .with_default(MockBehavior::Open);
//! assert_eq!(connector.open_count(), 0);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::CloseEvent;

use super::{EventSink, Transport, TransportConnector};

// ============================================================================
// MockBehavior
// ============================================================================

/// What a mock transport does when opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Emit `Open` right away.
    Open,
    /// Emit nothing; the test drives events by hand.
    Pending,
    /// Emit `Error(message)` followed by an abnormal `Close`.
    Fail(String),
}

// ============================================================================
// Types
// ============================================================================

/// Recorded state of one mock transport instance.
struct MockRecord {
    /// Event stream of this instance.
    events: EventSink,
    /// URL it was opened with.
    url: Url,
    /// Sub-protocols it was opened with.
    sub_protocols: Vec<String>,
    /// When it was opened.
    opened_at: Instant,
    /// Text passed to `send`.
    sent: Vec<String>,
    /// Arguments of the first `close` call.
    close_request: Option<(u16, String)>,
}

/// Shared connector state.
struct MockState {
    /// Behaviors consumed one per `open`.
    script: VecDeque<MockBehavior>,
    /// Behavior once the script is exhausted.
    default_behavior: MockBehavior,
    /// Whether `close` emits the `Close` event like a real transport.
    echo_close: bool,
    /// Sends allowed before `send` starts failing.
    send_budget: Option<usize>,
    /// Every transport opened so far.
    records: Vec<Arc<Mutex<MockRecord>>>,
}

// ============================================================================
// MockConnector
// ============================================================================

/// Scriptable connector producing in-memory transports.
///
/// Clones share state, so a test can keep one clone for inspection while
/// the adapter owns another.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockConnector")
            .field("opened", &state.records.len())
            .field("default_behavior", &state.default_behavior)
            .finish_non_exhaustive()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// Creates a connector whose transports open immediately.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                script: VecDeque::new(),
                default_behavior: MockBehavior::Open,
                echo_close: true,
                send_budget: None,
                records: Vec::new(),
            })),
        }
    }

    /// Sets the behavior used once the script is exhausted.
    #[must_use]
    pub fn with_default(self, behavior: MockBehavior) -> Self {
        self.state.lock().default_behavior = behavior;
        self
    }

    /// Queues behaviors for the next `open` calls, in order.
    #[must_use]
    pub fn script(self, behaviors: impl IntoIterator<Item = MockBehavior>) -> Self {
        self.state.lock().script.extend(behaviors);
        self
    }

    /// Sets whether `close` emits a `Close` event.
    #[must_use]
    pub fn echo_close(self, echo: bool) -> Self {
        self.state.lock().echo_close = echo;
        self
    }

    /// Makes `send` fail after `count` more successful sends.
    pub fn fail_sends_after(&self, count: usize) {
        self.state.lock().send_budget = Some(count);
    }

    /// Lets every later `send` succeed again.
    pub fn allow_sends(&self) {
        self.state.lock().send_budget = None;
    }

    /// Returns the number of transports opened so far.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().records.len()
    }

    /// Returns the instants at which transports were opened.
    #[must_use]
    pub fn open_times(&self) -> Vec<Instant> {
        self.state
            .lock()
            .records
            .iter()
            .map(|record| record.lock().opened_at)
            .collect()
    }

    /// Returns a handle to the `index`-th opened transport.
    #[must_use]
    pub fn transport(&self, index: usize) -> Option<MockHandle> {
        self.state
            .lock()
            .records
            .get(index)
            .map(|record| MockHandle {
                record: Arc::clone(record),
            })
    }

    /// Returns a handle to the most recently opened transport.
    #[must_use]
    pub fn last(&self) -> Option<MockHandle> {
        self.state.lock().records.last().map(|record| MockHandle {
            record: Arc::clone(record),
        })
    }
}

impl TransportConnector for MockConnector {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn open(
        &self,
        url: &Url,
        sub_protocols: &[String],
        events: EventSink,
    ) -> Result<Box<dyn Transport>> {
        let record = Arc::new(Mutex::new(MockRecord {
            events: events.clone(),
            url: url.clone(),
            sub_protocols: sub_protocols.to_vec(),
            opened_at: Instant::now(),
            sent: Vec::new(),
            close_request: None,
        }));

        let behavior = {
            let mut state = self.state.lock();
            state.records.push(Arc::clone(&record));
            state
                .script
                .pop_front()
                .unwrap_or_else(|| state.default_behavior.clone())
        };

        match behavior {
            MockBehavior::Open => {
                events.open();
            }
            MockBehavior::Pending => {}
            MockBehavior::Fail(message) => {
                events.error(message.clone());
                events.close(CloseEvent::abnormal(message));
            }
        }

        Ok(Box::new(MockTransport {
            record,
            state: Arc::clone(&self.state),
        }))
    }
}

// ============================================================================
// MockTransport
// ============================================================================

/// Transport instance produced by [`MockConnector`].
struct MockTransport {
    record: Arc<Mutex<MockRecord>>,
    state: Arc<Mutex<MockState>>,
}

impl Transport for MockTransport {
    fn send(&self, text: String) -> Result<()> {
        {
            let mut state = self.state.lock();
            match state.send_budget {
                Some(0) => return Err(Error::transport("mock send failure")),
                Some(ref mut remaining) => *remaining -= 1,
                None => {}
            }
        }

        let mut record = self.record.lock();
        if record.events.is_closed() {
            return Err(Error::ConnectionClosed);
        }
        record.sent.push(text);
        Ok(())
    }

    fn close(&self, code: u16, reason: &str) {
        let echo = self.state.lock().echo_close;
        let events = {
            let mut record = self.record.lock();
            if record.close_request.is_none() {
                record.close_request = Some((code, reason.to_owned()));
            }
            record.events.clone()
        };

        if echo {
            events.close(CloseEvent::new(code, reason, true));
        }
    }
}

// ============================================================================
// MockHandle
// ============================================================================

/// Test-side view of one mock transport.
#[derive(Clone)]
pub struct MockHandle {
    record: Arc<Mutex<MockRecord>>,
}

impl fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.record.lock();
        f.debug_struct("MockHandle")
            .field("url", &record.url.as_str())
            .field("sent", &record.sent.len())
            .field("close_request", &record.close_request)
            .finish_non_exhaustive()
    }
}

impl MockHandle {
    /// Emits `Open`.
    pub fn emit_open(&self) -> bool {
        self.events().open()
    }

    /// Emits `Close` with the given code and reason.
    pub fn emit_close(&self, code: u16, reason: &str) -> bool {
        self.events().close(CloseEvent::new(code, reason, false))
    }

    /// Emits `Error`.
    pub fn emit_error(&self, message: &str) -> bool {
        self.events().error(message)
    }

    /// Emits an inbound `Message`.
    pub fn emit_message(&self, text: &str) -> bool {
        self.events().message(text)
    }

    /// Returns every text sent through this transport.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.record.lock().sent.clone()
    }

    /// Returns the arguments of the first `close` call, if any.
    #[must_use]
    pub fn close_request(&self) -> Option<(u16, String)> {
        self.record.lock().close_request.clone()
    }

    /// Returns the URL this transport was opened with.
    #[must_use]
    pub fn url(&self) -> Url {
        self.record.lock().url.clone()
    }

    /// Returns the sub-protocols this transport was opened with.
    #[must_use]
    pub fn sub_protocols(&self) -> Vec<String> {
        self.record.lock().sub_protocols.clone()
    }

    /// Clones the event sink so it is not used under the record lock.
    fn events(&self) -> EventSink {
        self.record.lock().events.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::transport::TransportEvent;

    fn url() -> Url {
        Url::parse("ws://mock.test/socket").unwrap()
    }

    #[tokio::test]
    async fn test_script_then_default() {
        let connector = MockConnector::new()
            .script([MockBehavior::Fail("refused".into())])
            .with_default(MockBehavior::Open);

        let (events, mut rx) = EventSink::channel();
        let _first = connector.open(&url(), &[], events).unwrap();
        assert_eq!(rx.recv().await.unwrap(), TransportEvent::Error("refused".into()));
        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Close(_)));

        let (events, mut rx) = EventSink::channel();
        let _second = connector.open(&url(), &[], events).unwrap();
        assert_eq!(rx.recv().await.unwrap(), TransportEvent::Open);

        assert_eq!(connector.open_count(), 2);
    }

    #[tokio::test]
    async fn test_records_sends_and_close() {
        let connector = MockConnector::new();
        let (events, mut rx) = EventSink::channel();
        let transport = connector
            .open(&url(), &["chat".to_owned()], events)
            .unwrap();

        transport.send("one".into()).unwrap();
        transport.close(1000, "bye");

        let handle = connector.last().unwrap();
        assert_eq!(handle.sent(), vec!["one".to_owned()]);
        assert_eq!(handle.close_request(), Some((1000, "bye".to_owned())));
        assert_eq!(handle.sub_protocols(), vec!["chat".to_owned()]);

        assert_eq!(rx.recv().await.unwrap(), TransportEvent::Open);
        assert_eq!(
            rx.recv().await.unwrap(),
            TransportEvent::Close(CloseEvent::new(1000, "bye", true))
        );
        assert!(transport.send("after close".into()).is_err());
    }

    #[test]
    fn test_send_budget() {
        let connector = MockConnector::new().with_default(MockBehavior::Pending);
        let (events, _rx) = EventSink::channel();
        let transport = connector.open(&url(), &[], events).unwrap();

        connector.fail_sends_after(1);
        assert!(transport.send("a".into()).is_ok());
        assert!(transport.send("b".into()).is_err());
        assert_eq!(connector.last().unwrap().sent(), vec!["a".to_owned()]);

        connector.allow_sends();
        assert!(transport.send("c".into()).is_ok());
        assert_eq!(
            connector.last().unwrap().sent(),
            vec!["a".to_owned(), "c".to_owned()]
        );
    }
}

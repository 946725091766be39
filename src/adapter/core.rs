//! Connection state machine.
//!
//! [`Adapter`] is a cheap, cloneable handle over shared state. All mutable
//! state lives behind one mutex, which is never held across an `.await`.
//! Operations record the callbacks they trigger while locked and dispatch
//! them after the lock is released.
//!
//! # Tasks
//!
//! | Task | Lifetime | Purpose |
//! |------|----------|---------|
//! | Event pump | One per transport | Feeds transport events into the state machine |
//! | Connect timer | While `Connecting` | Fails the attempt after `connection_timeout` |
//! | Heartbeat ticker | While `Open` | Sends probes every `heartbeat_interval` |
//! | Heartbeat deadline | Per probe | Force-closes if no ack arrives in time |
//! | Backoff timer | Between attempts | Starts the next reconnection attempt |
//!
//! Timer tasks hold only a weak reference to the shared state, and every
//! handle is aborted when the state it belongs to is left. Events from a
//! transport that is no longer current are dropped by identity check.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, error, info, trace, warn};

use crate::config::{AdapterBuilder, AdapterConfig, Callbacks, Notification};
use crate::error::{Error, Result};
use crate::identifiers::TransportId;
use crate::protocol::{
    CloseEvent, GOING_AWAY, HEARTBEAT_TIMEOUT_CLOSE, NORMAL_CLOSURE, NORMAL_CLOSURE_REASON,
    Payload, decode, is_marker,
};
use crate::transport::{EventSink, Transport, TransportConnector, TransportEvent};

use super::heartbeat::HeartbeatMonitor;
use super::queue::MessageQueue;
use super::reconnect::{ReconnectDecision, ReconnectionScheduler};
use super::state::ConnectionState;

// ============================================================================
// Types
// ============================================================================

/// Who started a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectOrigin {
    /// An explicit `connect()` call.
    Caller,
    /// The backoff timer.
    Reconnect,
}

/// How a connection attempt proceeds.
enum ConnectStart {
    /// Already decided.
    Ready(Result<()>),
    /// Settled when the transport opens or fails.
    Pending(oneshot::Receiver<Result<()>>),
}

/// The transport instance currently owned by the adapter.
struct ActiveTransport {
    /// Identity used to drop events from replaced instances.
    id: TransportId,
    /// Send/close handle.
    handle: Box<dyn Transport>,
    /// Event pump task.
    pump: JoinHandle<()>,
    /// Close requested locally and not yet confirmed.
    close_requested: Option<CloseEvent>,
}

impl ActiveTransport {
    /// Asks the transport to close and remembers the request.
    fn request_close(&mut self, code: u16, reason: &str) {
        self.handle.close(code, reason);
        if self.close_requested.is_none() {
            self.close_requested = Some(CloseEvent::new(code, reason, true));
        }
    }
}

/// Mutable adapter state, guarded by one mutex.
struct Inner {
    /// Lifecycle state.
    state: ConnectionState,
    /// Set by `disconnect()`, cleared by `connect()`.
    manual_close: bool,
    /// Current transport, if any.
    active: Option<ActiveTransport>,
    /// Connection timeout task.
    connect_timer: Option<JoinHandle<()>>,
    /// Pending `connect()` futures.
    waiters: Vec<oneshot::Sender<Result<()>>>,
    /// Outbound messages waiting for `Open`.
    queue: MessageQueue,
    /// Liveness probing.
    heartbeat: HeartbeatMonitor,
    /// Backoff and attempt counting.
    reconnect: ReconnectionScheduler,
}

impl Inner {
    /// Returns `true` if `id` names the current transport.
    fn is_current(&self, id: TransportId) -> bool {
        self.active.as_ref().is_some_and(|active| active.id == id)
    }

    /// Aborts the connection timeout.
    fn cancel_connect_timer(&mut self) {
        if let Some(timer) = self.connect_timer.take() {
            timer.abort();
        }
    }

    /// Drops the current transport and stops its pump.
    ///
    /// Returns the close it was asked for if the transport never confirmed
    /// it, since its `Close` event can no longer arrive.
    fn discard_transport(&mut self) -> Option<CloseEvent> {
        let active = self.active.take()?;
        trace!(transport_id = %active.id, "Discarding transport");
        active.pump.abort();
        active.close_requested
    }

    /// Resolves every pending `connect()` successfully.
    fn settle_ok(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }

    /// Rejects every pending `connect()` with a fresh error.
    fn settle_err(&mut self, make: impl Fn() -> Error) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(make()));
        }
    }

    /// Sends queued messages in order, stopping at the first failure.
    fn flush_queue(&mut self) {
        let Some(active) = self.active.as_ref() else {
            return;
        };

        let mut sent = 0usize;
        while let Some(message) = self.queue.pop_front() {
            let text = match message.payload.encode() {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Dropping queued message that failed to encode");
                    continue;
                }
            };

            if let Err(e) = active.handle.send(text) {
                warn!(
                    error = %e,
                    remaining = self.queue.len() + 1,
                    "Queue flush interrupted"
                );
                self.queue.push_front(message);
                break;
            }
            sent += 1;
        }

        if sent > 0 {
            debug!(sent, "Queued messages flushed");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_connect_timer();
        if let Some(active) = self.active.take() {
            active.pump.abort();
            if self.state != ConnectionState::Closed {
                active.handle.close(GOING_AWAY, "Adapter dropped");
            }
        }
    }
}

/// State shared by all handles and background tasks.
struct Shared {
    /// Immutable settings.
    config: AdapterConfig,
    /// Lifecycle callbacks.
    callbacks: Callbacks,
    /// Opens transport instances.
    connector: Arc<dyn TransportConnector>,
    /// Mutable state.
    inner: parking_lot::Mutex<Inner>,
}

// ============================================================================
// Adapter
// ============================================================================

/// A resilient persistent connection.
///
/// Cloning is cheap; all clones control the same connection. Background
/// tasks stop when the last clone is dropped.
///
/// # Example
///
/// ```no_run
/// use resilient_ws::{Adapter, Result};
///
/// # async fn example() -> Result<()> {
/// let adapter = Adapter::builder("ws://localhost:8080/socket")
///     .on_message(|value| println!("received {value}"))
///     .build()?;
///
/// adapter.connect().await?;
/// adapter.send("hello")?;
/// adapter.send_json(&serde_json::json!({ "type": "subscribe" }))?;
///
/// adapter.disconnect_normal();
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Adapter {
    shared: Arc<Shared>,
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Adapter")
            .field("url", &self.shared.config.url.as_str())
            .field("transport", &self.shared.connector.name())
            .field("state", &inner.state)
            .field("queued", &inner.queue.len())
            .field("reconnect_attempts", &inner.reconnect.attempts())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Adapter - Constructors
// ============================================================================

impl Adapter {
    /// Creates a builder for the given endpoint.
    #[inline]
    #[must_use]
    pub fn builder(url: &str) -> AdapterBuilder {
        AdapterBuilder::new(url)
    }

    /// Creates an adapter from its parts.
    ///
    /// Does not connect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(
        config: AdapterConfig,
        callbacks: Callbacks,
        connector: Arc<dyn TransportConnector>,
    ) -> Result<Self> {
        config.validate()?;

        let inner = Inner {
            state: ConnectionState::Closed,
            manual_close: false,
            active: None,
            connect_timer: None,
            waiters: Vec::new(),
            queue: MessageQueue::new(config.max_queue_size),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval, config.heartbeat_timeout),
            reconnect: ReconnectionScheduler::new(
                config.reconnect_delay,
                config.max_reconnect_delay,
                config.max_reconnect_attempts,
            ),
        };

        debug!(url = %config.url, transport = connector.name(), "Adapter created");

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                callbacks,
                connector,
                inner: parking_lot::Mutex::new(inner),
            }),
        })
    }
}

// ============================================================================
// Adapter - Connection Control
// ============================================================================

impl Adapter {
    /// Opens the connection.
    ///
    /// Resolves immediately if already open. A call made while an attempt
    /// is in flight joins that attempt. An explicit call cancels any
    /// pending reconnection timer and, if reconnection gave up, resets the
    /// attempt counter.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the transport did not open in time
    /// - [`Error::Transport`] if the transport reported an error first
    /// - [`Error::ConnectionClosed`] if it closed first or `disconnect()` was called
    /// - [`Error::Config`] if the transport rejected the URL
    pub async fn connect(&self) -> Result<()> {
        match self.shared.begin_connect(ConnectOrigin::Caller) {
            ConnectStart::Ready(result) => result,
            ConnectStart::Pending(rx) => rx.await.unwrap_or(Err(Error::ConnectionClosed)),
        }
    }

    /// Closes the connection without reconnecting.
    ///
    /// Cancels every pending timer, resets the attempt counter, and rejects
    /// pending `connect()` futures. `on_close` fires once the transport
    /// confirms the close, or when a later `connect()` replaces it first.
    pub fn disconnect(&self, code: u16, reason: &str) {
        let mut guard = self.shared.inner.lock();
        let inner = &mut *guard;

        inner.manual_close = true;
        inner.cancel_connect_timer();
        inner.heartbeat.stop();
        inner.reconnect.reset();

        let previous = inner.state;
        if previous != ConnectionState::Closed
            && let Some(active) = &mut inner.active
        {
            active.request_close(code, reason);
        }

        inner.state = ConnectionState::Closed;
        inner.settle_err(|| Error::ConnectionClosed);

        info!(code, reason, from = %previous, "Disconnected");
    }

    /// Closes the connection with code 1000 and reason "Normal closure".
    #[inline]
    pub fn disconnect_normal(&self) {
        self.disconnect(NORMAL_CLOSURE, NORMAL_CLOSURE_REASON);
    }
}

// ============================================================================
// Adapter - Sending
// ============================================================================

impl Adapter {
    /// Sends a message, or queues it while not open.
    ///
    /// Text is sent as-is; JSON values are encoded. While open, messages
    /// still queued from an interrupted flush are retried first; if any
    /// remain, the new message is queued behind them.
    ///
    /// # Errors
    ///
    /// - [`Error::SendWhileDisconnected`] if not open and queueing is disabled
    /// - [`Error::Json`] if encoding fails
    /// - Any error the transport reports for the send
    pub fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        let payload = payload.into();
        let mut overflow = None;

        let result = {
            let mut guard = self.shared.inner.lock();
            let inner = &mut *guard;

            // Messages left over from an interrupted flush go first
            if inner.state == ConnectionState::Open && !inner.queue.is_empty() {
                inner.flush_queue();
            }

            if inner.state == ConnectionState::Open && inner.queue.is_empty() {
                let text = payload.into_text()?;
                match &inner.active {
                    Some(active) => active.handle.send(text),
                    None => Err(Error::ConnectionClosed),
                }
            } else if self.shared.config.queue_messages {
                if let Some(evicted) = inner.queue.enqueue(payload) {
                    debug!(capacity = inner.queue.capacity(), "Queue full, oldest message evicted");
                    overflow = Some(evicted);
                }
                trace!(queued = inner.queue.len(), state = %inner.state, "Message queued");
                Ok(())
            } else {
                Err(Error::send_while_disconnected(inner.state))
            }
        };

        if let Some(evicted) = overflow {
            self.shared
                .callbacks
                .dispatch(Notification::QueueOverflow(evicted));
        }

        result
    }

    /// Serializes a value as JSON and sends it.
    ///
    /// # Errors
    ///
    /// Same as [`send()`](Self::send).
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        self.send(Payload::json(value)?)
    }

    /// Discards every queued message without sending.
    pub fn clear_queue(&self) {
        let mut inner = self.shared.inner.lock();
        let dropped = inner.queue.len();
        inner.queue.clear();
        debug!(dropped, "Queue cleared");
    }
}

// ============================================================================
// Adapter - Accessors
// ============================================================================

impl Adapter {
    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Returns `true` if the connection is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Returns the number of queued messages.
    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Returns the queued messages, oldest first.
    #[must_use]
    pub fn queued_messages(&self) -> Vec<Payload> {
        self.shared.inner.lock().queue.payloads()
    }

    /// Returns reconnection attempts since the last successful open.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().reconnect.attempts()
    }

    /// Returns when the last heartbeat ack arrived.
    #[must_use]
    pub fn last_heartbeat_ack(&self) -> Option<Instant> {
        self.shared.inner.lock().heartbeat.last_ack()
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.shared.config
    }

    /// Returns the name of the transport connector in use.
    #[inline]
    #[must_use]
    pub fn transport_name(&self) -> &'static str {
        self.shared.connector.name()
    }
}

// ============================================================================
// Shared - Connecting
// ============================================================================

impl Shared {
    /// Starts a connection attempt or joins the one in flight.
    fn begin_connect(self: &Arc<Self>, origin: ConnectOrigin) -> ConnectStart {
        let mut notifications = Vec::new();
        let start = {
            let mut inner = self.inner.lock();
            self.start_attempt(&mut inner, origin, &mut notifications)
        };
        self.callbacks.dispatch_all(notifications);
        start
    }

    /// Locked part of [`begin_connect`](Self::begin_connect).
    fn start_attempt(
        self: &Arc<Self>,
        inner: &mut Inner,
        origin: ConnectOrigin,
        notifications: &mut Vec<Notification>,
    ) -> ConnectStart {
        if inner.state == ConnectionState::Open {
            return ConnectStart::Ready(Ok(()));
        }

        inner.manual_close = false;

        if origin == ConnectOrigin::Caller {
            inner.reconnect.cancel();
            if inner.reconnect.is_exhausted() {
                inner.reconnect.reset();
            }
        }

        if inner.state == ConnectionState::Connecting {
            trace!("Joining connection attempt in flight");
            let (tx, rx) = oneshot::channel();
            inner.waiters.push(tx);
            return ConnectStart::Pending(rx);
        }

        if let Some(close) = inner.discard_transport() {
            debug!(%close, "Replacing transport before its close was confirmed");
            notifications.push(Notification::Close(close));
        }

        let id = TransportId::new();
        let (events, event_rx) = EventSink::channel();

        info!(
            url = %self.config.url,
            transport = self.connector.name(),
            transport_id = %id,
            ?origin,
            "Connecting"
        );

        let handle = match self
            .connector
            .open(&self.config.url, &self.config.sub_protocols, events)
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "Transport could not be opened");
                inner.state = ConnectionState::Closed;
                return ConnectStart::Ready(Err(e));
            }
        };

        inner.state = ConnectionState::Connecting;
        inner.active = Some(ActiveTransport {
            id,
            handle,
            pump: spawn_pump(Arc::downgrade(self), id, event_rx),
            close_requested: None,
        });

        let timeout = self.config.connection_timeout;
        if !timeout.is_zero() {
            let weak = Arc::downgrade(self);
            let deadline = Instant::now() + timeout;
            inner.connect_timer = Some(tokio::spawn(async move {
                sleep_until(deadline).await;
                if let Some(shared) = weak.upgrade() {
                    shared.on_connect_timeout(id);
                }
            }));
        }

        let (tx, rx) = oneshot::channel();
        inner.waiters.push(tx);
        ConnectStart::Pending(rx)
    }

    /// Fails the attempt if `id` is still connecting.
    fn on_connect_timeout(&self, id: TransportId) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.is_current(id) || inner.state != ConnectionState::Connecting {
            return;
        }

        // Fired from the timer task itself
        inner.connect_timer = None;

        let timeout_ms = self.config.connection_timeout.as_millis() as u64;
        warn!(timeout_ms, transport_id = %id, "Connection timeout");

        inner.settle_err(|| Error::connection_timeout(timeout_ms));
        Self::force_close(inner, NORMAL_CLOSURE, "Connection timeout");
    }

    /// Requests a close and waits for the transport to confirm it.
    ///
    /// The confirming `Close` event runs the normal close path.
    fn force_close(inner: &mut Inner, code: u16, reason: &str) {
        inner.heartbeat.stop();
        if let Some(active) = &mut inner.active {
            active.request_close(code, reason);
        }
        inner.state = ConnectionState::Closing;
    }

    /// Body of the backoff timer.
    ///
    /// The shared state is only upgraded around each step, so dropping the
    /// last handle while an attempt is pending still tears everything down.
    async fn run_reconnect(weak: Weak<Self>) {
        let Some(shared) = weak.upgrade() else {
            return;
        };

        let attempt = {
            let mut inner = shared.inner.lock();
            inner.reconnect.fired();
            if inner.manual_close {
                debug!("Reconnection skipped after manual disconnect");
                return;
            }
            inner.reconnect.attempts()
        };

        info!(attempt, "Reconnecting");

        let start = shared.begin_connect(ConnectOrigin::Reconnect);
        drop(shared);

        let result = match start {
            ConnectStart::Ready(result) => result,
            ConnectStart::Pending(rx) => rx.await.unwrap_or(Err(Error::ConnectionClosed)),
        };

        let Err(e) = result else {
            return;
        };
        let Some(shared) = weak.upgrade() else {
            return;
        };

        // Transport errors already reached on_error through the event path
        let manual_close = shared.inner.lock().manual_close;
        if manual_close || matches!(e, Error::Transport { .. }) {
            debug!(attempt, error = %e, "Reconnection attempt failed");
            return;
        }

        warn!(attempt, error = %e, "Reconnection attempt failed");
        shared.callbacks.dispatch(Notification::Error(e));
    }

    /// Schedules the next reconnection attempt or reports giving up.
    fn schedule_reconnect(
        self: &Arc<Self>,
        inner: &mut Inner,
        notifications: &mut Vec<Notification>,
    ) {
        if inner.reconnect.is_exhausted() {
            return;
        }

        match inner.reconnect.next_attempt() {
            ReconnectDecision::Exhausted { attempts } => {
                error!(attempts, "Maximum reconnect attempts reached");
                notifications.push(Notification::Error(Error::max_reconnect_attempts(attempts)));
            }
            ReconnectDecision::Scheduled { attempt, delay } => {
                let weak = Arc::downgrade(self);
                let deadline = Instant::now() + delay;
                inner.reconnect.set_timer(tokio::spawn(async move {
                    sleep_until(deadline).await;
                    Self::run_reconnect(weak).await;
                }));
                notifications.push(Notification::Reconnecting(attempt));
            }
        }
    }
}

// ============================================================================
// Shared - Transport Events
// ============================================================================

/// Spawns the task feeding one transport's events into the state machine.
fn spawn_pump(
    shared: Weak<Shared>,
    id: TransportId,
    mut event_rx: mpsc::UnboundedReceiver<TransportEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            let Some(shared) = shared.upgrade() else {
                break;
            };
            if !shared.handle_event(id, event) {
                break;
            }
        }
        trace!(transport_id = %id, "Event pump terminated");
    })
}

impl Shared {
    /// Applies one transport event.
    ///
    /// Returns `false` once the pump should stop.
    fn handle_event(self: &Arc<Self>, id: TransportId, event: TransportEvent) -> bool {
        let mut notifications = Vec::new();

        let keep_pumping = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            if !inner.is_current(id) {
                trace!(transport_id = %id, ?event, "Dropping event from stale transport");
                return false;
            }

            match event {
                TransportEvent::Open => {
                    self.on_open(inner, &mut notifications);
                    true
                }
                TransportEvent::Close(close) => {
                    self.on_close(inner, close, &mut notifications);
                    false
                }
                TransportEvent::Error(message) => {
                    warn!(transport_id = %id, %message, "Transport error");
                    if inner.state == ConnectionState::Connecting {
                        inner.settle_err(|| Error::transport(message.clone()));
                    }
                    notifications.push(Notification::Error(Error::transport(message)));
                    true
                }
                TransportEvent::Message(text) => {
                    let value = decode(&text);
                    if is_marker(&value, &self.config.pong_message) {
                        trace!("Heartbeat acknowledged");
                        inner.heartbeat.acknowledge();
                    } else {
                        notifications.push(Notification::Message(value));
                    }
                    true
                }
            }
        };

        self.callbacks.dispatch_all(notifications);
        keep_pumping
    }

    /// Handles the transport opening.
    fn on_open(self: &Arc<Self>, inner: &mut Inner, notifications: &mut Vec<Notification>) {
        if inner.state != ConnectionState::Connecting {
            debug!(state = %inner.state, "Ignoring open outside of connecting");
            return;
        }

        inner.cancel_connect_timer();
        inner.state = ConnectionState::Open;

        let reconnected = inner.reconnect.attempts() > 0;
        inner.reconnect.reset();

        if self.config.enable_heartbeat {
            self.start_heartbeat(inner);
        }

        inner.flush_queue();
        inner.settle_ok();

        info!(reconnected, "Connection open");

        notifications.push(Notification::Open);
        if reconnected {
            notifications.push(Notification::Reconnected);
        }
    }

    /// Handles the transport closing.
    fn on_close(
        self: &Arc<Self>,
        inner: &mut Inner,
        close: CloseEvent,
        notifications: &mut Vec<Notification>,
    ) {
        inner.cancel_connect_timer();
        inner.heartbeat.stop();

        // Dropping the handle leaves this pump running to completion
        inner.active = None;

        let previous = inner.state;
        inner.state = ConnectionState::Closed;
        inner.settle_err(|| Error::ConnectionClosed);

        if inner.manual_close {
            info!(%close, from = %previous, "Connection closed");
        } else {
            warn!(%close, from = %previous, "Connection closed unexpectedly");
        }

        notifications.push(Notification::Close(close));

        if !inner.manual_close && self.config.auto_reconnect {
            self.schedule_reconnect(inner, notifications);
        }
    }
}

// ============================================================================
// Shared - Heartbeat
// ============================================================================

impl Shared {
    /// Starts the repeating probe timer for the current transport.
    fn start_heartbeat(self: &Arc<Self>, inner: &mut Inner) {
        let Some(id) = inner.active.as_ref().map(|active| active.id) else {
            return;
        };

        let weak = Arc::downgrade(self);
        let period = self.config.heartbeat_interval;
        let start = Instant::now() + period;

        inner.heartbeat.start(tokio::spawn(async move {
            let mut ticker = interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.heartbeat_tick(id);
            }
        }));
    }

    /// Sends one probe and arms its deadline.
    fn heartbeat_tick(self: &Arc<Self>, id: TransportId) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if !inner.is_current(id) || inner.state != ConnectionState::Open {
            return;
        }

        let Some(cycle) = inner.heartbeat.begin_cycle() else {
            return;
        };

        trace!(cycle, "Sending heartbeat");
        if let Some(active) = &inner.active
            && let Err(e) = active.handle.send(self.config.heartbeat_message.clone())
        {
            debug!(error = %e, "Heartbeat send failed");
        }

        let weak = Arc::downgrade(self);
        let deadline = Instant::now() + self.config.heartbeat_timeout;
        inner.heartbeat.set_deadline(tokio::spawn(async move {
            sleep_until(deadline).await;
            if let Some(shared) = weak.upgrade() {
                shared.on_heartbeat_timeout(id, cycle);
            }
        }));
    }

    /// Force-closes if `cycle` was never acknowledged.
    fn on_heartbeat_timeout(&self, id: TransportId, cycle: u64) {
        let timeout_ms = self.config.heartbeat_timeout.as_millis() as u64;

        {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;

            if !inner.is_current(id)
                || inner.state != ConnectionState::Open
                || !inner.heartbeat.expire(cycle)
            {
                return;
            }

            warn!(timeout_ms, cycle, "Heartbeat timeout");
            Self::force_close(inner, HEARTBEAT_TIMEOUT_CLOSE, "Heartbeat timeout");
        }

        self.callbacks
            .dispatch(Notification::Error(Error::heartbeat_timeout(timeout_ms)));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use parking_lot::Mutex;
    use serde_json::{Value, json};
    use tokio::time::sleep;

    use crate::transport::{MockBehavior, MockConnector};

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    enum Seen {
        Open,
        Close(u16),
        Error(String),
        Message(Value),
        Reconnecting(u32),
        Reconnected,
        Overflow(Payload),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        seen: Arc<Mutex<Vec<Seen>>>,
    }

    impl Recorder {
        fn callbacks(&self) -> Callbacks {
            let push = |seen: &Arc<Mutex<Vec<Seen>>>| {
                let seen = Arc::clone(seen);
                move |item: Seen| seen.lock().push(item)
            };

            let open = push(&self.seen);
            let close = push(&self.seen);
            let err = push(&self.seen);
            let message = push(&self.seen);
            let reconnecting = push(&self.seen);
            let reconnected = push(&self.seen);
            let overflow = push(&self.seen);

            Callbacks::new()
                .on_open(move || open(Seen::Open))
                .on_close(move |event| close(Seen::Close(event.code)))
                .on_error(move |e| err(Seen::Error(e.to_string())))
                .on_message(move |value| message(Seen::Message(value)))
                .on_reconnecting(move |attempt| reconnecting(Seen::Reconnecting(attempt)))
                .on_reconnected(move || reconnected(Seen::Reconnected))
                .on_queue_overflow(move |m| overflow(Seen::Overflow(m.payload.clone())))
        }

        fn seen(&self) -> Vec<Seen> {
            self.seen.lock().clone()
        }

        fn count(&self, predicate: impl Fn(&Seen) -> bool) -> usize {
            self.seen.lock().iter().filter(|s| predicate(s)).count()
        }
    }

    fn config() -> AdapterConfig {
        AdapterConfig::parse("ws://mock.test/socket")
            .unwrap()
            .with_heartbeat(false)
    }

    fn adapter(config: AdapterConfig, connector: &MockConnector) -> (Adapter, Recorder) {
        let recorder = Recorder::default();
        let adapter = Adapter::new(
            config,
            recorder.callbacks(),
            Arc::new(connector.clone()),
        )
        .unwrap();
        (adapter, recorder)
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    /// Lets spawned tasks run without moving the paused clock far.
    async fn settle() {
        sleep(ms(1)).await;
    }

    // ------------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_connect_opens_and_notifies() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(config(), &connector);

        assert_eq!(adapter.state(), ConnectionState::Closed);
        adapter.connect().await.unwrap();

        assert!(adapter.is_connected());
        assert_eq!(recorder.seen(), vec![Seen::Open]);

        // Already open: no second transport
        adapter.connect().await.unwrap();
        assert_eq!(connector.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_connects_share_one_attempt() {
        let connector = MockConnector::new().with_default(MockBehavior::Pending);
        let (adapter, _recorder) = adapter(config(), &connector);

        let first = tokio::spawn({
            let adapter = adapter.clone();
            async move { adapter.connect().await }
        });
        let second = tokio::spawn({
            let adapter = adapter.clone();
            async move { adapter.connect().await }
        });
        settle().await;

        assert_eq!(connector.open_count(), 1);
        assert_eq!(adapter.state(), ConnectionState::Connecting);

        connector.last().unwrap().emit_open();
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_timeout_rejects_and_closes_transport() {
        let connector = MockConnector::new().with_default(MockBehavior::Pending);
        let config = config()
            .with_connection_timeout(ms(50))
            .with_auto_reconnect(false);
        let (adapter, recorder) = adapter(config, &connector);

        let started = Instant::now();
        let err = adapter.connect().await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 50 }));
        assert!(elapsed >= ms(50) && elapsed < ms(60), "elapsed {elapsed:?}");
        assert_eq!(
            connector.last().unwrap().close_request(),
            Some((NORMAL_CLOSURE, "Connection timeout".to_owned()))
        );

        settle().await;
        assert_eq!(adapter.state(), ConnectionState::Closed);
        assert_eq!(recorder.seen(), vec![Seen::Close(NORMAL_CLOSURE)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_before_open_rejects_connect() {
        let connector = MockConnector::new().with_default(MockBehavior::Fail("refused".into()));
        let (adapter, recorder) = adapter(config().with_auto_reconnect(false), &connector);

        let err = adapter.connect().await.unwrap_err();
        assert!(matches!(err, Error::Transport { ref message } if message == "refused"));

        settle().await;
        assert_eq!(adapter.state(), ConnectionState::Closed);
        assert_eq!(
            recorder.seen(),
            vec![
                Seen::Error("Transport error: refused".into()),
                Seen::Close(crate::protocol::ABNORMAL_CLOSURE),
            ]
        );
    }

    // ------------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_does_not_reconnect() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(config(), &connector);
        adapter.connect().await.unwrap();

        adapter.disconnect(4001, "bye");
        assert_eq!(adapter.state(), ConnectionState::Closed);
        assert_eq!(
            connector.last().unwrap().close_request(),
            Some((4001, "bye".to_owned()))
        );

        sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.open_count(), 1);
        assert_eq!(recorder.seen(), vec![Seen::Open, Seen::Close(4001)]);
        assert_eq!(adapter.reconnect_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_rejects_pending_connect() {
        let connector = MockConnector::new().with_default(MockBehavior::Pending);
        let (adapter, _recorder) = adapter(config(), &connector);

        let pending = tokio::spawn({
            let adapter = adapter.clone();
            async move { adapter.connect().await }
        });
        settle().await;

        adapter.disconnect_normal();
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(
            connector.last().unwrap().close_request(),
            Some((NORMAL_CLOSURE, NORMAL_CLOSURE_REASON.to_owned()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_right_after_disconnect_reports_close() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(config(), &connector);
        adapter.connect().await.unwrap();

        // The old transport's Close is still undelivered when connect() runs
        adapter.disconnect_normal();
        adapter.connect().await.unwrap();
        sleep(Duration::from_secs(5)).await;

        assert_eq!(connector.open_count(), 2);
        assert_eq!(
            recorder.seen(),
            vec![Seen::Open, Seen::Close(NORMAL_CLOSURE), Seen::Open]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(config(), &connector);
        adapter.connect().await.unwrap();

        connector.last().unwrap().emit_close(1006, "dropped");
        settle().await;
        assert!(recorder.seen().contains(&Seen::Reconnecting(1)));

        adapter.disconnect_normal();
        sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.open_count(), 1);
        assert_eq!(adapter.state(), ConnectionState::Closed);
    }

    // ------------------------------------------------------------------------
    // Reconnection
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_backoff_delays_then_gives_up() {
        let connector = MockConnector::new()
            .script([MockBehavior::Open])
            .with_default(MockBehavior::Fail("refused".into()));
        let config = config()
            .with_max_reconnect_attempts(3)
            .with_reconnect_delay(ms(100))
            .with_max_reconnect_delay(ms(1000));
        let (adapter, recorder) = adapter(config, &connector);

        adapter.connect().await.unwrap();
        connector.transport(0).unwrap().emit_close(1006, "dropped");
        sleep(Duration::from_secs(5)).await;

        let opened = connector.open_times();
        assert_eq!(opened.len(), 4);
        let gaps: Vec<Duration> = opened.windows(2).map(|w| w[1] - w[0]).collect();
        for (gap, expected) in gaps.iter().zip([100, 200, 400]) {
            assert!(
                *gap >= ms(expected) && *gap < ms(expected + 5),
                "gap {gap:?}, expected {expected}ms"
            );
        }

        assert_eq!(adapter.state(), ConnectionState::Closed);
        assert_eq!(
            recorder.count(|s| matches!(s, Seen::Reconnecting(_))),
            3
        );
        assert_eq!(
            recorder.count(|s| *s == Seen::Error("Maximum reconnect attempts reached (3)".into())),
            1
        );
        assert_eq!(
            recorder.seen().last(),
            Some(&Seen::Error("Maximum reconnect attempts reached (3)".into()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_connect_resets_exhausted_counter() {
        let connector = MockConnector::new()
            .script([MockBehavior::Open])
            .with_default(MockBehavior::Fail("refused".into()));
        let config = config()
            .with_max_reconnect_attempts(1)
            .with_reconnect_delay(ms(10));
        let (adapter, _recorder) = adapter(config, &connector);

        adapter.connect().await.unwrap();
        connector.transport(0).unwrap().emit_close(1006, "dropped");
        sleep(Duration::from_secs(1)).await;
        assert_eq!(adapter.reconnect_attempts(), 1);
        assert_eq!(connector.open_count(), 2);

        // Fresh connect fails again, but reconnection restarts from attempt 1
        assert!(adapter.connect().await.is_err());
        settle().await;
        assert_eq!(adapter.reconnect_attempts(), 1);
        sleep(Duration::from_secs(1)).await;
        assert_eq!(connector.open_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_success_notifies_and_resets() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(config().with_reconnect_delay(ms(100)), &connector);

        adapter.connect().await.unwrap();
        connector.transport(0).unwrap().emit_close(1006, "dropped");
        sleep(ms(150)).await;

        assert!(adapter.is_connected());
        assert_eq!(adapter.reconnect_attempts(), 0);
        assert_eq!(
            recorder.seen(),
            vec![
                Seen::Open,
                Seen::Close(1006),
                Seen::Reconnecting(1),
                Seen::Open,
                Seen::Reconnected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_reconnect_disabled() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(config().with_auto_reconnect(false), &connector);

        adapter.connect().await.unwrap();
        connector.last().unwrap().emit_close(1006, "dropped");
        sleep(Duration::from_secs(120)).await;

        assert_eq!(connector.open_count(), 1);
        assert_eq!(adapter.state(), ConnectionState::Closed);
        assert_eq!(recorder.count(|s| matches!(s, Seen::Reconnecting(_))), 0);

        adapter.connect().await.unwrap();
        assert_eq!(connector.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_timeout_is_reported() {
        let connector = MockConnector::new()
            .script([MockBehavior::Open])
            .with_default(MockBehavior::Pending);
        let config = config()
            .with_reconnect_delay(ms(100))
            .with_connection_timeout(ms(50))
            .with_max_reconnect_attempts(1);
        let (adapter, recorder) = adapter(config, &connector);

        adapter.connect().await.unwrap();
        connector.transport(0).unwrap().emit_close(1006, "dropped");
        sleep(ms(200)).await;

        assert!(
            recorder
                .seen()
                .contains(&Seen::Error("Connection timeout after 50ms".into()))
        );
        assert!(
            recorder
                .seen()
                .contains(&Seen::Error("Maximum reconnect attempts reached (1)".into()))
        );
        assert_eq!(adapter.state(), ConnectionState::Closed);
    }

    // ------------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------------

    fn heartbeat_config() -> AdapterConfig {
        config()
            .with_heartbeat(true)
            .with_heartbeat_interval(ms(1000))
            .with_heartbeat_timeout(ms(200))
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_pong_forces_close_and_reconnects() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(heartbeat_config(), &connector);

        adapter.connect().await.unwrap();
        sleep(ms(1250)).await;

        let first = connector.transport(0).unwrap();
        assert_eq!(first.sent(), vec!["ping".to_owned()]);
        assert_eq!(
            first.close_request(),
            Some((HEARTBEAT_TIMEOUT_CLOSE, "Heartbeat timeout".to_owned()))
        );
        assert_eq!(
            recorder.seen(),
            vec![
                Seen::Open,
                Seen::Error("Heartbeat timeout after 200ms".into()),
                Seen::Close(HEARTBEAT_TIMEOUT_CLOSE),
                Seen::Reconnecting(1),
            ]
        );
        assert_eq!(adapter.state(), ConnectionState::Closed);

        // Default base delay is one second
        sleep(ms(1000)).await;
        assert!(adapter.is_connected());
        assert_eq!(connector.open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pong_keeps_connection_alive_and_is_not_forwarded() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(heartbeat_config(), &connector);

        adapter.connect().await.unwrap();
        let handle = connector.last().unwrap();

        sleep(ms(1100)).await;
        assert!(handle.emit_message("pong"));
        sleep(ms(1000)).await;
        assert!(handle.emit_message("\"pong\""));
        sleep(ms(500)).await;

        assert!(adapter.is_connected());
        assert_eq!(handle.sent(), vec!["ping".to_owned(), "ping".to_owned()]);
        assert!(adapter.last_heartbeat_ack().is_some());
        assert_eq!(recorder.seen(), vec![Seen::Open]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_stops_after_disconnect() {
        let connector = MockConnector::new();
        let (adapter, _recorder) = adapter(heartbeat_config(), &connector);

        adapter.connect().await.unwrap();
        adapter.disconnect_normal();
        sleep(Duration::from_secs(10)).await;

        assert!(connector.last().unwrap().sent().is_empty());
    }

    // ------------------------------------------------------------------------
    // Messages and Queue
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_json_round_trip() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(config(), &connector);
        adapter.connect().await.unwrap();

        adapter.send_json(&json!({ "a": 1 })).unwrap();
        let handle = connector.last().unwrap();
        let wire = handle.sent().pop().unwrap();
        assert_eq!(wire, r#"{"a":1}"#);

        handle.emit_message(&wire);
        handle.emit_message("plain text");
        settle().await;

        assert_eq!(
            recorder.seen(),
            vec![
                Seen::Open,
                Seen::Message(json!({ "a": 1 })),
                Seen::Message(Value::String("plain text".into())),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_evicts_oldest() {
        let connector = MockConnector::new();
        let (adapter, recorder) = adapter(config().with_max_queue_size(2), &connector);

        adapter.send("a").unwrap();
        adapter.send("b").unwrap();
        adapter.send("c").unwrap();

        assert_eq!(adapter.queue_size(), 2);
        assert_eq!(
            adapter.queued_messages(),
            vec![Payload::from("b"), Payload::from("c")]
        );
        assert_eq!(recorder.seen(), vec![Seen::Overflow(Payload::from("a"))]);

        adapter.clear_queue();
        assert_eq!(adapter.queue_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_flushes_before_new_sends() {
        let connector = MockConnector::new();
        let (adapter, _recorder) = adapter(config(), &connector);

        adapter.send("first").unwrap();
        adapter.send_json(&json!({ "n": 2 })).unwrap();
        adapter.connect().await.unwrap();
        adapter.send("third").unwrap();

        assert_eq!(
            connector.last().unwrap().sent(),
            vec!["first".to_owned(), r#"{"n":2}"#.to_owned(), "third".to_owned()]
        );
        assert_eq!(adapter.queue_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_failure_keeps_remaining_in_order() {
        let connector = MockConnector::new();
        let (adapter, _recorder) = adapter(config(), &connector);

        adapter.send("a").unwrap();
        adapter.send("b").unwrap();
        adapter.send("c").unwrap();

        connector.fail_sends_after(1);
        adapter.connect().await.unwrap();

        assert_eq!(connector.last().unwrap().sent(), vec!["a".to_owned()]);
        assert_eq!(
            adapter.queued_messages(),
            vec![Payload::from("b"), Payload::from("c")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_after_interrupted_flush_keeps_order() {
        let connector = MockConnector::new();
        let (adapter, _recorder) = adapter(config(), &connector);

        for text in ["a", "b", "c"] {
            adapter.send(text).unwrap();
        }
        connector.fail_sends_after(1);
        adapter.connect().await.unwrap();

        // Transport still failing: the new message waits behind the others
        adapter.send("d").unwrap();
        assert_eq!(connector.last().unwrap().sent(), vec!["a".to_owned()]);
        assert_eq!(
            adapter.queued_messages(),
            vec![Payload::from("b"), Payload::from("c"), Payload::from("d")]
        );

        connector.allow_sends();
        adapter.send("e").unwrap();
        assert_eq!(
            connector.last().unwrap().sent(),
            ["a", "b", "c", "d", "e"].map(String::from).to_vec()
        );
        assert_eq!(adapter.queue_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_without_queueing_fails() {
        let connector = MockConnector::new();
        let (adapter, _recorder) = adapter(config().with_queue_messages(false), &connector);

        let err = adapter.send("x").unwrap_err();
        assert!(matches!(
            err,
            Error::SendWhileDisconnected {
                state: ConnectionState::Closed
            }
        ));
        assert_eq!(adapter.queue_size(), 0);
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_stops_timers() {
        let connector = MockConnector::new();
        let (adapter, _recorder) = adapter(heartbeat_config(), &connector);
        adapter.connect().await.unwrap();

        drop(adapter);
        sleep(Duration::from_secs(5)).await;

        let handle = connector.last().unwrap();
        assert!(handle.sent().is_empty());
        assert_eq!(
            handle.close_request(),
            Some((GOING_AWAY, "Adapter dropped".to_owned()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_last_handle_during_reconnect_closes_transport() {
        let connector = MockConnector::new()
            .script([MockBehavior::Open])
            .with_default(MockBehavior::Pending);
        let config = config()
            .with_connection_timeout(Duration::ZERO)
            .with_reconnect_delay(ms(100));
        let (adapter, _recorder) = adapter(config, &connector);

        adapter.connect().await.unwrap();
        connector.transport(0).unwrap().emit_close(1006, "dropped");
        sleep(ms(150)).await;
        assert_eq!(connector.open_count(), 2);
        assert_eq!(adapter.state(), ConnectionState::Connecting);

        drop(adapter);
        settle().await;

        assert_eq!(
            connector.transport(1).unwrap().close_request(),
            Some((GOING_AWAY, "Adapter dropped".to_owned()))
        );
    }

    #[test]
    fn test_new_validates_config() {
        let config = AdapterConfig::parse("http://example.com").unwrap();
        let result = Adapter::new(config, Callbacks::new(), Arc::new(MockConnector::new()));
        assert!(matches!(result, Err(Error::Config { .. })));
    }
}

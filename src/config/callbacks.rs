//! Lifecycle callbacks.
//!
//! Callbacks run on the adapter's background tasks, never while internal
//! state is locked, so they may call back into the adapter. They should
//! return quickly and must not panic.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

use crate::adapter::QueuedMessage;
use crate::error::Error;
use crate::protocol::CloseEvent;

// ============================================================================
// Types
// ============================================================================

/// Callback without arguments.
type Hook = Box<dyn Fn() + Send + Sync>;

/// Callback receiving one argument by value.
type Handler<T> = Box<dyn Fn(T) + Send + Sync>;

/// Callback receiving one argument by reference.
type RefHandler<T> = Box<dyn Fn(&T) + Send + Sync>;

// ============================================================================
// Callbacks
// ============================================================================

/// Set of optional lifecycle callbacks.
///
/// # Example
///
/// ```
/// use resilient_ws::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_open(|| println!("connected"))
///     .on_reconnecting(|attempt| println!("reconnecting, attempt {attempt}"))
///     .on_message(|value| println!("received {value}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    on_open: Option<Hook>,
    on_close: Option<RefHandler<CloseEvent>>,
    on_error: Option<RefHandler<Error>>,
    on_message: Option<Handler<Value>>,
    on_reconnecting: Option<Handler<u32>>,
    on_reconnected: Option<Hook>,
    on_queue_overflow: Option<RefHandler<QueuedMessage>>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_open", &self.on_open.is_some())
            .field("on_close", &self.on_close.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_message", &self.on_message.is_some())
            .field("on_reconnecting", &self.on_reconnecting.is_some())
            .field("on_reconnected", &self.on_reconnected.is_some())
            .field("on_queue_overflow", &self.on_queue_overflow.is_some())
            .finish()
    }
}

impl Callbacks {
    /// Creates an empty callback set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when a connection opens.
    #[must_use]
    pub fn on_open(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Called when a connection closes, expectedly or not.
    #[must_use]
    pub fn on_close(mut self, f: impl Fn(&CloseEvent) + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Called for transport errors, timeouts, and terminal failures.
    #[must_use]
    pub fn on_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called with every decoded inbound message except heartbeat acks.
    #[must_use]
    pub fn on_message(mut self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Box::new(f));
        self
    }

    /// Called with the attempt number when a reconnection is scheduled.
    #[must_use]
    pub fn on_reconnecting(mut self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.on_reconnecting = Some(Box::new(f));
        self
    }

    /// Called after `on_open` when the connection was re-established.
    #[must_use]
    pub fn on_reconnected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reconnected = Some(Box::new(f));
        self
    }

    /// Called with the message evicted when the queue overflows.
    ///
    /// Without this callback eviction is silent.
    #[must_use]
    pub fn on_queue_overflow(
        mut self,
        f: impl Fn(&QueuedMessage) + Send + Sync + 'static,
    ) -> Self {
        self.on_queue_overflow = Some(Box::new(f));
        self
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A callback invocation recorded under the state lock and dispatched
/// after it is released.
#[derive(Debug)]
pub(crate) enum Notification {
    Open,
    Close(CloseEvent),
    Error(Error),
    Message(Value),
    Reconnecting(u32),
    Reconnected,
    QueueOverflow(QueuedMessage),
}

impl Callbacks {
    /// Invokes the callback matching `notification`, if set.
    pub(crate) fn dispatch(&self, notification: Notification) {
        match notification {
            Notification::Open => {
                if let Some(f) = &self.on_open {
                    f();
                }
            }
            Notification::Close(event) => {
                if let Some(f) = &self.on_close {
                    f(&event);
                }
            }
            Notification::Error(error) => {
                if let Some(f) = &self.on_error {
                    f(&error);
                }
            }
            Notification::Message(value) => {
                if let Some(f) = &self.on_message {
                    f(value);
                }
            }
            Notification::Reconnecting(attempt) => {
                if let Some(f) = &self.on_reconnecting {
                    f(attempt);
                }
            }
            Notification::Reconnected => {
                if let Some(f) = &self.on_reconnected {
                    f();
                }
            }
            Notification::QueueOverflow(message) => {
                if let Some(f) = &self.on_queue_overflow {
                    f(&message);
                }
            }
        }
    }

    /// Dispatches notifications in order.
    pub(crate) fn dispatch_all(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            self.dispatch(notification);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

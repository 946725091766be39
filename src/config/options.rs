//! Adapter configuration.
//!
//! Configuration is supplied once at construction and never changes for
//! the lifetime of an adapter. To reconfigure, build a new adapter.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use resilient_ws::AdapterConfig;
//!
//! # fn example() -> resilient_ws::Result<()> {
//! let config = AdapterConfig::parse("ws://localhost:8080/socket")?
//!     .with_max_reconnect_attempts(3)
//!     .with_reconnect_delay(Duration::from_millis(100))
//!     .with_heartbeat(false);
//!
//! config.validate()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tracing::warn;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Defaults
// ============================================================================

/// Default maximum consecutive reconnection attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Default base reconnection delay.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(1_000);

/// Default reconnection delay cap.
pub const DEFAULT_MAX_RECONNECT_DELAY: Duration = Duration::from_millis(30_000);

/// Default heartbeat probe interval.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(30_000);

/// Default heartbeat ack timeout.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Default heartbeat probe text.
pub const DEFAULT_HEARTBEAT_MESSAGE: &str = "ping";

/// Default heartbeat ack text.
pub const DEFAULT_PONG_MESSAGE: &str = "pong";

/// Default outbound queue capacity.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Default connection timeout.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(10_000);

// ============================================================================
// AdapterConfig
// ============================================================================

/// Immutable adapter settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Endpoint to connect to (`ws://` or `wss://`).
    pub url: Url,

    /// Sub-protocols offered during the handshake.
    pub sub_protocols: Vec<String>,

    /// Reconnect automatically after an unexpected close.
    pub auto_reconnect: bool,

    /// Consecutive reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,

    /// Delay before the first reconnection attempt.
    pub reconnect_delay: Duration,

    /// Upper bound for any reconnection delay.
    pub max_reconnect_delay: Duration,

    /// Probe liveness while open.
    pub enable_heartbeat: bool,

    /// Time between heartbeat probes.
    pub heartbeat_interval: Duration,

    /// Time allowed for a heartbeat ack. Should be below the interval.
    pub heartbeat_timeout: Duration,

    /// Probe text sent on every heartbeat tick.
    pub heartbeat_message: String,

    /// Inbound value treated as a heartbeat ack.
    pub pong_message: String,

    /// Buffer `send()` calls while not open.
    pub queue_messages: bool,

    /// Capacity of the outbound queue.
    pub max_queue_size: usize,

    /// Time allowed for a transport to open. Zero disables the timer.
    pub connection_timeout: Duration,
}

// ============================================================================
// Constructors
// ============================================================================

impl AdapterConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            sub_protocols: Vec::new(),
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_reconnect_delay: DEFAULT_MAX_RECONNECT_DELAY,
            enable_heartbeat: true,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            heartbeat_message: DEFAULT_HEARTBEAT_MESSAGE.to_owned(),
            pong_message: DEFAULT_PONG_MESSAGE.to_owned(),
            queue_messages: true,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    /// Parses `url` and creates a configuration with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if the URL cannot be parsed.
    pub fn parse(url: &str) -> Result<Self> {
        Ok(Self::new(Url::parse(url)?))
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl AdapterConfig {
    /// Sets the handshake sub-protocols.
    #[must_use]
    pub fn with_sub_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sub_protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables automatic reconnection.
    #[inline]
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Sets the consecutive reconnection attempt limit.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the base reconnection delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Sets the reconnection delay cap.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_delay(mut self, delay: Duration) -> Self {
        self.max_reconnect_delay = delay;
        self
    }

    /// Enables or disables the heartbeat.
    #[inline]
    #[must_use]
    pub fn with_heartbeat(mut self, enabled: bool) -> Self {
        self.enable_heartbeat = enabled;
        self
    }

    /// Sets the heartbeat probe interval.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the heartbeat ack timeout.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets the heartbeat probe text.
    #[inline]
    #[must_use]
    pub fn with_heartbeat_message(mut self, message: impl Into<String>) -> Self {
        self.heartbeat_message = message.into();
        self
    }

    /// Sets the heartbeat ack text.
    #[inline]
    #[must_use]
    pub fn with_pong_message(mut self, message: impl Into<String>) -> Self {
        self.pong_message = message.into();
        self
    }

    /// Enables or disables queueing while not open.
    #[inline]
    #[must_use]
    pub fn with_queue_messages(mut self, enabled: bool) -> Self {
        self.queue_messages = enabled;
        self
    }

    /// Sets the outbound queue capacity.
    #[inline]
    #[must_use]
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Sets the connection timeout.
    #[inline]
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl AdapterConfig {
    /// Checks the configuration for values the adapter cannot run with.
    ///
    /// A heartbeat timeout at or above the interval is allowed but makes
    /// every cycle time out, so it is only logged.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL scheme is not `ws` or `wss`
    /// - [`Error::Config`] if the heartbeat is enabled with a zero interval
    /// - [`Error::Config`] if queueing is enabled with a zero capacity
    pub fn validate(&self) -> Result<()> {
        match self.url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::config(format!(
                    "Unsupported URL scheme '{other}', expected ws or wss"
                )));
            }
        }

        if self.enable_heartbeat {
            if self.heartbeat_interval.is_zero() {
                return Err(Error::config(
                    "heartbeat_interval must be greater than zero when the heartbeat is enabled",
                ));
            }

            if self.heartbeat_timeout >= self.heartbeat_interval {
                warn!(
                    interval_ms = self.heartbeat_interval.as_millis() as u64,
                    timeout_ms = self.heartbeat_timeout.as_millis() as u64,
                    "Heartbeat timeout is not below the interval; every cycle will time out"
                );
            }
        }

        if self.queue_messages && self.max_queue_size == 0 {
            return Err(Error::config(
                "max_queue_size must be greater than zero when queueing is enabled",
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Builder pattern for adapter configuration.
//!
//! Provides a fluent API for configuring and creating [`Adapter`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use resilient_ws::{Adapter, Platform};
//!
//! # fn example() -> resilient_ws::Result<()> {
//! let adapter = Adapter::builder("ws://localhost:8080/socket")
//!     .platform(Platform::Native)
//!     .max_reconnect_attempts(10)
//!     .heartbeat_interval(Duration::from_secs(15))
//!     .on_message(|value| println!("received {value}"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::adapter::{Adapter, QueuedMessage};
use crate::error::{Error, Result};
use crate::protocol::CloseEvent;
use crate::transport::{Platform, TransportConnector, TransportFactory};

use super::{AdapterConfig, Callbacks};

// ============================================================================
// AdapterBuilder
// ============================================================================

/// Builder for configuring an [`Adapter`] instance.
///
/// Use [`Adapter::builder()`] to create a new builder.
pub struct AdapterBuilder {
    /// Configuration, or the URL parse error to report from `build()`.
    config: Result<AdapterConfig>,
    /// Lifecycle callbacks.
    callbacks: Callbacks,
    /// Platform used to select a transport.
    platform: Platform,
    /// Fall back to the standard WebSocket transport if the platform has none.
    fallback: bool,
    /// Explicit connector, bypassing platform selection.
    connector: Option<Arc<dyn TransportConnector>>,
}

impl fmt::Debug for AdapterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterBuilder")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("platform", &self.platform)
            .field("fallback", &self.fallback)
            .field("connector", &self.connector.as_ref().map(|c| c.name()))
            .finish()
    }
}

// ============================================================================
// AdapterBuilder Implementation
// ============================================================================

impl AdapterBuilder {
    /// Creates a builder for the given endpoint.
    ///
    /// An unparsable URL is reported by [`build()`](Self::build).
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self::from_config_result(AdapterConfig::parse(url))
    }

    /// Creates a builder starting from an existing configuration.
    #[must_use]
    pub fn from_config(config: AdapterConfig) -> Self {
        Self::from_config_result(Ok(config))
    }

    fn from_config_result(config: Result<AdapterConfig>) -> Self {
        Self {
            config,
            callbacks: Callbacks::new(),
            platform: Platform::Native,
            fallback: true,
            connector: None,
        }
    }

    /// Applies `f` to the configuration if it parsed.
    fn map_config(mut self, f: impl FnOnce(AdapterConfig) -> AdapterConfig) -> Self {
        self.config = self.config.map(f);
        self
    }

    /// Applies `f` to the callback set.
    fn map_callbacks(mut self, f: impl FnOnce(Callbacks) -> Callbacks) -> Self {
        self.callbacks = f(self.callbacks);
        self
    }
}

// ============================================================================
// Transport Selection
// ============================================================================

impl AdapterBuilder {
    /// Sets the platform used to select a transport.
    #[inline]
    #[must_use]
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Sets whether to fall back to the standard WebSocket transport when
    /// the platform cannot provide one.
    #[inline]
    #[must_use]
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.fallback = enabled;
        self
    }

    /// Uses the given connector instead of selecting one by platform.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn TransportConnector>) -> Self {
        self.connector = Some(connector);
        self
    }
}

// ============================================================================
// Configuration Setters
// ============================================================================

impl AdapterBuilder {
    /// Sets the handshake sub-protocols.
    #[must_use]
    pub fn sub_protocols<I, S>(self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map_config(|c| c.with_sub_protocols(protocols))
    }

    /// Enables or disables automatic reconnection.
    #[must_use]
    pub fn auto_reconnect(self, enabled: bool) -> Self {
        self.map_config(|c| c.with_auto_reconnect(enabled))
    }

    /// Sets the consecutive reconnection attempt limit.
    #[must_use]
    pub fn max_reconnect_attempts(self, attempts: u32) -> Self {
        self.map_config(|c| c.with_max_reconnect_attempts(attempts))
    }

    /// Sets the base reconnection delay.
    #[must_use]
    pub fn reconnect_delay(self, delay: Duration) -> Self {
        self.map_config(|c| c.with_reconnect_delay(delay))
    }

    /// Sets the reconnection delay cap.
    #[must_use]
    pub fn max_reconnect_delay(self, delay: Duration) -> Self {
        self.map_config(|c| c.with_max_reconnect_delay(delay))
    }

    /// Enables or disables the heartbeat.
    #[must_use]
    pub fn heartbeat(self, enabled: bool) -> Self {
        self.map_config(|c| c.with_heartbeat(enabled))
    }

    /// Sets the heartbeat probe interval.
    #[must_use]
    pub fn heartbeat_interval(self, interval: Duration) -> Self {
        self.map_config(|c| c.with_heartbeat_interval(interval))
    }

    /// Sets the heartbeat ack timeout.
    #[must_use]
    pub fn heartbeat_timeout(self, timeout: Duration) -> Self {
        self.map_config(|c| c.with_heartbeat_timeout(timeout))
    }

    /// Sets the heartbeat probe text.
    #[must_use]
    pub fn heartbeat_message(self, message: impl Into<String>) -> Self {
        self.map_config(|c| c.with_heartbeat_message(message))
    }

    /// Sets the heartbeat ack text.
    #[must_use]
    pub fn pong_message(self, message: impl Into<String>) -> Self {
        self.map_config(|c| c.with_pong_message(message))
    }

    /// Enables or disables queueing while not open.
    #[must_use]
    pub fn queue_messages(self, enabled: bool) -> Self {
        self.map_config(|c| c.with_queue_messages(enabled))
    }

    /// Sets the outbound queue capacity.
    #[must_use]
    pub fn max_queue_size(self, size: usize) -> Self {
        self.map_config(|c| c.with_max_queue_size(size))
    }

    /// Sets the connection timeout.
    #[must_use]
    pub fn connection_timeout(self, timeout: Duration) -> Self {
        self.map_config(|c| c.with_connection_timeout(timeout))
    }
}

// ============================================================================
// Callback Setters
// ============================================================================

impl AdapterBuilder {
    /// Replaces the whole callback set.
    #[inline]
    #[must_use]
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// See [`Callbacks::on_open`].
    #[must_use]
    pub fn on_open(self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.map_callbacks(|c| c.on_open(f))
    }

    /// See [`Callbacks::on_close`].
    #[must_use]
    pub fn on_close(self, f: impl Fn(&CloseEvent) + Send + Sync + 'static) -> Self {
        self.map_callbacks(|c| c.on_close(f))
    }

    /// See [`Callbacks::on_error`].
    #[must_use]
    pub fn on_error(self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.map_callbacks(|c| c.on_error(f))
    }

    /// See [`Callbacks::on_message`].
    #[must_use]
    pub fn on_message(self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.map_callbacks(|c| c.on_message(f))
    }

    /// See [`Callbacks::on_reconnecting`].
    #[must_use]
    pub fn on_reconnecting(self, f: impl Fn(u32) + Send + Sync + 'static) -> Self {
        self.map_callbacks(|c| c.on_reconnecting(f))
    }

    /// See [`Callbacks::on_reconnected`].
    #[must_use]
    pub fn on_reconnected(self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.map_callbacks(|c| c.on_reconnected(f))
    }

    /// See [`Callbacks::on_queue_overflow`].
    #[must_use]
    pub fn on_queue_overflow(self, f: impl Fn(&QueuedMessage) + Send + Sync + 'static) -> Self {
        self.map_callbacks(|c| c.on_queue_overflow(f))
    }
}

// ============================================================================
// Build
// ============================================================================

impl AdapterBuilder {
    /// Builds the adapter with validation.
    ///
    /// Does not connect; call [`Adapter::connect()`] afterwards.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if the URL could not be parsed
    /// - [`Error::Config`] if the configuration is invalid
    /// - [`Error::UnsupportedTransport`] if the platform has no transport
    ///   and fallback is disabled
    pub fn build(self) -> Result<Adapter> {
        let config = self.config?;

        let connector = match self.connector {
            Some(connector) => connector,
            None => {
                let factory = TransportFactory::new(self.platform);
                if self.fallback {
                    factory.create_with_fallback()
                } else {
                    factory.create()?
                }
            }
        };

        Adapter::new(config, self.callbacks, connector)
    }
}

// ============================================================================
// Tests
// ============================================================================

//! RPC peer builder.
//!
//! Provides a fluent builder API for configuring [`RpcPeer`] instances with
//! timeout, back-pressure, observation and retry settings.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    // ---
    CorrelatorConfig,
    CorrelatorObserver,
    Result,
    RetryConfig,
    RpcPeer,
    TransportPtr,
};

/// Builder for [`RpcPeer`].
///
/// # Examples
///
/// ## Charging station with retry
/// ```
/// use ocpp_rpc::{create_memory_transport_with_hub, MemoryHub, RpcPeerBuilder};
/// use std::time::Duration;
///
/// # async fn example() -> ocpp_rpc::Result<()> {
/// let hub = MemoryHub::new();
/// let transport = create_memory_transport_with_hub("CS-001", hub).await?;
///
/// let station = RpcPeerBuilder::new(transport)
///     .default_timeout(Duration::from_secs(10))
///     .retry_max_attempts(5)
///     .retry_initial_delay(Duration::from_millis(500))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## CSMS with bounded in-flight requests
/// ```
/// use ocpp_rpc::{create_memory_transport_with_hub, MemoryHub, RpcPeerBuilder};
///
/// # async fn example() -> ocpp_rpc::Result<()> {
/// let transport = create_memory_transport_with_hub("csms", MemoryHub::new()).await?;
/// let csms = RpcPeerBuilder::new(transport).max_pending(1024).build().await?;
/// # Ok(())
/// # }
/// ```
pub struct RpcPeerBuilder {
    // ---
    transport: TransportPtr,
    config: CorrelatorConfig,
    observer: Option<Arc<dyn CorrelatorObserver>>,

    // Retry configuration (all optional)
    retry_max_attempts: Option<u32>,
    retry_multiplier: Option<f32>,
    retry_initial_delay: Option<Duration>,
    retry_max_delay: Option<Duration>,
}

impl RpcPeerBuilder {
    /// Create a new peer builder over `transport`.
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            config: CorrelatorConfig::default(),
            observer: None,
            retry_max_attempts: None,
            retry_multiplier: None,
            retry_initial_delay: None,
            retry_max_delay: None,
        }
    }

    /// Replace the whole correlator configuration.
    pub fn config(mut self, config: CorrelatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Timeout for calls that do not specify one.
    ///
    /// Default: 30s.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = timeout;
        self
    }

    /// Reject new calls once this many are in flight.
    ///
    /// Default: unbounded.
    pub fn max_pending(mut self, limit: usize) -> Self {
        self.config.max_pending = Some(limit);
        self
    }

    /// Install a correlator event hook in place of the tracing default.
    pub fn observer(mut self, observer: Arc<dyn CorrelatorObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set maximum retry attempts for [`RpcPeer::call`].
    ///
    /// Default: no retries (single attempt).
    pub fn retry_max_attempts(mut self, attempts: u32) -> Self {
        self.retry_max_attempts = Some(attempts);
        self
    }

    /// Set retry backoff multiplier.
    ///
    /// Default: 2.0.
    pub fn retry_multiplier(mut self, multiplier: f32) -> Self {
        self.retry_multiplier = Some(multiplier);
        self
    }

    /// Set initial delay before first retry.
    ///
    /// Default: 100ms.
    pub fn retry_initial_delay(mut self, delay: Duration) -> Self {
        self.retry_initial_delay = Some(delay);
        self
    }

    /// Set maximum delay between retry attempts.
    ///
    /// Default: 5s.
    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.retry_max_delay = Some(delay);
        self
    }

    /// Subscribe to the transport and start the peer.
    ///
    /// # Errors
    ///
    /// Fails if the transport cannot subscribe.
    pub async fn build(self) -> Result<RpcPeer> {
        // ---
        // Build retry config only if at least one retry parameter was set
        let retry_config = if self.retry_max_attempts.is_some()
            || self.retry_multiplier.is_some()
            || self.retry_initial_delay.is_some()
            || self.retry_max_delay.is_some()
        {
            let defaults = RetryConfig::default();
            Some(RetryConfig {
                max_attempts: self.retry_max_attempts.unwrap_or(defaults.max_attempts),
                multiplier: self.retry_multiplier.unwrap_or(defaults.multiplier),
                initial_delay: self.retry_initial_delay.unwrap_or(defaults.initial_delay),
                max_delay: self.retry_max_delay.unwrap_or(defaults.max_delay),
            })
        } else {
            None
        };

        RpcPeer::start(self.transport, self.config, self.observer, retry_config).await
    }
}

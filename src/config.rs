//! Correlator configuration.
//!
//! Transport-agnostic settings only; a transport interprets its own
//! connection parameters.

use std::time::Duration;

/// Timeout applied when a caller does not supply one.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Settings for a [`RequestCorrelator`](crate::RequestCorrelator).
///
/// # Example
///
/// ```
/// use ocpp_rpc::CorrelatorConfig;
/// use std::time::Duration;
///
/// let config = CorrelatorConfig::default()
///     .with_default_timeout(Duration::from_secs(10))
///     .with_max_pending(64);
///
/// assert_eq!(config.default_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct CorrelatorConfig {
    // ---
    /// Timeout for requests sent without an explicit one.
    ///
    /// Default: 30 seconds
    pub default_timeout: Duration,

    /// Upper bound on requests in flight at once, across all destinations.
    ///
    /// `None` means unbounded. OCPP-J peers usually keep a single CALL in
    /// flight per connection; a CSMS talking to many stations needs more.
    pub max_pending: Option<usize>,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_pending: None,
        }
    }
}

impl CorrelatorConfig {
    /// Set the timeout used when a caller passes `None`.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Cap the number of requests in flight.
    pub fn with_max_pending(mut self, limit: usize) -> Self {
        self.max_pending = Some(limit);
        self
    }
}

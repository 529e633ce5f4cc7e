//! Retry configuration and exponential backoff logic.
//!
//! The correlator never retries on its own: a timed-out CALL may well have
//! been executed by the other side, and only the caller knows whether the
//! action is safe to repeat. This module is the opt-in, caller-side policy
//! used by [`RpcPeer::call`](crate::RpcPeer::call) when the peer was built
//! with retry settings.
//!
//! # Retry Strategy
//!
//! - Only retries errors for which
//!   [`RpcError::is_retryable`](crate::RpcError::is_retryable) is true
//!   (timeouts and transport failures)
//! - Every attempt is a fresh CALL with a fresh request id
//! - Uses exponential backoff with randomized jitter to prevent thundering herd
//! - Caps delay at `max_delay`

use std::collections::hash_map::RandomState;
use std::future::Future;
use std::hash::BuildHasher;
use std::time::Duration;
use tokio::time::sleep;

use crate::{log_debug, Result};

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt).
    pub max_attempts: u32,

    /// Backoff multiplier applied to the delay after each retry.
    pub multiplier: f32,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retry attempts (caps exponential growth).
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    /// - `max_attempts`: 3
    /// - `multiplier`: 2.0
    /// - `initial_delay`: 100ms
    /// - `max_delay`: 5s
    fn default() -> Self {
        // ---
        Self {
            max_attempts: 3,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// If `retry_config` is `None`, the operation executes exactly once.
/// Non-retryable errors are returned immediately; once attempts are
/// exhausted the last retryable error is returned.
///
/// # Backoff Algorithm
///
/// - First retry: `initial_delay` (with jitter)
/// - Subsequent retries: `min(current_delay * multiplier, max_delay)` (with jitter)
/// - Jitter: ±25%
///
/// # Example
///
/// ```no_run
/// # async fn example(peer: ocpp_rpc::RpcPeer) -> ocpp_rpc::Result<()> {
/// use ocpp_rpc::{retry_with_backoff, EndpointId, RetryConfig};
/// use serde_json::json;
///
/// let csms = &EndpointId::from("csms");
/// let peer = &peer;
/// let config = RetryConfig::default();
///
/// let response = retry_with_backoff(Some(&config), || async move {
///     peer.send(csms, "Heartbeat", json!({}), None).await?.await
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    retry_config: Option<&RetryConfig>,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let Some(retry_config) = retry_config else {
        return operation().await;
    };

    let mut attempt = 0;
    let mut current_delay = retry_config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) if err.is_retryable() => {
                attempt += 1;

                if attempt > retry_config.max_attempts {
                    log_debug!(
                        "retry exhausted after {} attempts, last error: {err}",
                        retry_config.max_attempts
                    );
                    return Err(err);
                }

                let jittered_delay = apply_jitter(current_delay);

                log_debug!(
                    "retry attempt {attempt}/{}, waiting {jittered_delay:?} (error: {err})",
                    retry_config.max_attempts
                );

                sleep(jittered_delay).await;

                let next_delay = Duration::from_secs_f64(
                    current_delay.as_secs_f64() * retry_config.multiplier as f64,
                );
                current_delay = next_delay.min(retry_config.max_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Apply ±25% jitter: `delay * (0.75 + random(0.0..0.5))`.
fn apply_jitter(delay: Duration) -> Duration {
    // ---
    let random_state = RandomState::new();
    let hash = random_state.hash_one(std::time::SystemTime::now());

    let random_factor = (hash % 1000) as f64 / 1000.0;
    let jitter_multiplier = 0.75 + (random_factor * 0.5);

    Duration::from_secs_f64(delay.as_secs_f64() * jitter_multiplier)
}

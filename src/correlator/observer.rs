//! Observation hook for correlator events.
//!
//! One hook, invoked uniformly for every action, replaces per-message
//! request/response events. The default [`TracingObserver`] turns events into
//! structured `tracing` records; install your own to feed metrics or audit
//! logs.

use std::time::Duration;

use crate::{EndpointId, RequestId, RpcError};

#[allow(unused_imports)]
use crate::{log_debug, log_warn};

/// Identifies the request an event is about.
#[derive(Debug, Clone, Copy)]
pub struct RequestInfo<'a> {
    pub request_id: &'a RequestId,
    pub destination: &'a EndpointId,
    pub action: &'a str,
}

/// How a pending request was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// CALLRESULT
    Response,
    /// CALLERROR
    CallError,
    /// The answer could not be decoded.
    ProtocolError,
    Timeout,
    Cancelled,
    ConnectionClosed,
    /// The transport rejected the CALL; the error went back to the sender.
    NotSent,
}

impl Outcome {
    pub(crate) fn of(resolution: &crate::Result<serde_json::Value>) -> Self {
        // ---
        match resolution {
            Ok(_) => Outcome::Response,
            Err(RpcError::Application { .. }) => Outcome::CallError,
            Err(RpcError::Timeout { .. }) => Outcome::Timeout,
            Err(RpcError::Cancelled) => Outcome::Cancelled,
            Err(RpcError::ConnectionClosed) => Outcome::ConnectionClosed,
            Err(RpcError::Transport(_)) => Outcome::NotSent,
            Err(_) => Outcome::ProtocolError,
        }
    }
}

/// Receives correlator events.
///
/// Calls happen inline on the path that triggered them (sender, receive loop,
/// or timeout task), so implementations must be quick and must not block.
pub trait CorrelatorObserver: Send + Sync {
    /// A CALL was registered and is being handed to the transport.
    ///
    /// If the transport rejects it, `on_resolved` follows with
    /// [`Outcome::NotSent`].
    fn on_sent(&self, _info: &RequestInfo<'_>) {}

    /// A pending request reached its single resolution.
    fn on_resolved(&self, _info: &RequestInfo<'_>, _outcome: Outcome, _elapsed: Duration) {}

    /// A response matched no pending request and was dropped.
    fn on_orphan(&self, _source: &EndpointId, _request_id: &RequestId) {}
}

/// Default observer: emits `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CorrelatorObserver for TracingObserver {
    fn on_sent(&self, info: &RequestInfo<'_>) {
        #[cfg(feature = "logging")]
        tracing::debug!(
            request_id = %info.request_id,
            destination = %info.destination,
            action = info.action,
            "call sent"
        );
        #[cfg(not(feature = "logging"))]
        let _ = info;
    }

    fn on_resolved(&self, info: &RequestInfo<'_>, outcome: Outcome, elapsed: Duration) {
        #[cfg(feature = "logging")]
        {
            match outcome {
                Outcome::Response | Outcome::CallError => tracing::debug!(
                    request_id = %info.request_id,
                    destination = %info.destination,
                    action = info.action,
                    outcome = ?outcome,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "call resolved"
                ),
                _ => tracing::warn!(
                    request_id = %info.request_id,
                    destination = %info.destination,
                    action = info.action,
                    outcome = ?outcome,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "call failed"
                ),
            }
        }
        #[cfg(not(feature = "logging"))]
        {
            if !matches!(outcome, Outcome::Response | Outcome::CallError) {
                log_warn!(
                    "{} {} to {} failed after {elapsed:?}: {outcome:?}",
                    info.action,
                    info.request_id,
                    info.destination
                );
            }
        }
    }

    fn on_orphan(&self, source: &EndpointId, request_id: &RequestId) {
        #[cfg(feature = "logging")]
        tracing::warn!(
            request_id = %request_id,
            source = %source,
            "orphan response dropped"
        );
        #[cfg(not(feature = "logging"))]
        log_warn!("orphan response {request_id} from {source} dropped");
    }
}

// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! A transport is one local endpoint's view of a message-oriented link (in
//! production, the WebSocket connections of a CSMS or a charging station). It
//! carries opaque frames to and from remote endpoints and reports when a
//! remote endpoint's connection closes.
//!
//! The transport knows nothing about OCPP message types, request ids,
//! timeouts or retries; all of that lives in the correlator and router.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Identity of an endpoint on the link.
///
/// For a CSMS this is typically the charging station identity taken from the
/// WebSocket URL; for a charging station talking to a single CSMS it is
/// whatever name the CSMS endpoint was registered under.
///
/// Endpoint ids are immutable, cheap to clone, and safe to share across
/// threads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub Arc<str>);

impl EndpointId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for EndpointId
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        EndpointId(value.into())
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared base state for transport implementations.
///
/// Each concrete transport embeds this as a field named `base` so that the
/// default `Transport` methods can delegate to it.
pub struct TransportBase {
    /// Identity of the local endpoint.
    pub transport_id: EndpointId,
}

impl TransportBase {
    pub fn new(transport_id: impl Into<EndpointId>) -> Self {
        Self {
            transport_id: transport_id.into(),
        }
    }
}

/// Something the link delivered to the local endpoint.
#[derive(Clone, Debug)]
pub enum InboundEvent {
    /// A raw frame from `source`.
    Frame { source: EndpointId, payload: Bytes },

    /// The connection to `peer` is gone. Frames sent to it earlier may or
    /// may not have been delivered.
    Closed { peer: EndpointId },
}

/// Handle returned from a successful subscription.
///
/// Inbound events are delivered in the order the link produced them. The
/// inbox ends (`recv()` returns `None`) once the local transport is closed.
pub struct InboundHandle {
    // ---
    /// Receiver channel for inbound events.
    pub inbox: mpsc::Receiver<InboundEvent>,
}

/// Transport abstraction.
///
/// Implementations must ensure that:
/// - Once `subscribe()` returns successfully, frames sent to this endpoint
///   after that point are delivered to the returned inbox.
/// - Frames from one source are delivered in the order they were sent.
/// - A `Closed` event is produced when a remote peer's connection ends.
/// - `send()` fails with [`RpcError::Transport`](crate::RpcError::Transport)
///   when the destination is not reachable.
///
/// The in-memory transport is the reference implementation of these
/// semantics.
///
/// # Notes
///
/// This trait uses `async_trait`; consumers should treat its methods as
/// ordinary `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Identity of the local endpoint.
    fn transport_id(&self) -> &EndpointId {
        &self.base().transport_id
    }

    /// Send a raw frame to `destination`.
    async fn send(&self, destination: &EndpointId, payload: Bytes) -> Result<()>;

    /// Start receiving inbound events for the local endpoint.
    ///
    /// A transport has a single inbox; subscribing again replaces the
    /// previous one.
    async fn subscribe(&self) -> Result<InboundHandle>;

    /// Close the local endpoint and release its resources.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` only increments a reference count; every clone drives the same
/// underlying endpoint.
pub type TransportPtr = Arc<dyn Transport>;

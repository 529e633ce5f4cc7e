//! In-memory transport implementation.
//!
//! A pure in-process implementation of the domain-level `Transport` trait,
//! used for tests, local simulation, and as the reference for transport
//! semantics.
//!
//! ## Reference Semantics
//!
//! - Once `subscribe()` returns, frames sent to that endpoint are delivered.
//! - Frames from one sender arrive in send order.
//! - Disconnecting an endpoint ends its own inbox and delivers
//!   `InboundEvent::Closed` to every other registered endpoint.
//! - Sending to an endpoint that is not registered fails with a transport
//!   error, the way a send on a dropped WebSocket would.
//!
//! ## Non-Goals
//!
//! No persistence, no network failure simulation beyond explicit
//! disconnects, no WebSocket framing.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use tokio::sync::{mpsc, RwLock};

use crate::{
    // ---
    log_debug,
    EndpointId,
    InboundEvent,
    InboundHandle,
    Result,
    RpcError,
    Transport,
    TransportBase,
    TransportPtr,
};

const INBOX_CAPACITY: usize = 64;

/// Shared link for in-memory transports.
///
/// All `MemoryTransport`s that share a hub can reach each other, the way a
/// CSMS and its charging stations reach each other over WebSockets.
///
/// For tests that must not interfere with each other, construct a hub per
/// test and pass it to [`create_memory_transport_with_hub`]:
///
/// ```
/// # async fn example() -> ocpp_rpc::Result<()> {
/// let hub = ocpp_rpc::MemoryHub::new();
///
/// let csms = ocpp_rpc::create_memory_transport_with_hub("csms", hub.clone()).await?;
/// let station = ocpp_rpc::create_memory_transport_with_hub("CS-001", hub.clone()).await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    endpoints: RwLock<HashMap<EndpointId, mpsc::Sender<InboundEvent>>>,
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self::default())
    }

    /// Whether `endpoint` currently has a registered inbox.
    pub async fn is_connected(&self, endpoint: &EndpointId) -> bool {
        self.endpoints.read().await.contains_key(endpoint)
    }

    /// Drop `endpoint` from the link.
    ///
    /// Its own inbox ends, and every other endpoint receives
    /// `InboundEvent::Closed { peer: endpoint }`. Returns `false` if the
    /// endpoint was not registered.
    pub async fn disconnect(&self, endpoint: &EndpointId) -> bool {
        // ---
        let (removed, others) = {
            let mut endpoints = self.endpoints.write().await;
            let removed = endpoints.remove(endpoint).is_some();
            let others: Vec<_> = endpoints.values().cloned().collect();
            (removed, others)
        };

        if !removed {
            return false;
        }

        log_debug!("{endpoint}: disconnected, notifying {} peers", others.len());

        for sender in others {
            // A closed inbox means that peer is shutting down as well.
            let _ = sender
                .send(InboundEvent::Closed {
                    peer: endpoint.clone(),
                })
                .await;
        }

        true
    }

    async fn send(
        &self,
        source: &EndpointId,
        destination: &EndpointId,
        payload: Bytes,
    ) -> Result<()> {
        // ---
        let sender = {
            let endpoints = self.endpoints.read().await;
            endpoints.get(destination).cloned()
        };

        let sender = sender.ok_or_else(|| {
            RpcError::Transport(format!("{source}: no connection to {destination}"))
        })?;

        sender
            .send(InboundEvent::Frame {
                source: source.clone(),
                payload,
            })
            .await
            .map_err(|_| {
                RpcError::Transport(format!("{source}: connection to {destination} closed"))
            })
    }

    async fn subscribe(&self, endpoint: &EndpointId) -> InboundHandle {
        // ---
        log_debug!("{endpoint}: subscribe");

        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        self.endpoints.write().await.insert(endpoint.clone(), tx);

        InboundHandle { inbox: rx }
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            endpoints: RwLock::new(HashMap::new()),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport for one endpoint on a [`MemoryHub`].
struct MemoryTransport {
    // ---
    base: TransportBase,
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn send(&self, destination: &EndpointId, payload: Bytes) -> Result<()> {
        self.hub.send(self.transport_id(), destination, payload).await
    }

    async fn subscribe(&self) -> Result<InboundHandle> {
        Ok(self.hub.subscribe(self.transport_id()).await)
    }

    /// Close the endpoint: its inbox ends and its peers see `Closed`.
    async fn close(&self) -> Result<()> {
        self.hub.disconnect(self.transport_id()).await;
        Ok(())
    }
}

/// Create an in-memory transport on the process-global hub.
///
/// For isolated parallel tests, use [`create_memory_transport_with_hub`].
///
/// # Errors
///
/// Currently infallible.
pub async fn create_memory_transport(node_id: impl Into<EndpointId>) -> Result<TransportPtr> {
    // ---
    create_memory_transport_with_hub(node_id, global_hub()).await
}

/// Create an in-memory transport on the provided hub.
///
/// # Errors
///
/// Currently infallible.
pub async fn create_memory_transport_with_hub(
    node_id: impl Into<EndpointId>,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    let base = TransportBase::new(node_id);
    log_debug!("{}: create memory transport", base.transport_id);

    Ok(Arc::new(MemoryTransport { base, hub }))
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[tokio::test]
    async fn test_send_to_unknown_endpoint_fails() {
        // ---
        let hub = MemoryHub::new();
        let a = create_memory_transport_with_hub("a", hub.clone()).await.unwrap();

        let err = a
            .send(&EndpointId::from("nobody"), Bytes::from_static(b"[]"))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Transport(_)));
    }

    #[tokio::test]
    async fn test_disconnect_notifies_peers_and_ends_own_inbox() {
        // ---
        let hub = MemoryHub::new();
        let a = create_memory_transport_with_hub("a", hub.clone()).await.unwrap();
        let b = create_memory_transport_with_hub("b", hub.clone()).await.unwrap();

        let mut a_inbox = a.subscribe().await.unwrap();
        let mut b_inbox = b.subscribe().await.unwrap();

        assert!(hub.disconnect(&EndpointId::from("b")).await);
        assert!(!hub.is_connected(&EndpointId::from("b")).await);

        match a_inbox.inbox.recv().await {
            Some(InboundEvent::Closed { peer }) => assert_eq!(peer.as_str(), "b"),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(b_inbox.inbox.recv().await.is_none());

        // Second disconnect is a no-op.
        assert!(!hub.disconnect(&EndpointId::from("b")).await);
    }
}

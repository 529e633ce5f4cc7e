//! OCPP-J peer.
//!
//! Provides a single type that plays both RPC roles over one transport:
//! it sends CALLs and awaits their responses through a [`RequestCorrelator`],
//! and answers CALLs from the other side through a [`CallRouter`]. OCPP is
//! symmetric in this respect; a CSMS and a charging station both do both.

use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    retry_with_backoff,
    runner,
    Action,
    Call,
    CallRouter,
    CorrelatorConfig,
    CorrelatorObserver,
    EndpointId,
    Frame,
    RequestCorrelator,
    RequestId,
    ResponseFuture,
    Result,
    RetryConfig,
    TransportPtr,
};

/// A running OCPP-J endpoint.
///
/// Created with [`RpcPeerBuilder`](crate::RpcPeerBuilder). Cheap to clone;
/// clones share the same correlator, router and receive loop.
#[derive(Clone)]
pub struct RpcPeer {
    inner: Arc<Inner>,
}

struct Inner {
    transport: TransportPtr,
    correlator: RequestCorrelator,
    router: CallRouter,
    retry_config: Option<RetryConfig>,

    // Shutdown signaling, shared across clones
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    rx_task: Mutex<Option<JoinHandle<()>>>,
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl RpcPeer {
    /// Subscribe to the transport and start the receive loop
    /// (internal use by `RpcPeerBuilder`).
    pub(crate) async fn start(
        transport: TransportPtr,
        config: CorrelatorConfig,
        observer: Option<Arc<dyn CorrelatorObserver>>,
        retry_config: Option<RetryConfig>,
    ) -> Result<Self> {
        // ---
        let correlator = match observer {
            Some(observer) => {
                RequestCorrelator::with_observer(transport.clone(), config, observer)
            }
            None => RequestCorrelator::new(transport.clone(), config),
        };
        let router = CallRouter::new();

        let handle = transport.subscribe().await?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let rx_task = runner::spawn_receive_loop(
            transport.clone(),
            handle,
            correlator.clone(),
            router.clone(),
            shutdown_rx,
        );

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                correlator,
                router,
                retry_config,
                shutdown_tx: Mutex::new(Some(shutdown_tx)),
                rx_task: Mutex::new(Some(rx_task)),
            }),
        })
    }

    /// Identity of the local endpoint.
    pub fn node_id(&self) -> &EndpointId {
        self.inner.transport.transport_id()
    }

    /// Send a CALL and return a future for its resolution.
    ///
    /// See [`RequestCorrelator::send`]. No retry is applied.
    pub async fn send(
        &self,
        destination: &EndpointId,
        action: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<ResponseFuture> {
        // ---
        self.inner
            .correlator
            .send(destination, action, payload, timeout)
            .await
    }

    /// Call a typed action and await its typed response.
    ///
    /// When the peer was built with retry settings, timeouts and transport
    /// failures are retried with exponential backoff, each attempt as a new
    /// CALL. Only enable that for actions that are safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns the final [`RpcError`](crate::RpcError) of the last attempt.
    pub async fn call<A: Action>(
        &self,
        destination: &EndpointId,
        request: &A::Request,
        timeout: Option<Duration>,
    ) -> Result<A::Response> {
        // ---
        let correlator = &self.inner.correlator;

        retry_with_backoff(self.inner.retry_config.as_ref(), || async move {
            correlator.call::<A>(destination, request, timeout).await
        })
        .await
    }

    /// Emit an OCPP 2.1 SEND frame: fire and forget, never answered.
    ///
    /// # Errors
    ///
    /// Fails if the payload cannot be encoded or the transport rejects it.
    pub async fn send_unconfirmed(
        &self,
        destination: &EndpointId,
        action: &str,
        payload: Value,
    ) -> Result<()> {
        // ---
        let frame = Frame::Send(Call {
            request_id: RequestId::generate(),
            action: action.to_string(),
            payload,
        });
        self.inner.transport.send(destination, frame.to_bytes()?).await
    }

    /// Register a handler for inbound CALLs and SENDs of action `A`.
    ///
    /// See [`CallRouter::register`].
    pub fn register<A, F, Fut>(&self, handler: F)
    where
        A: Action,
        F: Fn(EndpointId, A::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<A::Response>> + Send + 'static,
    {
        self.inner.router.register::<A, F, Fut>(handler);
    }

    /// Register a raw JSON handler for `action`.
    pub fn register_raw<F, Fut>(&self, action: impl Into<String>, handler: F)
    where
        F: Fn(EndpointId, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.inner.router.register_raw(action, handler);
    }

    pub fn correlator(&self) -> &RequestCorrelator {
        &self.inner.correlator
    }

    pub fn router(&self) -> &CallRouter {
        &self.inner.router
    }

    pub fn retry_config(&self) -> Option<&RetryConfig> {
        self.inner.retry_config.as_ref()
    }

    /// Stop the receive loop and close the transport.
    ///
    /// Every request still pending resolves with `ConnectionClosed`. Calling
    /// this more than once is harmless.
    pub async fn shutdown(&self) {
        // ---
        let shutdown_tx = lock_ignore_poison(&self.inner.shutdown_tx).take();
        if let Some(tx) = shutdown_tx {
            let _ = tx.send(());
        }

        let rx_task = lock_ignore_poison(&self.inner.rx_task).take();
        if let Some(task) = rx_task {
            let _ = task.await;
        }

        // The loop drains the correlator on exit; this catches sends that
        // raced with it.
        self.inner.correlator.close_all();

        if let Err(err) = self.inner.transport.close().await {
            log_debug!("{}: transport close failed: {err}", self.node_id());
        }
    }
}

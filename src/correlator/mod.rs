// src/correlator/mod.rs
//! Request/response correlation.
//!
//! [`RequestCorrelator`] sends OCPP CALLs over a transport and matches the
//! CALLRESULT / CALLERROR frames that come back, in any order, to the caller
//! that is waiting for each one.
//!
//! # Lifecycle of a request
//!
//! 1. `send()` registers a pending entry under a unique [`RequestId`],
//!    schedules a timeout task, and transmits the CALL.
//! 2. The entry leaves the pending table through exactly one of: a matching
//!    response ([`on_message_received`](RequestCorrelator::on_message_received)),
//!    the timeout task, [`cancel`](RequestCorrelator::cancel), or a
//!    connection-level failure
//!    ([`connection_closed`](RequestCorrelator::connection_closed),
//!    [`close_all`](RequestCorrelator::close_all)).
//! 3. Whichever path removes the entry delivers the single resolution to the
//!    caller's [`ResponseFuture`]. Every other path finds nothing and does
//!    nothing; a response that finds nothing is an orphan.
//!
//! # Concurrency
//!
//! The pending table is sharded (`DashMap`), so unrelated requests never
//! contend on a common lock. The correlator never retries; see
//! [`retry_with_backoff`](crate::retry_with_backoff) for an opt-in,
//! caller-side policy.

mod observer;
mod pending;
mod stats;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time;

use crate::{
    // ---
    log_debug,
    log_warn,
    Action,
    Call,
    CorrelatorConfig,
    EndpointId,
    Frame,
    FrameError,
    MessageType,
    RequestId,
    Result,
    RpcError,
    TransportPtr,
};

pub use observer::{CorrelatorObserver, Outcome, RequestInfo, TracingObserver};
pub use stats::CorrelatorStats;

use pending::{PendingRequest, PendingTable, Resolution};
use stats::Counters;

/// What [`RequestCorrelator::on_message_received`] did with a frame.
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// The frame answered a pending request, which is now resolved.
    Resolved(RequestId),

    /// A response that matched no pending request (unknown, duplicate, or
    /// late). It was logged and dropped.
    Orphan(RequestId),

    /// A CALL or SEND from the peer; not a response, so it is left for the
    /// inbound side to handle.
    Inbound(Frame),

    /// An undecodable request-side frame whose id could be read, so the peer
    /// can still be told what was wrong with it.
    Malformed(FrameError),

    /// Nothing to correlate and nobody to answer.
    Ignored,
}

/// Correlates outgoing CALLs with their responses.
///
/// Cheap to clone (internally `Arc`-backed).
#[derive(Clone)]
pub struct RequestCorrelator {
    inner: Arc<Inner>,
}

struct Inner {
    // ---
    transport: TransportPtr,
    config: CorrelatorConfig,
    pending: PendingTable,
    counters: Counters,
    observer: Arc<dyn CorrelatorObserver>,
}

impl RequestCorrelator {
    // ---
    /// Create a correlator that reports events through [`TracingObserver`].
    pub fn new(transport: TransportPtr, config: CorrelatorConfig) -> Self {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }

    /// Create a correlator with a custom event hook.
    pub fn with_observer(
        transport: TransportPtr,
        config: CorrelatorConfig,
        observer: Arc<dyn CorrelatorObserver>,
    ) -> Self {
        // ---
        Self {
            inner: Arc::new(Inner {
                transport,
                config,
                pending: PendingTable::new(),
                counters: Counters::default(),
                observer,
            }),
        }
    }

    /// Send a CALL and return a future for its resolution.
    ///
    /// `timeout` of `None` uses the configured default. The returned future
    /// resolves exactly once with the response payload, an
    /// [`RpcError::Application`] for a CALLERROR, or
    /// [`RpcError::Protocol`], [`RpcError::Timeout`], [`RpcError::Cancelled`]
    /// or [`RpcError::ConnectionClosed`].
    ///
    /// Dropping the future does not withdraw the request; its entry stays
    /// until a response or the timeout removes it.
    ///
    /// # Errors
    ///
    /// Fails without registering anything on `InvalidTimeout`,
    /// `TooManyPending` or `Serialization`. A transport failure while
    /// transmitting withdraws the entry and is returned here.
    pub async fn send(
        &self,
        destination: &EndpointId,
        action: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<ResponseFuture> {
        // ---
        self.send_with_id(RequestId::generate(), destination, action, payload, timeout)
            .await
    }

    /// Like [`send`](Self::send), with a caller-chosen request id.
    ///
    /// # Errors
    ///
    /// Additionally fails with `DuplicateRequestId` if `request_id` is
    /// already in flight; the existing request is unaffected.
    pub async fn send_with_id(
        &self,
        request_id: RequestId,
        destination: &EndpointId,
        action: &str,
        payload: Value,
        timeout: Option<Duration>,
    ) -> Result<ResponseFuture> {
        // ---
        let inner = &self.inner;

        let timeout = timeout.unwrap_or(inner.config.default_timeout);
        if timeout.is_zero() {
            return Err(RpcError::InvalidTimeout);
        }

        if let Some(limit) = inner.config.max_pending {
            if inner.pending.len() >= limit {
                return Err(RpcError::TooManyPending(limit));
            }
        }

        let frame = Frame::Call(Call {
            request_id: request_id.clone(),
            action: action.to_string(),
            payload,
        });
        let bytes = frame.to_bytes()?;

        let (tx, rx) = oneshot::channel();
        inner.pending.register(
            request_id.clone(),
            PendingRequest::new(destination.clone(), action, timeout, tx),
        )?;

        let timer = tokio::spawn(expire_after(
            Arc::downgrade(inner),
            request_id.clone(),
            timeout,
        ));
        inner.pending.attach_timer(&request_id, timer.abort_handle());

        inner.counters.record_sent();
        inner.observer.on_sent(&RequestInfo {
            request_id: &request_id,
            destination,
            action,
        });

        if let Err(err) = inner.transport.send(destination, bytes).await {
            // If the entry is already gone, something else resolved it while
            // we were transmitting and the future carries that resolution.
            if let Some(entry) = inner.pending.take(&request_id) {
                log_debug!("{action} {request_id} to {destination} not sent: {err}");
                inner.finish(&request_id, entry, Err(err.clone()));
                return Err(err);
            }
        }

        Ok(ResponseFuture { request_id, rx })
    }

    /// Send a typed action and await its typed response.
    ///
    /// # Errors
    ///
    /// Any error from [`send`](Self::send) or from the resolution. A response
    /// payload that does not match `A::Response` is an
    /// [`RpcError::Protocol`].
    pub async fn call<A: Action>(
        &self,
        destination: &EndpointId,
        request: &A::Request,
        timeout: Option<Duration>,
    ) -> Result<A::Response> {
        // ---
        let payload = serde_json::to_value(request)?;
        let value = self.send(destination, A::NAME, payload, timeout).await?.await?;

        serde_json::from_value(value).map_err(|err| {
            RpcError::Protocol(format!("{} response does not match its schema: {err}", A::NAME))
        })
    }

    /// Feed one inbound frame from `source` to the correlator.
    ///
    /// Responses are matched and resolved here; CALL and SEND frames are
    /// returned untouched for the inbound side. Orphans and undecodable
    /// frames are logged, never fatal.
    pub fn on_message_received(&self, source: &EndpointId, raw: &[u8]) -> Dispatch {
        // ---
        match Frame::parse(raw) {
            Ok(Frame::CallResult(result)) => {
                self.complete(source, result.request_id, Ok(result.payload))
            }
            Ok(Frame::CallError(error)) => {
                let resolution = Err(RpcError::Application {
                    code: error.code,
                    description: error.description,
                    details: error.details,
                });
                self.complete(source, error.request_id, resolution)
            }
            Ok(Frame::CallResultError(error)) => {
                // The peer rejected a CALLRESULT we sent; nothing of ours is
                // waiting on it.
                log_warn!(
                    "{source} rejected our result for {}: {} {}",
                    error.request_id,
                    error.code,
                    error.description
                );
                Dispatch::Ignored
            }
            Ok(frame @ (Frame::Call(_) | Frame::Send(_))) => Dispatch::Inbound(frame),
            Err(err) => match (err.message_type, err.request_id.clone()) {
                // The caller is waiting and must be unblocked.
                (Some(message_type), Some(request_id)) if message_type.is_response() => {
                    self.complete(source, request_id, Err(RpcError::Protocol(err.reason)))
                }
                (Some(MessageType::Call), Some(_)) | (None, Some(_)) => Dispatch::Malformed(err),
                _ => {
                    log_warn!("dropping undecodable frame from {source}: {err}");
                    Dispatch::Ignored
                }
            },
        }
    }

    /// Withdraw a pending request; its caller receives [`RpcError::Cancelled`].
    ///
    /// Returns `false` if the request had already resolved. The CALL may
    /// already be on the wire; a response that arrives later is an orphan.
    pub fn cancel(&self, request_id: &RequestId) -> bool {
        // ---
        match self.inner.pending.take(request_id) {
            Some(entry) => {
                self.inner.finish(request_id, entry, Err(RpcError::Cancelled));
                true
            }
            None => false,
        }
    }

    /// Resolve every request sent to `destination` with
    /// [`RpcError::ConnectionClosed`]. Returns how many were resolved.
    pub fn connection_closed(&self, destination: &EndpointId) -> usize {
        // ---
        let entries = self.inner.pending.take_for_destination(destination);
        let count = entries.len();

        for (request_id, entry) in entries {
            self.inner.finish(&request_id, entry, Err(RpcError::ConnectionClosed));
        }

        if count > 0 {
            log_debug!("connection to {destination} closed with {count} requests pending");
        }
        count
    }

    /// Resolve every pending request with [`RpcError::ConnectionClosed`].
    pub fn close_all(&self) -> usize {
        // ---
        let entries = self.inner.pending.drain();
        let count = entries.len();

        for (request_id, entry) in entries {
            self.inner.finish(&request_id, entry, Err(RpcError::ConnectionClosed));
        }
        count
    }

    /// Number of requests currently in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, request_id: &RequestId) -> bool {
        self.inner.pending.contains(request_id)
    }

    pub fn stats(&self) -> CorrelatorStats {
        self.inner.counters.snapshot()
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.inner.config
    }

    pub fn transport(&self) -> &TransportPtr {
        &self.inner.transport
    }

    fn complete(
        &self,
        source: &EndpointId,
        request_id: RequestId,
        resolution: Resolution,
    ) -> Dispatch {
        // ---
        match self.inner.pending.take_from(&request_id, source) {
            Some(entry) => {
                self.inner.finish(&request_id, entry, resolution);
                Dispatch::Resolved(request_id)
            }
            None => {
                self.inner.counters.record_orphan();
                self.inner.observer.on_orphan(source, &request_id);
                Dispatch::Orphan(request_id)
            }
        }
    }
}

impl Inner {
    /// Deliver the single resolution of an entry that was just removed.
    fn finish(&self, request_id: &RequestId, entry: PendingRequest, resolution: Resolution) {
        // ---
        let outcome = Outcome::of(&resolution);
        self.counters.record(outcome);
        self.observer.on_resolved(
            &RequestInfo {
                request_id,
                destination: &entry.destination,
                action: &entry.action,
            },
            outcome,
            entry.submitted_at.elapsed(),
        );

        if !entry.deliver(resolution) {
            log_debug!("caller of {request_id} stopped waiting before {outcome:?}");
        }
    }
}

/// Timeout task: fires once, and only resolves the entry if it is still there.
async fn expire_after(inner: Weak<Inner>, request_id: RequestId, timeout: Duration) {
    // ---
    time::sleep(timeout).await;

    let Some(inner) = inner.upgrade() else {
        return;
    };

    if let Some(entry) = inner.pending.take(&request_id) {
        let after = entry.timeout;
        let timeout = RpcError::Timeout {
            request_id: request_id.clone(),
            after,
        };
        inner.finish(&request_id, entry, Err(timeout));
    }
}

/// Resolution of one sent CALL.
///
/// Resolves exactly once. If the correlator is dropped with the request still
/// pending, resolves with [`RpcError::ConnectionClosed`].
#[must_use = "a ResponseFuture does nothing unless awaited"]
#[derive(Debug)]
pub struct ResponseFuture {
    request_id: RequestId,
    rx: oneshot::Receiver<Resolution>,
}

impl ResponseFuture {
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // ---
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(resolution)) => Poll::Ready(resolution),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RpcError::ConnectionClosed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

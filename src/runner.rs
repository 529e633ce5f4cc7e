//! Receive loop.
//!
//! Glue between a transport inbox and the two protocol roles of a peer: the
//! [`RequestCorrelator`] (responses to our CALLs) and the [`CallRouter`]
//! (CALLs and SENDs from the other side).
//!
//! ## Ordering
//!
//! Inbound events are fed to the correlator one at a time, in the order the
//! transport delivered them. Responses are therefore resolved inline; inbound
//! CALLs are handed to their handler in a task of their own so that a slow
//! handler never delays the resolution of unrelated responses.
//!
//! ## Termination
//!
//! The loop ends when the inbox closes or the shutdown signal fires. Either
//! way every request still pending on the correlator is resolved with
//! `ConnectionClosed`: with the loop gone, no response can ever arrive.
//!
//! ## Error handling
//!
//! Nothing that arrives on the wire terminates the loop. Undecodable frames
//! and orphan responses are logged and dropped, and failures to send a reply
//! are logged.

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::{
    // ---
    log_debug,
    log_warn,
    CallRouter,
    Dispatch,
    EndpointId,
    Frame,
    InboundEvent,
    InboundHandle,
    RequestCorrelator,
    TransportPtr,
};

/// Spawn the receive loop over `handle`.
///
/// The returned task completes once the loop has stopped and the correlator
/// has been drained.
pub(crate) fn spawn_receive_loop(
    transport: TransportPtr,
    mut handle: InboundHandle,
    correlator: RequestCorrelator,
    router: CallRouter,
    mut shutdown: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        let node_id = transport.transport_id().clone();
        log_debug!("{node_id}: receive loop started");

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => {
                    log_debug!("{node_id}: shutdown requested");
                    break;
                }
                event = handle.inbox.recv() => event,
            };

            match event {
                Some(InboundEvent::Frame { source, payload }) => {
                    match correlator.on_message_received(&source, &payload) {
                        Dispatch::Inbound(frame) => {
                            spawn_handler(&transport, &router, source, frame);
                        }
                        Dispatch::Malformed(err) => {
                            log_warn!("{node_id}: malformed frame from {source}: {err}");
                            if let Some(reply) = CallRouter::reject_malformed(&err) {
                                tokio::spawn(send_reply(transport.clone(), source, reply));
                            }
                        }
                        Dispatch::Resolved(_) | Dispatch::Orphan(_) | Dispatch::Ignored => {}
                    }
                }
                Some(InboundEvent::Closed { peer }) => {
                    correlator.connection_closed(&peer);
                }
                None => {
                    log_debug!("{node_id}: inbox closed");
                    break;
                }
            }
        }

        let closed = correlator.close_all();
        log_debug!("{node_id}: receive loop stopped, {closed} requests closed");
    })
}

fn spawn_handler(transport: &TransportPtr, router: &CallRouter, source: EndpointId, frame: Frame) {
    // ---
    let transport = transport.clone();
    let router = router.clone();

    tokio::spawn(async move {
        if let Some(reply) = router.handle(&source, frame).await {
            send_reply(transport, source, reply).await;
        }
    });
}

async fn send_reply(transport: TransportPtr, destination: EndpointId, reply: Frame) {
    // ---
    let bytes = match reply.to_bytes() {
        Ok(bytes) => bytes,
        Err(err) => {
            log_warn!("cannot encode reply {} to {destination}: {err}", reply.request_id());
            return;
        }
    };

    if let Err(err) = transport.send(&destination, bytes).await {
        log_warn!("reply {} to {destination} not sent: {err}", reply.request_id());
    }
}

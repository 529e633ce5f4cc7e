//! OCPP-J request/response correlation with timeouts.
//!
//! OCPP runs RPC over a single WebSocket per charging station, with both
//! sides issuing CALLs and answers arriving in any order. This library tracks
//! every outgoing CALL by its request id, routes each CALLRESULT or
//! CALLERROR back to the caller waiting for it, and guarantees that each
//! caller is resolved exactly once: by the response, a timeout, a local
//! cancellation, or the connection going away. Responses that match nothing
//! are logged as orphans and dropped.
//!
//! The [`RpcPeer`] wraps a transport, the [`RequestCorrelator`] and a
//! [`CallRouter`] for inbound CALLs; the correlator can also be driven on its
//! own by feeding it frames with
//! [`on_message_received`](RequestCorrelator::on_message_received).

// Import all sub modules once...
mod macros;

mod config;
mod correlator;
mod domain;
mod error;
mod peer;
mod peer_builder;
mod protocol;
mod request_id;
mod retry;
mod router;
mod runner;
mod transport;

#[allow(unused_imports)]
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use peer::RpcPeer;
pub use peer_builder::RpcPeerBuilder;

pub use correlator::{
    //
    CorrelatorObserver,
    CorrelatorStats,
    Dispatch,
    Outcome,
    RequestCorrelator,
    RequestInfo,
    ResponseFuture,
    TracingObserver,
};
pub use router::CallRouter;

pub use config::{CorrelatorConfig, DEFAULT_REQUEST_TIMEOUT};
pub use retry::{retry_with_backoff, RetryConfig};

pub use error::{Result, RpcError};
pub use request_id::RequestId;

pub use protocol::{
    //
    Action,
    Call,
    CallError,
    CallResult,
    ErrorCode,
    Frame,
    FrameError,
    MessageType,
};

pub use transport::{create_memory_transport, create_memory_transport_with_hub, MemoryHub};

// --- public re-exports
pub use domain::{
    //
    EndpointId,
    InboundEvent,
    InboundHandle,
    Transport,
    TransportBase,
    TransportPtr,
};

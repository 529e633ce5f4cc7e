//! Domain layer public interface.
//!
//! Abstractions here are independent of concrete transports and of the OCPP
//! wire format. Consumers import symbols via this module, not by referencing
//! individual files directly.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
    //
    EndpointId,
    InboundEvent,
    InboundHandle,
    Transport,
    TransportBase,
    TransportPtr,
};

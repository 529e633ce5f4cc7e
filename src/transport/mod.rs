//! Transport implementations.
//!
//! Concrete implementations of the domain-level `Transport` trait, exposed
//! only through constructor functions. Correlation code must not depend on
//! transport-specific types.

mod memory;

pub use memory::{create_memory_transport, create_memory_transport_with_hub, MemoryHub};

//! Deterministic simulation harness for UACP connections.
//!
//! Turmoil-backed implementations of the transport traits, so dialers and
//! listeners run unchanged over a simulated network with latency, loss and
//! partitions.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod sim_transport;

pub use sim_transport::{SimAcceptor, SimConnector, SimStream};

//! OPC UA Connection Protocol (UACP) transport layer.
//!
//! Turns a byte stream into a [`Conn`]: a connection whose buffer sizes and
//! message limits were agreed through the `HEL`/`ACK` handshake. Everything
//! above this layer (secure channel, sessions, services) only ever sees an
//! established [`Conn`].
//!
//! # Architecture
//!
//! The handshake rules live in sans-IO state machines ([`handshake`]) that
//! take decoded frames and return what to do next. [`Dialer`] and
//! [`Listener`] drive those machines over a [`Transport`], which is TCP in
//! production and an in-memory pipe or simulated network in tests.
//!
//! # Components
//!
//! - [`conn`]: Established connection, framed send/receive, deadlines
//! - [`handshake`]: Client and server handshake state machines
//! - [`dialer`]: Client entry point
//! - [`listener`]: Server entry point, including reverse connect
//! - [`transport`]: Transport capability traits (TCP, in-memory)
//! - [`endpoint`]: `opc.tcp://` URL parsing
//! - [`ids`]: Connection id allocation
//! - [`limits`]: Default and negotiated limits
//! - [`error`]: Error types
#![forbid(unsafe_code)]

pub mod conn;
pub mod dialer;
pub mod endpoint;
pub mod error;
pub mod handshake;
pub mod ids;
pub mod limits;
pub mod listener;
pub mod transport;

pub use conn::Conn;
pub use dialer::{Dialer, DialerConfig, dial};
pub use endpoint::Endpoint;
pub use error::{ConnError, EndpointError, HandshakeError};
pub use handshake::{ClientHandshake, HandshakeState, Negotiated, ServerAction, ServerHandshake};
pub use ids::{ConnId, ConnIdAllocator};
pub use limits::Limits;
pub use listener::{Listener, ListenerConfig};
pub use transport::{Acceptor, Connector, Transport};

//! Transport abstraction for the connection protocol.
//!
//! A [`Transport`] is one bidirectional byte stream. [`Connector`] opens
//! streams to an endpoint and [`Acceptor`] hands out incoming ones.
//! Production uses TCP ([`tcp`]); tests use an in-memory pipe ([`memory`])
//! or a simulated network.
//!
//! Read and write deadlines are not part of the trait: [`crate::Conn`]
//! applies them on top of any transport.

pub mod memory;
pub mod tcp;

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::endpoint::Endpoint;

/// One bidirectional byte stream.
#[async_trait]
pub trait Transport: AsyncRead + AsyncWrite + Unpin + Send + 'static {
    /// Local address of the stream.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Address of the peer.
    fn peer_addr(&self) -> io::Result<SocketAddr>;

    /// Shut the stream down. Called at most once per stream by
    /// [`crate::Conn`]; the stream is dropped right after.
    async fn close(&mut self) -> io::Result<()>;
}

/// Opens outbound streams.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced.
    type Stream: Transport;

    /// Connect to the host and port named by `endpoint`.
    async fn connect(&self, endpoint: &Endpoint) -> io::Result<Self::Stream>;
}

/// Hands out inbound streams.
#[async_trait]
pub trait Acceptor: Send + Sync + 'static {
    /// Stream type produced.
    type Stream: Transport;

    /// Wait for the next inbound stream.
    async fn accept(&self) -> io::Result<Self::Stream>;

    /// Address the acceptor is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

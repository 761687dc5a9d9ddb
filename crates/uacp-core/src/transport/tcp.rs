//! TCP transport on `tokio::net`.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
};

use super::{Acceptor, Connector, Transport};
use crate::endpoint::Endpoint;

#[async_trait]
impl Transport for TcpStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::local_addr(self)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        TcpStream::peer_addr(self)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.shutdown().await
    }
}

/// Dials endpoints over TCP, resolving host names through the system
/// resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<TcpStream> {
        let stream = TcpStream::connect((endpoint.host(), endpoint.port())).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Accepts TCP connections.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Bind to the host and port of `endpoint`.
    pub async fn bind(endpoint: &Endpoint) -> io::Result<Self> {
        let listener = TcpListener::bind((endpoint.host(), endpoint.port())).await?;
        Ok(Self { listener })
    }

    /// Wrap an already bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listener }
    }
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<TcpStream> {
        let (stream, _) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

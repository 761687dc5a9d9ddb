//! Transport over `turmoil::net` TCP.

use std::{
    io,
    net::{Ipv4Addr, SocketAddr},
    pin::Pin,
    task::{Context, Poll},
};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadBuf};
use tracing::debug;
use turmoil::net::{TcpListener, TcpStream};
use uacp_core::{Acceptor, Connector, Endpoint, Transport};

/// Simulated TCP stream.
pub struct SimStream {
    inner: TcpStream,
}

impl AsyncRead for SimStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for SimStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[async_trait]
impl Transport for SimStream {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.inner.peer_addr()
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}

/// Dials simulated hosts by name; the endpoint host must be a turmoil host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimConnector;

impl SimConnector {
    /// Open a raw stream to `endpoint`, without any handshake.
    pub async fn connect_raw(endpoint: &Endpoint) -> io::Result<SimStream> {
        let authority = endpoint.authority();
        let inner = TcpStream::connect(authority.as_str()).await?;
        Ok(SimStream { inner })
    }
}

#[async_trait]
impl Connector for SimConnector {
    type Stream = SimStream;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<SimStream> {
        Self::connect_raw(endpoint).await
    }
}

/// Accepts simulated TCP connections on the current host.
pub struct SimAcceptor {
    listener: TcpListener,
}

impl SimAcceptor {
    /// Listen on `port` on all addresses of the current host.
    pub async fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port))).await?;
        Ok(Self { listener })
    }
}

#[async_trait]
impl Acceptor for SimAcceptor {
    type Stream = SimStream;

    async fn accept(&self) -> io::Result<SimStream> {
        let (inner, peer) = self.listener.accept().await?;
        debug!(%peer, "sim accept");
        Ok(SimStream { inner })
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

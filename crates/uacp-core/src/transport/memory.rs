//! In-memory transport over `tokio::io::duplex`.
//!
//! Deterministic and socket-free: handshakes can be exercised byte for byte
//! in unit tests. Every stream reports its `close` calls to a
//! [`CloseCounter`], so tests can check that a transport was released
//! exactly once.

use std::{
    collections::HashMap,
    io,
    net::{Ipv4Addr, SocketAddr},
    pin::Pin,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    task::{Context, Poll},
};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf},
    sync::{Mutex as AsyncMutex, mpsc},
};

use super::{Acceptor, Connector, Transport};
use crate::endpoint::Endpoint;

/// Pipe capacity per direction.
pub const DEFAULT_CAPACITY: usize = 256 * 1024;

/// Counts `close` calls on the streams it is attached to.
#[derive(Debug, Clone, Default)]
pub struct CloseCounter(Arc<AtomicUsize>);

impl CloseCounter {
    /// Number of `close` calls so far.
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// One end of an in-memory pipe.
#[derive(Debug)]
pub struct MemoryTransport {
    inner: DuplexStream,
    local: SocketAddr,
    peer: SocketAddr,
    closes: CloseCounter,
}

impl MemoryTransport {
    /// Counter this stream reports `close` calls to.
    pub fn close_counter(&self) -> CloseCounter {
        self.closes.clone()
    }
}

/// Connected pair of in-memory streams on loopback addresses.
pub fn pair(capacity: usize) -> (MemoryTransport, MemoryTransport) {
    let a = SocketAddr::from((Ipv4Addr::LOCALHOST, 1));
    let b = SocketAddr::from((Ipv4Addr::LOCALHOST, 2));
    connected(capacity, (a, CloseCounter::default()), (b, CloseCounter::default()))
}

fn connected(
    capacity: usize,
    (a_addr, a_closes): (SocketAddr, CloseCounter),
    (b_addr, b_closes): (SocketAddr, CloseCounter),
) -> (MemoryTransport, MemoryTransport) {
    let (a, b) = tokio::io::duplex(capacity);
    (
        MemoryTransport { inner: a, local: a_addr, peer: b_addr, closes: a_closes },
        MemoryTransport { inner: b, local: b_addr, peer: a_addr, closes: b_closes },
    )
}

impl AsyncRead for MemoryTransport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl AsyncWrite for MemoryTransport {
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
impl Transport for MemoryTransport {
    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.local)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer)
    }

    async fn close(&mut self) -> io::Result<()> {
        self.closes.record();
        self.inner.shutdown().await
    }
}

struct Route {
    addr: SocketAddr,
    incoming: mpsc::UnboundedSender<MemoryTransport>,
}

#[derive(Default)]
struct Routes {
    listeners: HashMap<String, Route>,
    next_host: u8,
    next_port: u16,
}

/// A tiny in-process network: listeners register under `host:port`,
/// connectors reach them by endpoint authority.
#[derive(Clone, Default)]
pub struct MemoryNetwork {
    routes: Arc<Mutex<Routes>>,
}

impl MemoryNetwork {
    /// Empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start listening on `authority` (`host:port`).
    ///
    /// Each listener gets its own loopback address so peers can tell them
    /// apart.
    pub fn listen(&self, authority: &str) -> io::Result<MemoryAcceptor> {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        if routes.listeners.get(authority).is_some_and(|r| !r.incoming.is_closed()) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                format!("{authority} already in use"),
            ));
        }

        routes.next_host = routes.next_host.wrapping_add(1);
        let port = authority.rsplit_once(':').and_then(|(_, p)| p.parse().ok()).unwrap_or(0);
        let addr = SocketAddr::from((Ipv4Addr::new(127, 0, 1, routes.next_host), port));

        let (tx, rx) = mpsc::unbounded_channel();
        routes.listeners.insert(authority.to_string(), Route { addr, incoming: tx });
        Ok(MemoryAcceptor { addr, incoming: AsyncMutex::new(rx), closes: CloseCounter::default() })
    }

    /// Connector dialing into this network.
    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector { network: self.clone(), closes: CloseCounter::default() }
    }

    fn route(
        &self,
        authority: &str,
    ) -> Option<(SocketAddr, mpsc::UnboundedSender<MemoryTransport>)> {
        let routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes.listeners.get(authority).map(|r| (r.addr, r.incoming.clone()))
    }

    fn ephemeral_addr(&self) -> SocketAddr {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        routes.next_port = routes.next_port.wrapping_add(1);
        SocketAddr::from((Ipv4Addr::LOCALHOST, 49152_u16.wrapping_add(routes.next_port)))
    }
}

/// Dials listeners of a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryConnector {
    network: MemoryNetwork,
    closes: CloseCounter,
}

impl MemoryConnector {
    /// Close calls on every stream this connector produced.
    pub fn close_counter(&self) -> CloseCounter {
        self.closes.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Stream = MemoryTransport;

    async fn connect(&self, endpoint: &Endpoint) -> io::Result<MemoryTransport> {
        let authority = endpoint.authority();
        let refused = || {
            let reason = format!("nothing listens on {authority}");
            io::Error::new(io::ErrorKind::ConnectionRefused, reason)
        };

        let (server_addr, incoming) = self.network.route(&authority).ok_or_else(refused)?;
        let (client, server) = connected(
            DEFAULT_CAPACITY,
            (self.network.ephemeral_addr(), self.closes.clone()),
            (server_addr, CloseCounter::default()),
        );
        incoming.send(server).map_err(|_| refused())?;
        Ok(client)
    }
}

/// Accepts streams dialed to one authority of a [`MemoryNetwork`].
pub struct MemoryAcceptor {
    addr: SocketAddr,
    incoming: AsyncMutex<mpsc::UnboundedReceiver<MemoryTransport>>,
    closes: CloseCounter,
}

impl MemoryAcceptor {
    /// Close calls on every stream this acceptor handed out.
    pub fn close_counter(&self) -> CloseCounter {
        self.closes.clone()
    }
}

#[async_trait]
impl Acceptor for MemoryAcceptor {
    type Stream = MemoryTransport;

    async fn accept(&self) -> io::Result<MemoryTransport> {
        let mut stream = self.incoming.lock().await.recv().await.ok_or_else(|| {
            io::Error::new(io::ErrorKind::ConnectionAborted, "memory network shut down")
        })?;
        stream.closes = self.closes.clone();
        Ok(stream)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn connector_reaches_listener_by_authority() {
        let net = MemoryNetwork::new();
        let acceptor = net.listen("plc:4840").unwrap();
        let endpoint = Endpoint::parse("opc.tcp://plc:4840/ua").unwrap();

        let mut client = net.connector().connect(&endpoint).await.unwrap();
        let mut server = acceptor.accept().await.unwrap();

        client.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
        assert_eq!(Transport::peer_addr(&client).unwrap(), acceptor.local_addr().unwrap());
    }

    #[tokio::test]
    async fn unknown_authority_is_refused() {
        let net = MemoryNetwork::new();
        let endpoint = Endpoint::parse("opc.tcp://nowhere:4840").unwrap();
        let err = net.connector().connect(&endpoint).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn close_is_counted_and_seen_as_eof() {
        let (mut a, mut b) = pair(64);
        let closes = a.close_counter();
        a.close().await.unwrap();
        assert_eq!(closes.get(), 1);

        let mut buf = [0u8; 1];
        assert_eq!(b.read(&mut buf).await.unwrap(), 0);
    }

    #[test]
    fn listening_twice_on_one_authority_fails() {
        let net = MemoryNetwork::new();
        let _first = net.listen("plc:4840").unwrap();
        let err = net.listen("plc:4840").err().map(|e| e.kind());
        assert_eq!(err, Some(io::ErrorKind::AddrInUse));
    }
}

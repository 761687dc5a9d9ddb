//! Client entry point: open a transport and run the client handshake.

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
    conn::Conn,
    endpoint::Endpoint,
    error::ConnError,
    handshake::ClientHandshake,
    ids::ConnIdAllocator,
    limits::Limits,
    transport::{Connector, Transport, tcp::TcpConnector},
};

/// Default time allowed for connect plus handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Dialer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialerConfig {
    /// Limits proposed in the hello
    pub limits: Limits,
    /// Deadline for the hello/acknowledge exchange (`None` = wait forever)
    pub handshake_timeout: Option<Duration>,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self { limits: Limits::client(), handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT) }
    }
}

/// Opens client connections.
///
/// Connection ids come from the injected [`ConnIdAllocator`]; share one
/// allocator between dialers and listeners that log to the same place.
#[derive(Debug)]
pub struct Dialer<C = TcpConnector> {
    connector: C,
    config: DialerConfig,
    ids: Arc<ConnIdAllocator>,
}

impl Dialer<TcpConnector> {
    /// TCP dialer using the process-wide id allocator.
    pub fn new(config: DialerConfig) -> Self {
        Self::with_connector(TcpConnector, config, ConnIdAllocator::process())
    }
}

impl Default for Dialer<TcpConnector> {
    fn default() -> Self {
        Self::new(DialerConfig::default())
    }
}

impl<C: Connector> Dialer<C> {
    /// Dialer over an arbitrary transport.
    pub fn with_connector(connector: C, config: DialerConfig, ids: Arc<ConnIdAllocator>) -> Self {
        Self { connector, config, ids }
    }

    /// Configuration in use.
    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    /// Connect to `endpoint` and complete the handshake.
    ///
    /// On any failure after the transport is open, the transport is closed
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// - `ConnError::Endpoint` if the URL does not parse
    /// - `ConnError::Connect` if the transport cannot be opened
    /// - `ConnError::Handshake` if the server rejects or misbehaves
    /// - `ConnError::Io` on transport failure or handshake timeout
    pub async fn dial(&self, endpoint: &str) -> Result<Conn<C::Stream>, ConnError> {
        dial_with(&self.connector, &self.ids, &self.config, endpoint).await
    }
}

/// Dial `endpoint` over TCP with the default configuration.
pub async fn dial(endpoint: &str) -> Result<Conn, ConnError> {
    Dialer::default().dial(endpoint).await
}

/// Shared by [`Dialer::dial`] and the listener's reverse connect.
pub(crate) async fn dial_with<C: Connector>(
    connector: &C,
    ids: &ConnIdAllocator,
    config: &DialerConfig,
    url: &str,
) -> Result<Conn<C::Stream>, ConnError> {
    let endpoint = Endpoint::parse(url)?;
    info!(endpoint = url, "connecting");
    let stream = connector
        .connect(&endpoint)
        .await
        .map_err(|source| ConnError::Connect { endpoint: url.to_string(), source })?;

    let mut conn = Conn::handshaking(ids.next_id(), stream, config.limits.with_default_buffers());
    if let Some(timeout) = config.handshake_timeout {
        conn.set_deadline(Some(Instant::now() + timeout));
    }

    match client_handshake(&mut conn, url, config.limits).await {
        Ok(()) => {
            conn.set_deadline(None);
            info!(conn_id = %conn.id(), endpoint = url, limits = ?conn.limits(), "connected");
            Ok(conn)
        },
        Err(err) => {
            warn!(conn_id = %conn.id(), endpoint = url, error = %err, "handshake failed");
            conn.release().await;
            Err(err)
        },
    }
}

async fn client_handshake<T: Transport>(
    conn: &mut Conn<T>,
    url: &str,
    proposed: Limits,
) -> Result<(), ConnError> {
    let mut handshake = ClientHandshake::new(url, proposed);
    let hello = handshake.start()?;
    conn.send_control(&hello).await?;

    let reply = conn.recv_frame().await?;
    let negotiated = handshake.handle_frame(&reply)?;
    debug!(conn_id = %conn.id(), ack = ?negotiated.ack, "recv ACK");
    conn.establish(negotiated);
    Ok(())
}

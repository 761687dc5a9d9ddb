//! Server entry point: accept transports and run the server handshake.
//!
//! A client that cannot accept inbound connections may instead send a
//! reverse hello naming a server URI. The listener then drops the inbound
//! connection, dials that URI as a client and hands back the outbound
//! connection from [`Listener::accept`].

use std::{net::SocketAddr, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uacp_proto::{ControlMessage, StatusCode};

use crate::{
    conn::Conn,
    dialer::{DEFAULT_HANDSHAKE_TIMEOUT, DialerConfig, dial_with},
    endpoint::Endpoint,
    error::ConnError,
    handshake::{ServerAction, ServerHandshake},
    ids::ConnIdAllocator,
    limits::Limits,
    transport::{Acceptor, Connector, tcp::{TcpAcceptor, TcpConnector}},
};

/// Listener configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Limits offered in the acknowledge, revised down per client
    pub limits: Limits,
    /// Deadline for receiving the first frame and sending the reply
    pub handshake_timeout: Option<Duration>,
    /// How reverse hello redirects are dialed
    pub reverse_connect: DialerConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            limits: Limits::server(),
            handshake_timeout: Some(DEFAULT_HANDSHAKE_TIMEOUT),
            reverse_connect: DialerConfig::default(),
        }
    }
}

/// Accepts UACP connections for one endpoint URL.
#[derive(Debug)]
pub struct Listener<A = TcpAcceptor, C = TcpConnector> {
    acceptor: A,
    connector: C,
    endpoint: String,
    config: ListenerConfig,
    ids: Arc<ConnIdAllocator>,
}

impl Listener<TcpAcceptor, TcpConnector> {
    /// Bind a TCP listener for `endpoint`.
    ///
    /// Clients must send exactly this URL in their hello.
    pub async fn bind(endpoint: &str, config: ListenerConfig) -> Result<Self, ConnError> {
        let parsed = Endpoint::parse(endpoint)?;
        let acceptor = TcpAcceptor::bind(&parsed).await?;
        Ok(Self::with_acceptor(
            acceptor,
            TcpConnector,
            endpoint,
            config,
            ConnIdAllocator::process(),
        ))
    }
}

impl<A, C> Listener<A, C>
where
    A: Acceptor,
    C: Connector<Stream = A::Stream>,
{
    /// Listener over an arbitrary transport. `connector` is only used for
    /// reverse connects.
    pub fn with_acceptor(
        acceptor: A,
        connector: C,
        endpoint: impl Into<String>,
        config: ListenerConfig,
        ids: Arc<ConnIdAllocator>,
    ) -> Self {
        Self { acceptor, connector, endpoint: endpoint.into(), config, ids }
    }

    /// Endpoint URL clients must ask for.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Configuration in use.
    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Address the acceptor is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ConnError> {
        Ok(self.acceptor.local_addr()?)
    }

    /// Wait for the next connection and complete its handshake.
    ///
    /// A failed handshake sends the client an `ERR` frame where possible,
    /// closes the transport and returns the error; the listener itself stays
    /// usable. Callers typically log the error and accept again.
    pub async fn accept(&self) -> Result<Conn<A::Stream>, ConnError> {
        let stream = self.acceptor.accept().await?;
        let mut conn =
            Conn::handshaking(self.ids.next_id(), stream, self.config.limits.with_defaults());
        debug!(conn_id = %conn.id(), peer = ?conn.peer_addr().ok(), "accepted");
        if let Some(timeout) = self.config.handshake_timeout {
            conn.set_deadline(Some(Instant::now() + timeout));
        }

        let first = match conn.recv_frame().await {
            Ok(frame) => frame,
            Err(err) => {
                warn!(conn_id = %conn.id(), error = %err, "failed to read first frame");
                conn.send_error(StatusCode::BAD_TCP_INTERNAL_ERROR, None).await;
                conn.release().await;
                return Err(err);
            },
        };

        let mut handshake = ServerHandshake::new(self.endpoint.as_str(), self.config.limits);
        match handshake.handle_first_frame(&first) {
            ServerAction::Acknowledge(negotiated) => {
                let ack = ControlMessage::Acknowledge(negotiated.ack);
                if let Err(err) = conn.send_control(&ack).await {
                    warn!(conn_id = %conn.id(), error = %err, "failed to send ACK");
                    conn.release().await;
                    return Err(err);
                }
                conn.establish(negotiated);
                conn.set_deadline(None);
                info!(conn_id = %conn.id(), limits = ?conn.limits(), "accepted connection");
                Ok(conn)
            },
            ServerAction::Redirect(rhe) => {
                info!(
                    conn_id = %conn.id(),
                    server_uri = %rhe.server_uri,
                    "reverse hello, connecting back"
                );
                conn.release().await;
                dial_with(&self.connector, &self.ids, &self.config.reverse_connect, &rhe.server_uri)
                    .await
            },
            ServerAction::Reject(err) => {
                warn!(conn_id = %conn.id(), error = %err, "handshake rejected");
                conn.send_error(err.status_code(), Some(err.to_string())).await;
                conn.release().await;
                Err(err.into())
            },
        }
    }

    /// Stop accepting. Established connections are not affected.
    ///
    /// The listening socket is owned by the acceptor and released when the
    /// listener is dropped; `close` consumes the listener so that happens
    /// here, and records it in the log.
    pub fn close(self) {
        debug!(endpoint = %self.endpoint, "listener closed");
    }
}

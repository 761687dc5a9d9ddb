//! Error types for connections and handshakes.

use std::io;

use thiserror::Error;
use uacp_proto::{MessageType, ProtocolError, StatusCode};

use crate::handshake::HandshakeState;

/// Errors raised while parsing an endpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// URL has no `scheme://` prefix
    #[error("endpoint {0:?} has no scheme")]
    MissingScheme(String),

    /// Scheme other than `opc.tcp`
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    /// Host part is empty or malformed
    #[error("endpoint {0:?} has an invalid host")]
    InvalidHost(String),

    /// Port is not a valid u16
    #[error("endpoint {0:?} has an invalid port")]
    InvalidPort(String),
}

/// Handshake protocol violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// Peer sent a message that is not valid at this point
    #[error("got {got} want {expected}")]
    UnexpectedMessage {
        /// Message the handshake was waiting for
        expected: MessageType,
        /// Message that arrived
        got: MessageType,
    },

    /// Server answered the hello with an error frame
    #[error("server rejected hello: {code}{}", reason_suffix(.reason))]
    Rejected {
        /// Status code from the `ERR` frame
        code: StatusCode,
        /// Reason from the `ERR` frame
        reason: Option<String>,
    },

    /// Peer speaks a protocol version we do not
    #[error("invalid version {0}")]
    UnsupportedVersion(u32),

    /// Hello or reverse hello addressed to another endpoint
    #[error("invalid endpoint url {got:?}, listening on {expected:?}")]
    EndpointMismatch {
        /// Endpoint this listener serves
        expected: String,
        /// Endpoint the peer asked for
        got: String,
    },

    /// Control payload could not be decoded
    #[error("decode {message_type} failed: {source}")]
    Decode {
        /// Message type being decoded
        message_type: MessageType,
        /// Underlying wire error
        source: ProtocolError,
    },

    /// Operation not valid in the current handshake state
    #[error("cannot {operation} in state {state:?}")]
    InvalidState {
        /// Current state
        state: HandshakeState,
        /// Attempted operation
        operation: &'static str,
    },
}

impl HandshakeError {
    /// Status code a server sends before dropping the connection.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::EndpointMismatch { .. } => StatusCode::BAD_TCP_ENDPOINT_URL_INVALID,
            Self::UnsupportedVersion(_) => StatusCode::BAD_PROTOCOL_VERSION_UNSUPPORTED,
            _ => StatusCode::BAD_TCP_INTERNAL_ERROR,
        }
    }
}

/// Errors returned by [`crate::Conn`], [`crate::Dialer`] and
/// [`crate::Listener`].
#[derive(Debug, Error)]
pub enum ConnError {
    /// Endpoint URL could not be parsed
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),

    /// Transport connection could not be opened
    #[error("connect to {endpoint} failed: {source}")]
    Connect {
        /// Endpoint being dialed
        endpoint: String,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Handshake protocol violation
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Framing or size limit violation
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Transport I/O failure, including deadline expiry
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// Peer sent an `ERR` frame
    #[error("peer sent error {code}{}", reason_suffix(.reason))]
    PeerError {
        /// Status code from the `ERR` frame
        code: StatusCode,
        /// Reason from the `ERR` frame
        reason: Option<String>,
    },

    /// Handshake-only message on an established connection, or a control
    /// type passed where a data message was expected
    #[error("unexpected {0} message on established connection")]
    UnexpectedMessage(MessageType),

    /// An earlier send or receive failed midway; the stream is unusable
    #[error("connection is broken by an earlier i/o failure")]
    Broken,

    /// Connection was already closed
    #[error("connection already closed")]
    AlreadyClosed,
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default()
}

impl ConnError {
    /// True if the error came from a deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Io(err) if err.kind() == io::ErrorKind::TimedOut)
    }
}

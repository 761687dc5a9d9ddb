//! HEL/ACK handshake state machines.
//!
//! Both sides are pure: they consume decoded frames and return what the
//! driver ([`crate::Dialer`] or [`crate::Listener`]) must do next. No I/O
//! happens here, so every transition can be tested without a transport.
//!
//! # Client
//!
//! ```text
//! ┌────────────┐  start   ┌───────────┐   ACK    ┌─────────────┐
//! │ Connecting │─────────>│ HelloSent │─────────>│ Established │
//! └────────────┘          └───────────┘          └─────────────┘
//!                               │ ERR / other
//!                               ↓
//!                          ┌────────┐
//!                          │ Failed │
//!                          └────────┘
//! ```
//!
//! # Server
//!
//! ```text
//! ┌────────────────────┐   HEL    ┌─────────────┐
//! │ AwaitingFirstFrame │─────────>│ Established │
//! └────────────────────┘          └─────────────┘
//!        │       │ RHE            ┌─────────────┐
//!        │       └───────────────>│ Redirecting │
//!        │ other / bad endpoint   └─────────────┘
//!        ↓
//!   ┌────────┐
//!   │ Failed │
//!   └────────┘
//! ```

use tracing::debug;
use uacp_proto::{
    Acknowledge, ChunkLimits, ControlMessage, Frame, MessageType, PROTOCOL_VERSION, ReverseHello,
};

use crate::{
    error::HandshakeError,
    limits::{self, Limits},
};

/// Handshake state, shared by both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Client: transport open, hello not sent yet
    Connecting,
    /// Client: hello sent, waiting for the acknowledge
    HelloSent,
    /// Server: waiting for the peer's first frame
    AwaitingFirstFrame,
    /// Limits agreed, connection usable
    Established,
    /// Server: peer asked us to connect back to it
    Redirecting,
    /// Handshake failed; the connection must be closed
    Failed,
}

/// Result of a successful handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiated {
    /// Acknowledge that fixed the limits, zero limits already replaced
    pub ack: Acknowledge,
    /// Limits from the local side's point of view
    pub limits: Limits,
    /// Bounds on messages this side sends
    pub send_chunks: ChunkLimits,
    /// Bounds on messages this side accepts
    pub receive_chunks: ChunkLimits,
}

/// Client side of the handshake.
#[derive(Debug, Clone)]
pub struct ClientHandshake {
    state: HandshakeState,
    endpoint_url: String,
    proposed: Limits,
}

impl ClientHandshake {
    /// Handshake proposing `proposed` to `endpoint_url`.
    pub fn new(endpoint_url: impl Into<String>, proposed: Limits) -> Self {
        Self {
            state: HandshakeState::Connecting,
            endpoint_url: endpoint_url.into(),
            proposed: proposed.with_default_buffers(),
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Produce the hello to send.
    ///
    /// # Errors
    ///
    /// - `HandshakeError::InvalidState` if the hello was already produced
    pub fn start(&mut self) -> Result<ControlMessage, HandshakeError> {
        if self.state != HandshakeState::Connecting {
            return Err(HandshakeError::InvalidState { state: self.state, operation: "send hello" });
        }
        self.state = HandshakeState::HelloSent;
        Ok(ControlMessage::Hello(self.proposed.hello(self.endpoint_url.as_str())))
    }

    /// Handle the server's reply to the hello.
    ///
    /// Only an acknowledge completes the handshake. An `ERR` frame becomes
    /// [`HandshakeError::Rejected`], anything else is unexpected. Zero
    /// message limits in the acknowledge are replaced by the defaults.
    pub fn handle_frame(&mut self, frame: &Frame) -> Result<Negotiated, HandshakeError> {
        if self.state != HandshakeState::HelloSent {
            return Err(HandshakeError::InvalidState {
                state: self.state,
                operation: "handle reply",
            });
        }

        let result = self.negotiate(frame);
        self.state = match result {
            Ok(_) => HandshakeState::Established,
            Err(_) => HandshakeState::Failed,
        };
        result
    }

    fn negotiate(&self, frame: &Frame) -> Result<Negotiated, HandshakeError> {
        let ack = match decode_control(frame, MessageType::Acknowledge)? {
            ControlMessage::Acknowledge(ack) => ack,
            ControlMessage::Error(err) => {
                return Err(HandshakeError::Rejected { code: err.code, reason: err.reason });
            },
            other => {
                return Err(HandshakeError::UnexpectedMessage {
                    expected: MessageType::Acknowledge,
                    got: other.message_type(),
                });
            },
        };

        if ack.version != PROTOCOL_VERSION {
            return Err(HandshakeError::UnsupportedVersion(ack.version));
        }

        let completed = limits::complete_acknowledge(ack);
        if completed.max_message_size != ack.max_message_size {
            debug!(
                max_message_size = completed.max_message_size,
                "server left max message size to client"
            );
        }
        if completed.max_chunk_count != ack.max_chunk_count {
            debug!(
                max_chunk_count = completed.max_chunk_count,
                "server left max chunk count to client"
            );
        }

        // the server's acknowledge cannot raise what we said we accept
        let local = limits::client_limits(&self.proposed, &completed);
        let receive_chunks = limits::narrow_message_limits(
            local.receive_chunk_limits(),
            self.proposed.max_message_size,
            self.proposed.max_chunk_count,
        );
        Ok(Negotiated {
            ack: completed,
            limits: local,
            send_chunks: local.send_chunk_limits(),
            receive_chunks,
        })
    }
}

/// What a listener does after the first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send this acknowledge; the connection is established
    Acknowledge(Negotiated),
    /// Close the inbound connection and dial the server in the reverse hello
    Redirect(ReverseHello),
    /// Send an `ERR` frame with `error.status_code()` and close
    Reject(HandshakeError),
}

/// Server side of the handshake.
#[derive(Debug, Clone)]
pub struct ServerHandshake {
    state: HandshakeState,
    endpoint_url: String,
    limits: Limits,
}

impl ServerHandshake {
    /// Handshake for a listener serving `endpoint_url` with `limits`.
    pub fn new(endpoint_url: impl Into<String>, limits: Limits) -> Self {
        Self {
            state: HandshakeState::AwaitingFirstFrame,
            endpoint_url: endpoint_url.into(),
            limits,
        }
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Decide what to do with the peer's first frame.
    ///
    /// The endpoint URL in a hello or reverse hello must match the
    /// listener's exactly. Buffer sizes are revised down to what the client
    /// offered; the hello's version is not checked.
    pub fn handle_first_frame(&mut self, frame: &Frame) -> ServerAction {
        if self.state != HandshakeState::AwaitingFirstFrame {
            return ServerAction::Reject(HandshakeError::InvalidState {
                state: self.state,
                operation: "handle first frame",
            });
        }

        let action = self.decide(frame);
        self.state = match action {
            ServerAction::Acknowledge(_) => HandshakeState::Established,
            ServerAction::Redirect(_) => HandshakeState::Redirecting,
            ServerAction::Reject(_) => HandshakeState::Failed,
        };
        action
    }

    fn decide(&self, frame: &Frame) -> ServerAction {
        let msg = match decode_control(frame, MessageType::Hello) {
            Ok(msg) => msg,
            Err(err) => return ServerAction::Reject(err),
        };

        match msg {
            ControlMessage::Hello(hello) => {
                if let Err(err) = self.check_endpoint(&hello.endpoint_url) {
                    return ServerAction::Reject(err);
                }
                let ack = limits::revise_for_hello(&self.limits, &hello);
                let local = limits::server_limits(&ack);
                // never send more than the client said it accepts
                let send_chunks = limits::narrow_message_limits(
                    local.send_chunk_limits(),
                    hello.max_message_size,
                    hello.max_chunk_count,
                );
                ServerAction::Acknowledge(Negotiated {
                    ack,
                    limits: local,
                    send_chunks,
                    receive_chunks: local.receive_chunk_limits(),
                })
            },
            ControlMessage::ReverseHello(rhe) => match self.check_endpoint(&rhe.endpoint_url) {
                Ok(()) => ServerAction::Redirect(rhe),
                Err(err) => ServerAction::Reject(err),
            },
            other => ServerAction::Reject(HandshakeError::UnexpectedMessage {
                expected: MessageType::Hello,
                got: other.message_type(),
            }),
        }
    }

    fn check_endpoint(&self, got: &str) -> Result<(), HandshakeError> {
        if got == self.endpoint_url {
            Ok(())
        } else {
            Err(HandshakeError::EndpointMismatch {
                expected: self.endpoint_url.clone(),
                got: got.to_string(),
            })
        }
    }
}

/// Decode a control frame; data frames are unexpected during a handshake.
fn decode_control(frame: &Frame, expected: MessageType) -> Result<ControlMessage, HandshakeError> {
    let message_type = frame.message_type();
    if !message_type.is_control() {
        return Err(HandshakeError::UnexpectedMessage { expected, got: message_type });
    }
    ControlMessage::from_frame(frame)
        .map_err(|source| HandshakeError::Decode { message_type, source })
}

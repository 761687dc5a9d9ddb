//! Buffer sizes and message limits, and how the two sides agree on them.
//!
//! Zero is never an error: a zero buffer size means "use your default", and a
//! zero maximum message size or chunk count means "no limit, you choose".

use serde::{Deserialize, Serialize};
use uacp_proto::{Acknowledge, ChunkLimits, Hello, PROTOCOL_VERSION};

/// One kibibyte.
pub const KB: u32 = 1024;
/// One mebibyte.
pub const MB: u32 = 1024 * KB;

/// Default receive buffer size.
pub const DEFAULT_RECEIVE_BUF_SIZE: u32 = 0xffff;
/// Default send buffer size.
pub const DEFAULT_SEND_BUF_SIZE: u32 = 0xffff;
/// Default maximum chunks per message.
pub const DEFAULT_MAX_CHUNK_COUNT: u32 = 512;
/// Default maximum message size.
pub const DEFAULT_MAX_MESSAGE_SIZE: u32 = 2 * MB;

/// Transport limits, seen from the local side of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Largest frame we accept
    pub receive_buf_size: u32,
    /// Largest frame we send
    pub send_buf_size: u32,
    /// Largest logical message (0 = no limit)
    pub max_message_size: u32,
    /// Most chunks per logical message (0 = no limit)
    pub max_chunk_count: u32,
}

impl Limits {
    /// What a client proposes by default: default buffers, and no message
    /// limits so the server decides.
    pub const fn client() -> Self {
        Self {
            receive_buf_size: DEFAULT_RECEIVE_BUF_SIZE,
            send_buf_size: DEFAULT_SEND_BUF_SIZE,
            max_message_size: 0,
            max_chunk_count: 0,
        }
    }

    /// What a listener acknowledges by default.
    pub const fn server() -> Self {
        Self {
            receive_buf_size: DEFAULT_RECEIVE_BUF_SIZE,
            send_buf_size: DEFAULT_SEND_BUF_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_chunk_count: DEFAULT_MAX_CHUNK_COUNT,
        }
    }

    /// Replace zero buffer sizes with the defaults.
    #[must_use]
    pub fn with_default_buffers(self) -> Self {
        Self {
            receive_buf_size: or_default(self.receive_buf_size, DEFAULT_RECEIVE_BUF_SIZE),
            send_buf_size: or_default(self.send_buf_size, DEFAULT_SEND_BUF_SIZE),
            ..self
        }
    }

    /// Replace every zero field with the defaults.
    #[must_use]
    pub fn with_defaults(self) -> Self {
        Self {
            max_message_size: or_default(self.max_message_size, DEFAULT_MAX_MESSAGE_SIZE),
            max_chunk_count: or_default(self.max_chunk_count, DEFAULT_MAX_CHUNK_COUNT),
            ..self.with_default_buffers()
        }
    }

    /// Hello proposing these limits for `endpoint_url`.
    pub fn hello(&self, endpoint_url: impl Into<String>) -> Hello {
        Hello {
            version: PROTOCOL_VERSION,
            receive_buf_size: self.receive_buf_size,
            send_buf_size: self.send_buf_size,
            max_message_size: self.max_message_size,
            max_chunk_count: self.max_chunk_count,
            endpoint_url: endpoint_url.into(),
        }
    }

    /// Acknowledge carrying these limits unchanged.
    pub fn acknowledge(&self) -> Acknowledge {
        Acknowledge::new(
            self.receive_buf_size,
            self.send_buf_size,
            self.max_message_size,
            self.max_chunk_count,
        )
    }

    /// Limits for chunking logical messages sent on this connection.
    pub fn send_chunk_limits(&self) -> ChunkLimits {
        ChunkLimits {
            max_chunk_size: self.send_buf_size,
            max_message_size: self.max_message_size,
            max_chunk_count: self.max_chunk_count,
        }
    }

    /// Limits for reassembling logical messages received on this connection.
    pub fn receive_chunk_limits(&self) -> ChunkLimits {
        ChunkLimits { max_chunk_size: self.receive_buf_size, ..self.send_chunk_limits() }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::server()
    }
}

fn or_default(value: u32, default: u32) -> u32 {
    if value == 0 { default } else { value }
}

/// Smaller of two sizes where zero stands for "unspecified".
fn min_specified(a: u32, b: u32) -> u32 {
    match (a, b) {
        (0, other) | (other, 0) => other,
        (a, b) => a.min(b),
    }
}

/// Server side: revise the listener's limits against a client hello.
///
/// The server never sends more than the client can receive, and never
/// expects to receive more than the client will send. Returns the
/// acknowledge to send, which doubles as the server's local limits.
pub fn revise_for_hello(own: &Limits, hello: &Hello) -> Acknowledge {
    let own = own.with_defaults();
    Acknowledge::new(
        min_specified(own.receive_buf_size, hello.send_buf_size),
        min_specified(own.send_buf_size, hello.receive_buf_size),
        own.max_message_size,
        own.max_chunk_count,
    )
}

/// Tighten the message limits of `chunks` to what the peer announced in its
/// hello. Zero on either side means "no limit".
///
/// A client applies its own proposal to what it accepts, a server applies
/// the client's proposal to what it sends. The acknowledge is unaffected.
pub fn narrow_message_limits(
    chunks: ChunkLimits,
    max_message_size: u32,
    max_chunk_count: u32,
) -> ChunkLimits {
    ChunkLimits {
        max_message_size: min_specified(chunks.max_message_size, max_message_size),
        max_chunk_count: min_specified(chunks.max_chunk_count, max_chunk_count),
        ..chunks
    }
}

/// Client side: fill in what the server left to us.
///
/// Zero message limits in the acknowledge become the client defaults, zero
/// buffer sizes become the default buffer sizes.
pub fn complete_acknowledge(ack: Acknowledge) -> Acknowledge {
    Acknowledge {
        receive_buf_size: or_default(ack.receive_buf_size, DEFAULT_RECEIVE_BUF_SIZE),
        send_buf_size: or_default(ack.send_buf_size, DEFAULT_SEND_BUF_SIZE),
        max_message_size: or_default(ack.max_message_size, DEFAULT_MAX_MESSAGE_SIZE),
        max_chunk_count: or_default(ack.max_chunk_count, DEFAULT_MAX_CHUNK_COUNT),
        ..ack
    }
}

/// Local limits of a client after receiving `ack` for its `proposed` hello.
///
/// The server's send buffer bounds what we receive, its receive buffer
/// bounds what we send.
pub fn client_limits(proposed: &Limits, ack: &Acknowledge) -> Limits {
    let proposed = proposed.with_default_buffers();
    Limits {
        receive_buf_size: min_specified(proposed.receive_buf_size, ack.send_buf_size),
        send_buf_size: min_specified(proposed.send_buf_size, ack.receive_buf_size),
        max_message_size: ack.max_message_size,
        max_chunk_count: ack.max_chunk_count,
    }
}

/// Local limits of a server that sent `ack`.
pub fn server_limits(ack: &Acknowledge) -> Limits {
    Limits {
        receive_buf_size: ack.receive_buf_size,
        send_buf_size: ack.send_buf_size,
        max_message_size: ack.max_message_size,
        max_chunk_count: ack.max_chunk_count,
    }
}

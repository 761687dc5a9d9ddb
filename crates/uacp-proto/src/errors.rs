//! Error types for wire format parsing.

use thiserror::Error;

use crate::header::MessageType;

/// Result alias for wire format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding UACP frames and payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Not enough bytes to decode the requested value
    #[error("buffer too short for {what}: need {needed} bytes, have {available}")]
    BufferTooShort {
        /// What was being decoded
        what: &'static str,
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// Header declares a size smaller than the header itself
    #[error("invalid message size {0}: must be at least 8 bytes")]
    InvalidMessageSize(u32),

    /// Header declares a size that does not match the bytes supplied
    #[error("message size mismatch: header declares {declared} bytes, got {actual}")]
    SizeMismatch {
        /// Size from the header
        declared: u32,
        /// Bytes actually present
        actual: usize,
    },

    /// Frame is larger than the receiving or sending buffer allows
    #[error("message too large: {size} > {limit} bytes")]
    MessageTooLarge {
        /// Size of the frame or message
        size: u64,
        /// Negotiated limit
        limit: u32,
    },

    /// Message would need more chunks than negotiated
    #[error("too many chunks: {count} > {limit}")]
    TooManyChunks {
        /// Chunks required or received
        count: u64,
        /// Negotiated chunk limit
        limit: u32,
    },

    /// Unknown three letter message type
    #[error("unknown message type {0:?}")]
    UnknownMessageType([u8; 3]),

    /// Unknown chunk type byte
    #[error("unknown chunk type {0:#04x}")]
    UnknownChunkType(u8),

    /// Message type has no control message layout
    #[error("{0} is not a control message")]
    NotAControlMessage(MessageType),

    /// Control messages must fit into a single final chunk
    #[error("control message {0} must be sent as a single final chunk")]
    ChunkedControlMessage(MessageType),

    /// Chunks of one logical message carried different message types
    #[error("chunk of type {got} inside a {expected} message")]
    InterleavedChunk {
        /// Type of the message being reassembled
        expected: MessageType,
        /// Type of the chunk received
        got: MessageType,
    },

    /// String length prefix is negative but not the null marker
    #[error("invalid string length {0}")]
    InvalidStringLength(i32),

    /// String longer than the protocol allows
    #[error("{what} too long: {len} > {max} bytes")]
    StringTooLong {
        /// Field name
        what: &'static str,
        /// Actual length
        len: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// String bytes are not UTF-8
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// Bytes left over after a fixed layout was decoded
    #[error("{count} trailing bytes after {what}")]
    TrailingBytes {
        /// What was decoded
        what: &'static str,
        /// Leftover byte count
        count: usize,
    },
}

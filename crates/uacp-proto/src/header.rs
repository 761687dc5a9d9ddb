//! Fixed 8-byte frame header.
//!
//! ```text
//! 0         3    4                   8
//! +---------+----+-------------------+
//! | "HEL"   | F  | message size (LE) |
//! +---------+----+-------------------+
//! ```
//!
//! The message size covers the header and the payload.

use std::fmt;

use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned, byteorder::little_endian::U32,
};

use crate::errors::{ProtocolError, Result};

/// Three letter message type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `HEL`: client hello
    Hello,
    /// `ACK`: server acknowledge
    Acknowledge,
    /// `ERR`: protocol error, connection is closed afterwards
    Error,
    /// `RHE`: reverse hello, asks the listener to dial back
    ReverseHello,
    /// `MSG`: secure channel message
    Message,
    /// `OPN`: open secure channel
    OpenSecureChannel,
    /// `CLO`: close secure channel
    CloseSecureChannel,
}

impl MessageType {
    /// Wire tag for this message type.
    pub const fn tag(self) -> [u8; 3] {
        match self {
            Self::Hello => *b"HEL",
            Self::Acknowledge => *b"ACK",
            Self::Error => *b"ERR",
            Self::ReverseHello => *b"RHE",
            Self::Message => *b"MSG",
            Self::OpenSecureChannel => *b"OPN",
            Self::CloseSecureChannel => *b"CLO",
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: [u8; 3]) -> Result<Self> {
        match &tag {
            b"HEL" => Ok(Self::Hello),
            b"ACK" => Ok(Self::Acknowledge),
            b"ERR" => Ok(Self::Error),
            b"RHE" => Ok(Self::ReverseHello),
            b"MSG" => Ok(Self::Message),
            b"OPN" => Ok(Self::OpenSecureChannel),
            b"CLO" => Ok(Self::CloseSecureChannel),
            _ => Err(ProtocolError::UnknownMessageType(tag)),
        }
    }

    /// True for the four handshake-level message types.
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Hello | Self::Acknowledge | Self::Error | Self::ReverseHello)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.tag();
        // Tags are ASCII by construction
        f.write_str(std::str::from_utf8(&tag).unwrap_or("???"))
    }
}

/// Position of a frame within a logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// `F`: final (or only) chunk
    Final,
    /// `C`: intermediate chunk, more follow
    Continuation,
    /// `A`: sender gave up on the message, discard what was received
    Abort,
}

impl ChunkType {
    /// Wire byte for this chunk type.
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Final => b'F',
            Self::Continuation => b'C',
            Self::Abort => b'A',
        }
    }

    /// Parse a wire byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            b'F' => Ok(Self::Final),
            b'C' => Ok(Self::Continuation),
            b'A' => Ok(Self::Abort),
            other => Err(ProtocolError::UnknownChunkType(other)),
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", char::from(self.to_byte()))
    }
}

/// Raw wire layout. Only reachable through [`FrameHeader`], which validates it.
#[derive(FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct RawHeader {
    message_type: [u8; 3],
    chunk_type: u8,
    message_size: U32,
}

/// Validated frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    message_type: MessageType,
    chunk_type: ChunkType,
    message_size: u32,
}

impl FrameHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 8;

    /// Create a header. `message_size` includes the header itself.
    pub fn new(
        message_type: MessageType,
        chunk_type: ChunkType,
        message_size: u32,
    ) -> Result<Self> {
        if (message_size as usize) < Self::SIZE {
            return Err(ProtocolError::InvalidMessageSize(message_size));
        }
        Ok(Self { message_type, chunk_type, message_size })
    }

    /// Create a header for a payload of `payload_len` bytes.
    pub fn for_payload(
        message_type: MessageType,
        chunk_type: ChunkType,
        payload_len: usize,
    ) -> Result<Self> {
        let total = payload_len as u64 + Self::SIZE as u64;
        let message_size = u32::try_from(total)
            .map_err(|_| ProtocolError::MessageTooLarge { size: total, limit: u32::MAX })?;
        Self::new(message_type, chunk_type, message_size)
    }

    /// Decode a header from the first 8 bytes of `bytes`.
    ///
    /// Extra bytes after the header are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (raw, _) = RawHeader::read_from_prefix(bytes).map_err(|_| {
            ProtocolError::BufferTooShort {
                what: "frame header",
                needed: Self::SIZE,
                available: bytes.len(),
            }
        })?;

        let message_type = MessageType::from_tag(raw.message_type)?;
        let chunk_type = ChunkType::from_byte(raw.chunk_type)?;
        Self::new(message_type, chunk_type, raw.message_size.get())
    }

    /// Encode to the 8-byte wire form.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let raw = RawHeader {
            message_type: self.message_type.tag(),
            chunk_type: self.chunk_type.to_byte(),
            message_size: U32::new(self.message_size),
        };
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(raw.as_bytes());
        out
    }

    /// Reject headers that declare more than the receiver accepts.
    ///
    /// Must run before a payload buffer is allocated: the size comes from an
    /// untrusted peer.
    pub fn check_size(&self, receive_buf_size: u32) -> Result<()> {
        if self.message_size > receive_buf_size {
            return Err(ProtocolError::MessageTooLarge {
                size: u64::from(self.message_size),
                limit: receive_buf_size,
            });
        }
        Ok(())
    }

    /// Message type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Chunk type.
    pub fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }

    /// Total frame size, header included.
    pub fn message_size(&self) -> u32 {
        self.message_size
    }

    /// Payload size (message size minus header).
    pub fn payload_size(&self) -> usize {
        self.message_size as usize - Self::SIZE
    }
}

impl fmt::Display for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{} ({} bytes)", self.message_type, self.chunk_type, self.message_size)
    }
}

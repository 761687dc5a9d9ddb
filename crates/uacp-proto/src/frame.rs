//! A complete frame: header plus payload.

use bytes::{BufMut, Bytes};

use crate::{
    errors::{ProtocolError, Result},
    header::{ChunkType, FrameHeader, MessageType},
};

/// One transport-level frame (a chunk).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header; its size always matches the payload
    pub header: FrameHeader,
    /// Payload bytes following the header
    pub payload: Bytes,
}

impl Frame {
    /// Build a frame, computing the header size from the payload.
    pub fn new(
        message_type: MessageType,
        chunk_type: ChunkType,
        payload: impl Into<Bytes>,
    ) -> Result<Self> {
        let payload = payload.into();
        let header = FrameHeader::for_payload(message_type, chunk_type, payload.len())?;
        Ok(Self { header, payload })
    }

    /// Decode a frame from exactly one frame's worth of bytes.
    ///
    /// Fails if the header's declared size disagrees with `bytes.len()`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;
        if header.message_size() as usize != bytes.len() {
            return Err(ProtocolError::SizeMismatch {
                declared: header.message_size(),
                actual: bytes.len(),
            });
        }
        Ok(Self { header, payload: Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..]) })
    }

    /// Append header and payload to `dst`.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    /// Header and payload as one contiguous buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        self.encode(&mut out);
        out
    }

    /// Total size on the wire.
    pub fn len(&self) -> usize {
        self.header.message_size() as usize
    }

    /// Frames always carry at least a header.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Message type from the header.
    pub fn message_type(&self) -> MessageType {
        self.header.message_type()
    }

    /// Chunk type from the header.
    pub fn chunk_type(&self) -> ChunkType {
        self.header.chunk_type()
    }
}

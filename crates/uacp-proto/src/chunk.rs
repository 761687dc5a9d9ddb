//! Splitting logical messages into chunks and reassembling them.
//!
//! A message larger than one send buffer travels as a run of `C` chunks
//! closed by an `F` chunk. An `A` chunk tells the receiver to drop what it
//! has collected so far. Both directions enforce the negotiated maximum
//! message size and chunk count, where zero means "no limit".

use bytes::{Bytes, BytesMut};

use crate::{
    errors::{ProtocolError, Result},
    frame::Frame,
    header::{ChunkType, FrameHeader, MessageType},
};

/// Limits applied when chunking or reassembling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Largest frame, header included
    pub max_chunk_size: u32,
    /// Largest logical message body (0 = no limit)
    pub max_message_size: u32,
    /// Most chunks per message (0 = no limit)
    pub max_chunk_count: u32,
}

impl ChunkLimits {
    fn check_message_size(&self, size: usize) -> Result<()> {
        if self.max_message_size != 0 && size > self.max_message_size as usize {
            return Err(ProtocolError::MessageTooLarge {
                size: size as u64,
                limit: self.max_message_size,
            });
        }
        Ok(())
    }

    fn check_chunk_count(&self, count: usize) -> Result<()> {
        if self.max_chunk_count != 0 && count > self.max_chunk_count as usize {
            return Err(ProtocolError::TooManyChunks {
                count: count as u64,
                limit: self.max_chunk_count,
            });
        }
        Ok(())
    }
}

/// Split `body` into frames no larger than `limits.max_chunk_size`.
///
/// An empty body still produces one final frame.
pub fn split_message(
    message_type: MessageType,
    body: &[u8],
    limits: ChunkLimits,
) -> Result<Vec<Frame>> {
    limits.check_message_size(body.len())?;

    let max_payload = (limits.max_chunk_size as usize).saturating_sub(FrameHeader::SIZE);
    if max_payload == 0 {
        return Err(ProtocolError::MessageTooLarge {
            size: FrameHeader::SIZE as u64 + 1,
            limit: limits.max_chunk_size,
        });
    }

    let count = body.len().div_ceil(max_payload).max(1);
    limits.check_chunk_count(count)?;

    let body = Bytes::copy_from_slice(body);
    let mut frames = Vec::with_capacity(count);
    for index in 0..count {
        let start = index * max_payload;
        let end = (start + max_payload).min(body.len());
        let chunk_type =
            if index + 1 == count { ChunkType::Final } else { ChunkType::Continuation };
        frames.push(Frame::new(message_type, chunk_type, body.slice(start..end))?);
    }
    Ok(frames)
}

/// Outcome of feeding the last chunk of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reassembled {
    /// All chunks received
    Complete {
        /// Message type shared by every chunk
        message_type: MessageType,
        /// Concatenated chunk payloads
        body: Bytes,
    },
    /// Sender aborted the message; collected chunks were discarded
    Aborted {
        /// Message type of the aborted message
        message_type: MessageType,
        /// Payload of the abort chunk
        payload: Bytes,
    },
}

/// Collects chunks of one logical message at a time.
#[derive(Debug)]
pub struct ChunkAssembler {
    limits: ChunkLimits,
    message_type: Option<MessageType>,
    body: BytesMut,
    chunks: usize,
}

impl ChunkAssembler {
    /// Empty assembler enforcing `limits`.
    pub fn new(limits: ChunkLimits) -> Self {
        Self { limits, message_type: None, body: BytesMut::new(), chunks: 0 }
    }

    /// True while a message is partially collected.
    pub fn in_progress(&self) -> bool {
        self.message_type.is_some()
    }

    /// Feed one frame.
    ///
    /// Returns `Ok(None)` until a final or abort chunk arrives. On error the
    /// partial message is discarded.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Reassembled>> {
        let result = self.push_inner(frame);
        if !matches!(result, Ok(None)) {
            self.reset();
        }
        result
    }

    fn push_inner(&mut self, frame: Frame) -> Result<Option<Reassembled>> {
        let message_type = frame.message_type();
        if let Some(expected) = self.message_type
            && expected != message_type
        {
            return Err(ProtocolError::InterleavedChunk { expected, got: message_type });
        }

        if frame.chunk_type() == ChunkType::Abort {
            return Ok(Some(Reassembled::Aborted { message_type, payload: frame.payload }));
        }

        self.message_type = Some(message_type);
        self.chunks += 1;
        self.limits.check_chunk_count(self.chunks)?;
        self.limits.check_message_size(self.body.len() + frame.payload.len())?;
        self.body.extend_from_slice(&frame.payload);

        match frame.chunk_type() {
            ChunkType::Final => Ok(Some(Reassembled::Complete {
                message_type,
                body: std::mem::take(&mut self.body).freeze(),
            })),
            _ => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.message_type = None;
        self.body.clear();
        self.chunks = 0;
    }
}

//! Typed control messages.
//!
//! The message type in the header selects the payload layout before any
//! decoding happens, so a payload is never decoded into the wrong type.

use crate::{
    codec::{Decode, Encode, decode_from},
    errors::{ProtocolError, Result},
    frame::Frame,
    header::{ChunkType, MessageType},
    messages::{Acknowledge, ErrorMessage, Hello, ReverseHello},
};

/// One of the four handshake-level messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// `HEL`
    Hello(Hello),
    /// `ACK`
    Acknowledge(Acknowledge),
    /// `RHE`
    ReverseHello(ReverseHello),
    /// `ERR`
    Error(ErrorMessage),
}

impl ControlMessage {
    /// Header message type for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Hello(_) => MessageType::Hello,
            Self::Acknowledge(_) => MessageType::Acknowledge,
            Self::ReverseHello(_) => MessageType::ReverseHello,
            Self::Error(_) => MessageType::Error,
        }
    }

    /// Encode the payload (without header).
    pub fn encode_payload(&self) -> Vec<u8> {
        match self {
            Self::Hello(msg) => msg.to_vec(),
            Self::Acknowledge(msg) => msg.to_vec(),
            Self::ReverseHello(msg) => msg.to_vec(),
            Self::Error(msg) => msg.to_vec(),
        }
    }

    /// Decode a payload whose layout is chosen by `message_type`.
    pub fn decode(message_type: MessageType, payload: &[u8]) -> Result<Self> {
        match message_type {
            MessageType::Hello => exact::<Hello>(payload, "Hello").map(Self::Hello),
            MessageType::Acknowledge => {
                exact::<Acknowledge>(payload, "Acknowledge").map(Self::Acknowledge)
            },
            MessageType::ReverseHello => {
                exact::<ReverseHello>(payload, "ReverseHello").map(Self::ReverseHello)
            },
            MessageType::Error => decode_from::<ErrorMessage>(payload).map(|(m, _)| Self::Error(m)),
            other => Err(ProtocolError::NotAControlMessage(other)),
        }
    }

    /// Decode a control frame. Control messages are never chunked.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.chunk_type() != ChunkType::Final {
            return Err(ProtocolError::ChunkedControlMessage(frame.message_type()));
        }
        Self::decode(frame.message_type(), &frame.payload)
    }

    /// Encode as a single final frame.
    pub fn to_frame(&self) -> Result<Frame> {
        Frame::new(self.message_type(), ChunkType::Final, self.encode_payload())
    }
}

fn exact<T: Decode>(payload: &[u8], what: &'static str) -> Result<T> {
    let (value, consumed) = decode_from::<T>(payload)?;
    if consumed != payload.len() {
        return Err(ProtocolError::TrailingBytes { what, count: payload.len() - consumed });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;

    #[test]
    fn tag_selects_payload_layout() {
        let ack = Acknowledge::new(1, 2, 3, 4);
        let frame = ControlMessage::Acknowledge(ack).to_frame().unwrap();
        assert_eq!(frame.message_type(), MessageType::Acknowledge);
        assert_eq!(frame.len(), 28);
        assert_eq!(ControlMessage::from_frame(&frame).unwrap(), ControlMessage::Acknowledge(ack));

        // Same bytes under a different tag decode as a different message
        let as_error = ControlMessage::decode(MessageType::Error, &frame.payload);
        assert!(matches!(as_error, Ok(ControlMessage::Error(_))));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut payload = Acknowledge::new(1, 2, 3, 4).to_vec();
        payload.push(0);
        assert_eq!(
            ControlMessage::decode(MessageType::Acknowledge, &payload),
            Err(ProtocolError::TrailingBytes { what: "Acknowledge", count: 1 })
        );
    }

    #[test]
    fn data_message_types_have_no_control_layout() {
        assert_eq!(
            ControlMessage::decode(MessageType::Message, &[]),
            Err(ProtocolError::NotAControlMessage(MessageType::Message))
        );
    }

    #[test]
    fn chunked_control_frame_is_rejected() {
        let payload = ErrorMessage::new(StatusCode::BAD_TCP_INTERNAL_ERROR).to_vec();
        let frame = Frame::new(MessageType::Error, ChunkType::Continuation, payload).unwrap();
        assert_eq!(
            ControlMessage::from_frame(&frame),
            Err(ProtocolError::ChunkedControlMessage(MessageType::Error))
        );
    }
}

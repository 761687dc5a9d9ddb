//! Handshake control message payloads.
//!
//! # Protocol Flow
//!
//! ```text
//! Client                                   Server
//!   |  -- HEL { limits, endpoint_url } -->   |
//!   |  <-- ACK { revised limits } ---------  |
//!   |      OR                                |
//!   |  <-- ERR { status, reason } ---------  |
//! ```
//!
//! In reverse connect the server side sends `RHE` first, naming the URI the
//! listener should dial back.

use bytes::{Buf, BufMut};

use crate::{
    MAX_URL_LENGTH, PROTOCOL_VERSION,
    codec::{Decode, Encode},
    errors::{ProtocolError, Result},
    status::StatusCode,
};

fn check_url(what: &'static str, value: &str) -> Result<()> {
    if value.len() > MAX_URL_LENGTH {
        return Err(ProtocolError::StringTooLong { what, len: value.len(), max: MAX_URL_LENGTH });
    }
    Ok(())
}

/// Client hello: the client's proposed limits and the endpoint it wants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    /// Protocol version requested by the client
    pub version: u32,
    /// Largest chunk the client can receive
    pub receive_buf_size: u32,
    /// Largest chunk the client will send
    pub send_buf_size: u32,
    /// Largest response message the client accepts (0 = no limit)
    pub max_message_size: u32,
    /// Most chunks per response message (0 = no limit)
    pub max_chunk_count: u32,
    /// Endpoint the client is connecting to
    pub endpoint_url: String,
}

impl Encode for Hello {
    fn encoded_len(&self) -> usize {
        20 + self.endpoint_url.encoded_len()
    }

    fn encode(&self, dst: &mut impl BufMut) {
        self.version.encode(dst);
        self.receive_buf_size.encode(dst);
        self.send_buf_size.encode(dst);
        self.max_message_size.encode(dst);
        self.max_chunk_count.encode(dst);
        self.endpoint_url.encode(dst);
    }
}

impl Decode for Hello {
    fn decode(src: &mut impl Buf) -> Result<Self> {
        let hello = Self {
            version: u32::decode(src)?,
            receive_buf_size: u32::decode(src)?,
            send_buf_size: u32::decode(src)?,
            max_message_size: u32::decode(src)?,
            max_chunk_count: u32::decode(src)?,
            endpoint_url: String::decode(src)?,
        };
        check_url("EndpointUrl", &hello.endpoint_url)?;
        Ok(hello)
    }
}

/// Server acknowledge: the limits in force for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acknowledge {
    /// Protocol version chosen by the server
    pub version: u32,
    /// Largest chunk the server can receive
    pub receive_buf_size: u32,
    /// Largest chunk the server will send
    pub send_buf_size: u32,
    /// Largest request message the server accepts (0 = no limit)
    pub max_message_size: u32,
    /// Most chunks per request message (0 = no limit)
    pub max_chunk_count: u32,
}

impl Acknowledge {
    /// Acknowledge at the current protocol version.
    pub fn new(
        receive_buf_size: u32,
        send_buf_size: u32,
        max_message_size: u32,
        max_chunk_count: u32,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            receive_buf_size,
            send_buf_size,
            max_message_size,
            max_chunk_count,
        }
    }
}

impl Encode for Acknowledge {
    fn encoded_len(&self) -> usize {
        20
    }

    fn encode(&self, dst: &mut impl BufMut) {
        self.version.encode(dst);
        self.receive_buf_size.encode(dst);
        self.send_buf_size.encode(dst);
        self.max_message_size.encode(dst);
        self.max_chunk_count.encode(dst);
    }
}

impl Decode for Acknowledge {
    fn decode(src: &mut impl Buf) -> Result<Self> {
        Ok(Self {
            version: u32::decode(src)?,
            receive_buf_size: u32::decode(src)?,
            send_buf_size: u32::decode(src)?,
            max_message_size: u32::decode(src)?,
            max_chunk_count: u32::decode(src)?,
        })
    }
}

/// Reverse hello: sent by a server that wants the listener to dial it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseHello {
    /// URI the listener should connect to
    pub server_uri: String,
    /// Endpoint the reverse hello is addressed to
    pub endpoint_url: String,
}

impl Encode for ReverseHello {
    fn encoded_len(&self) -> usize {
        self.server_uri.encoded_len() + self.endpoint_url.encoded_len()
    }

    fn encode(&self, dst: &mut impl BufMut) {
        self.server_uri.encode(dst);
        self.endpoint_url.encode(dst);
    }
}

impl Decode for ReverseHello {
    fn decode(src: &mut impl Buf) -> Result<Self> {
        let rhe = Self { server_uri: String::decode(src)?, endpoint_url: String::decode(src)? };
        check_url("ServerUri", &rhe.server_uri)?;
        check_url("EndpointUrl", &rhe.endpoint_url)?;
        Ok(rhe)
    }
}

/// Error frame payload. The sender closes the connection afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    /// Why the connection is being dropped
    pub code: StatusCode,
    /// Optional human readable reason
    pub reason: Option<String>,
}

impl ErrorMessage {
    /// Error without a reason string.
    pub fn new(code: StatusCode) -> Self {
        Self { code, reason: None }
    }

    /// Error with a reason string.
    pub fn with_reason(code: StatusCode, reason: impl Into<String>) -> Self {
        Self { code, reason: Some(reason.into()) }
    }
}

impl Encode for ErrorMessage {
    fn encoded_len(&self) -> usize {
        4 + self.reason.encoded_len()
    }

    fn encode(&self, dst: &mut impl BufMut) {
        self.code.0.encode(dst);
        self.reason.encode(dst);
    }
}

impl Decode for ErrorMessage {
    fn decode(src: &mut impl Buf) -> Result<Self> {
        let code = StatusCode(u32::decode(src)?);
        // Some stacks send the bare status code
        let reason = if src.has_remaining() { Option::<String>::decode(src)? } else { None };
        Ok(Self { code, reason })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;
    use crate::codec::decode_from;

    fn hello() -> Hello {
        Hello {
            version: 0,
            receive_buf_size: 0xffff,
            send_buf_size: 0xffff,
            max_message_size: 0,
            max_chunk_count: 0,
            endpoint_url: "opc.tcp://x/y".to_string(),
        }
    }

    #[test]
    fn hello_layout() {
        let expected = hex!(
            "00000000 ffff0000 ffff0000 00000000 00000000"
            "0d000000 6f70632e7463703a2f2f782f79"
        );
        assert_eq!(hello().to_vec(), expected);
        assert_eq!(hello().encoded_len(), expected.len());
    }

    #[test]
    fn acknowledge_layout() {
        let ack = Acknowledge::new(0x2000, 0x4000, 2 * 1024 * 1024, 512);
        assert_eq!(
            ack.to_vec(),
            hex!("00000000 00200000 00400000 00002000 00020000")
        );
    }

    #[test]
    fn reverse_hello_layout() {
        let rhe = ReverseHello { server_uri: "urn:a".to_string(), endpoint_url: "e".to_string() };
        assert_eq!(rhe.to_vec(), hex!("05000000 75726e3a61 01000000 65"));
        assert_eq!(decode_from::<ReverseHello>(&rhe.to_vec()).unwrap(), (rhe, 14));
    }

    #[test]
    fn error_reason_is_optional_on_decode() {
        let (bare, _) = decode_from::<ErrorMessage>(&hex!("00008380")).unwrap();
        assert_eq!(bare, ErrorMessage::new(StatusCode::BAD_TCP_ENDPOINT_URL_INVALID));

        let full = ErrorMessage::with_reason(StatusCode::BAD_TCP_INTERNAL_ERROR, "boom");
        assert_eq!(decode_from::<ErrorMessage>(&full.to_vec()).unwrap().0, full);
    }

    #[test]
    fn oversized_endpoint_url_is_rejected() {
        let mut hello = hello();
        hello.endpoint_url = "a".repeat(MAX_URL_LENGTH + 1);
        let result = decode_from::<Hello>(&hello.to_vec());
        assert!(matches!(result, Err(ProtocolError::StringTooLong { what: "EndpointUrl", .. })));
    }

    #[test]
    fn truncated_acknowledge_is_rejected() {
        let bytes = hex!("00000000 ffff0000 ffff0000 00000000");
        assert!(matches!(
            decode_from::<Acknowledge>(&bytes),
            Err(ProtocolError::BufferTooShort { what: "UInt32", .. })
        ));
    }

    proptest! {
        #[test]
        fn hello_and_acknowledge_survive_encoding(
            version in any::<u32>(),
            receive in any::<u32>(),
            send in any::<u32>(),
            max_message in any::<u32>(),
            max_chunks in any::<u32>(),
            url in "[ -~]{0,64}",
        ) {
            let hello = Hello {
                version,
                receive_buf_size: receive,
                send_buf_size: send,
                max_message_size: max_message,
                max_chunk_count: max_chunks,
                endpoint_url: url,
            };
            let bytes = hello.to_vec();
            prop_assert_eq!(decode_from::<Hello>(&bytes).unwrap(), (hello, bytes.len()));

            let ack = Acknowledge {
                version,
                receive_buf_size: receive,
                send_buf_size: send,
                max_message_size: max_message,
                max_chunk_count: max_chunks,
            };
            let bytes = ack.to_vec();
            prop_assert_eq!(&bytes[4..8], &receive.to_le_bytes());
            prop_assert_eq!(decode_from::<Acknowledge>(&bytes).unwrap(), (ack, 20));
        }
    }
}

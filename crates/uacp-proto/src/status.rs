//! OPC UA status codes used at the transport layer.

use std::fmt;

/// A 32-bit OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusCode(pub u32);

impl StatusCode {
    /// Operation succeeded.
    pub const GOOD: Self = Self(0x0000_0000);
    /// Decoding failed.
    pub const BAD_DECODING_ERROR: Self = Self(0x8007_0000);
    /// Encoding limits exceeded.
    pub const BAD_ENCODING_LIMITS_EXCEEDED: Self = Self(0x8008_0000);
    /// Server cannot accept more connections.
    pub const BAD_TCP_SERVER_TOO_BUSY: Self = Self(0x807D_0000);
    /// Message type is not valid here.
    pub const BAD_TCP_MESSAGE_TYPE_INVALID: Self = Self(0x807E_0000);
    /// Secure channel id is unknown.
    pub const BAD_TCP_SECURE_CHANNEL_UNKNOWN: Self = Self(0x807F_0000);
    /// Message exceeds the negotiated size.
    pub const BAD_TCP_MESSAGE_TOO_LARGE: Self = Self(0x8080_0000);
    /// Not enough resources to process the request.
    pub const BAD_TCP_NOT_ENOUGH_RESOURCES: Self = Self(0x8081_0000);
    /// Internal transport error.
    pub const BAD_TCP_INTERNAL_ERROR: Self = Self(0x8082_0000);
    /// Endpoint URL not served by this listener.
    pub const BAD_TCP_ENDPOINT_URL_INVALID: Self = Self(0x8083_0000);
    /// Protocol version is not supported.
    pub const BAD_PROTOCOL_VERSION_UNSUPPORTED: Self = Self(0x80BE_0000);

    /// High severity bit set.
    pub const fn is_bad(self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Symbolic name, if this is one of the codes above.
    pub const fn name(self) -> Option<&'static str> {
        Some(match self.0 {
            0x0000_0000 => "Good",
            0x8007_0000 => "BadDecodingError",
            0x8008_0000 => "BadEncodingLimitsExceeded",
            0x807D_0000 => "BadTcpServerTooBusy",
            0x807E_0000 => "BadTcpMessageTypeInvalid",
            0x807F_0000 => "BadTcpSecureChannelUnknown",
            0x8080_0000 => "BadTcpMessageTooLarge",
            0x8081_0000 => "BadTcpNotEnoughResources",
            0x8082_0000 => "BadTcpInternalError",
            0x8083_0000 => "BadTcpEndpointUrlInvalid",
            0x80BE_0000 => "BadProtocolVersionUnsupported",
            _ => return None,
        })
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} ({:#010x})", self.0),
            None => write!(f, "{:#010x}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        Self(code)
    }
}

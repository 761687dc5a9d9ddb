//! Wire format for the OPC UA Connection Protocol (UACP).
//!
//! Every UACP frame starts with a fixed 8-byte header: a three letter message
//! type, a one letter chunk type and the little-endian size of the whole
//! frame. The handshake uses four single-chunk control messages (`HEL`,
//! `ACK`, `RHE`, `ERR`); everything else is opaque payload split into chunks
//! bounded by the limits negotiated during that handshake.
//!
//! This crate does no I/O. It only turns bytes into typed values and back.
//!
//! # Security
//!
//! Headers are parsed through compile-time verified layouts via `zerocopy`.
//! Declared sizes are checked against the receiver's limits before any payload
//! buffer is allocated, and every length prefix is bounded by the bytes that
//! are actually available.
#![forbid(unsafe_code)]

pub mod chunk;
pub mod codec;
pub mod control;
pub mod errors;
pub mod frame;
pub mod header;
pub mod messages;
pub mod status;

pub use chunk::{ChunkAssembler, ChunkLimits, Reassembled, split_message};
pub use codec::{Decode, Encode, decode_from};
pub use control::ControlMessage;
pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::{ChunkType, FrameHeader, MessageType};
pub use messages::{Acknowledge, ErrorMessage, Hello, ReverseHello};
pub use status::StatusCode;

/// The only UACP protocol version in existence.
pub const PROTOCOL_VERSION: u32 = 0;

/// Maximum length of the URL/URI strings carried by `HEL` and `RHE`.
pub const MAX_URL_LENGTH: usize = 4096;

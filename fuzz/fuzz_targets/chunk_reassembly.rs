//! Feeding arbitrary frame sequences to the assembler never exceeds its
//! limits.

#![no_main]

use libfuzzer_sys::fuzz_target;
use uacp_proto::{ChunkAssembler, ChunkLimits, Frame, Reassembled};

const LIMITS: ChunkLimits =
    ChunkLimits { max_chunk_size: 64, max_message_size: 256, max_chunk_count: 8 };

fuzz_target!(|data: &[u8]| {
    let mut assembler = ChunkAssembler::new(LIMITS);
    let mut rest = data;

    while rest.len() >= 8 {
        let size = u32::from_le_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let Some(bytes) = rest.get(..size) else {
            return;
        };
        let Ok(frame) = Frame::decode(bytes) else {
            return;
        };
        rest = &rest[size..];

        if let Ok(Some(Reassembled::Complete { body, .. })) = assembler.push(frame) {
            assert!(body.len() <= 256);
        }
    }
});

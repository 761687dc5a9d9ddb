//! Arbitrary bytes must never panic the header or frame decoder, and a
//! decoded frame must re-encode to the same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use uacp_proto::{Frame, FrameHeader};

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = FrameHeader::from_bytes(data) {
        assert!(header.message_size() >= FrameHeader::SIZE as u32);
        assert_eq!(&header.to_bytes()[..], &data[..FrameHeader::SIZE]);
    }

    if let Ok(frame) = Frame::decode(data) {
        assert_eq!(frame.to_bytes(), data);
    }
});

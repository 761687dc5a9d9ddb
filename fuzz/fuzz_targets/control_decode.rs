//! Control payload decoding for every message type.

#![no_main]

use libfuzzer_sys::fuzz_target;
use uacp_proto::{ControlMessage, MessageType};

const TYPES: [MessageType; 4] = [
    MessageType::Hello,
    MessageType::Acknowledge,
    MessageType::ReverseHello,
    MessageType::Error,
];

fuzz_target!(|data: &[u8]| {
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let message_type = TYPES[usize::from(selector) % TYPES.len()];

    if let Ok(msg) = ControlMessage::decode(message_type, payload) {
        assert_eq!(msg.message_type(), message_type);
        let again = ControlMessage::decode(message_type, &msg.encode_payload());
        assert_eq!(again.as_ref(), Ok(&msg));
    }
});

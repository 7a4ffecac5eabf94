//! Fuzz target: `read_message` and `Message::parse`
//!
//! Feeds arbitrary bytes through the framing layer as the receive path
//! would and checks that every frame handed back fits the buffer and
//! re-parses to the same tag.
//!
//! cargo fuzz run fuzz_message_reader

#![no_main]

use domsvc::adapters::loopback;
use domsvc::ds::codec::{DataMessage, Message, read_message};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let (mut transport, host) = loopback();
    host.push(data);

    let mut buf = [0u8; 512];
    while let Ok(Some(tag)) = read_message(&mut transport, &mut buf) {
        assert!(tag.frame_len() <= buf.len(), "frame exceeds receive buffer");
        let msg = Message::parse(&buf[..tag.frame_len()]).expect("framed message parses");
        assert_eq!(msg.tag, tag);
        if let Ok(data) = DataMessage::parse(&msg) {
            assert_eq!(data.body.len() + 8, msg.payload.len());
        }
    }
});

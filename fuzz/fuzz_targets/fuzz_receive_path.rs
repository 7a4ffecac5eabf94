//! Fuzz target: `DsEngine::process_incoming`
//!
//! Runs arbitrary bytes through a negotiated session on the loopback
//! channel. The engine must never panic, whatever the host sends.
//!
//! cargo fuzz run fuzz_receive_path

#![no_main]

use domsvc::adapters::{SimPlatform, loopback};
use domsvc::ds::codec::MessageWriter;
use domsvc::ds::protocol::MsgType;
use domsvc::ds::{ChannelEvent, DsEngine};
use domsvc::EngineConfig;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let (transport, host) = loopback();
    let config = EngineConfig {
        cpu_hotplug: false,
        ..EngineConfig::default()
    };
    let Ok(engine) = DsEngine::new(transport, SimPlatform::new(), config) else {
        return;
    };

    let _ = engine.handle_event(ChannelEvent::Up);
    host.push(&MessageWriter::new(MsgType::InitAck).u16(0).finish());
    let _ = engine.process_incoming();

    host.push(data);
    while host.pending_inbound() > 0 {
        if let Ok(0) = engine.process_incoming() {
            break;
        }
    }
    let _ = host.take_sent();
});

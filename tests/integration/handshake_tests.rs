//! Session negotiation, registration and reset.

use domsvc::ds::codec::{MessageWriter, WireReader};
use domsvc::ds::protocol::{MsgType, ResultCode, SVC_DR_CPU, SVC_MD_UPDATE, SVC_PRI};
use domsvc::ds::registry::handle_index;
use domsvc::ds::{CapState, ChannelEvent, HandshakePhase};
use domsvc::{DsError, EngineConfig};

use crate::mock_host::{Harness, data, reg_ack, reg_nack};

const CATALOG: [&str; 7] = [
    "md-update",
    "domain-shutdown",
    "domain-panic",
    "dr-cpu",
    "pri",
    "var-config",
    "var-config-backup",
];

#[test]
fn init_ack_sends_one_reg_req_per_service() {
    let h = Harness::new();
    let regs = h.negotiate();

    assert_eq!(h.engine.phase(), HandshakePhase::Done);
    assert_eq!(regs.len(), CATALOG.len());
    for (index, (reg, name)) in regs.iter().zip(CATALOG).enumerate() {
        assert_eq!(reg.msg_type(), Some(MsgType::RegReq.raw()));
        let handle = reg.handle().unwrap();
        assert_eq!(handle_index(handle), index, "{name}");
        assert_eq!(h.engine.handle_of(name), Some(handle));
        assert_eq!(h.engine.cap_state(name), Some(CapState::RegistrationSent));

        let mut r = WireReader::new(reg.body());
        assert_eq!((r.u16().unwrap(), r.u16().unwrap()), (1, 0));
        assert_eq!(r.rest(), name.as_bytes());
    }
}

#[test]
fn reg_ack_and_nack_from_host() {
    let h = Harness::new();
    h.negotiate();

    let md = h.handle(SVC_MD_UPDATE);
    let pri = h.handle(SVC_PRI);
    let mut batch = reg_ack(md);
    batch.extend(reg_ack(md));
    batch.extend(reg_nack(pri));
    assert_eq!(h.deliver(&batch), Ok(3));

    assert_eq!(h.engine.cap_state(SVC_MD_UPDATE), Some(CapState::Registered));
    assert_eq!(h.engine.cap_state(SVC_PRI), Some(CapState::Unknown));
    assert!(h.host.take_sent().is_empty(), "acks are never answered");
}

#[test]
fn ack_for_stale_or_foreign_handle_changes_nothing() {
    let h = Harness::new();
    h.negotiate();
    let md = h.handle(SVC_MD_UPDATE);

    h.deliver(&reg_ack(md ^ 0xffff)).unwrap();
    h.deliver(&reg_ack(40u64 << 32)).unwrap();
    assert_eq!(h.engine.cap_state(SVC_MD_UPDATE), Some(CapState::RegistrationSent));
}

#[test]
fn init_nack_resets_the_session() {
    let h = Harness::new();
    h.engine.handle_event(ChannelEvent::Up).unwrap();
    h.host.take_sent();

    let nack = MessageWriter::new(MsgType::InitNack).u16(2).finish();
    assert_eq!(h.deliver(&nack), Err(DsError::ConnectionReset));
    assert_eq!(h.engine.phase(), HandshakePhase::Idle);
    assert!(h.host.take_sent().is_empty(), "no registrations after a NACK");
}

#[test]
fn handshake_before_channel_up_is_a_violation() {
    let h = Harness::new();
    let ack = MessageWriter::new(MsgType::InitAck).u16(0).finish();
    assert_eq!(h.deliver(&ack), Err(DsError::ConnectionReset));
    assert_eq!(h.engine.phase(), HandshakePhase::Idle);
}

#[test]
fn reset_event_forgets_registrations() {
    let h = Harness::new();
    h.establish();
    assert_eq!(h.engine.cap_state(SVC_PRI), Some(CapState::Registered));

    h.engine.handle_event(ChannelEvent::Reset).unwrap();
    assert_eq!(h.engine.phase(), HandshakePhase::Idle);
    for name in CATALOG {
        assert_eq!(h.engine.cap_state(name), Some(CapState::Unknown));
    }
}

#[test]
fn transport_reset_during_read_resets_session() {
    let h = Harness::new();
    h.establish();

    h.host.inject_reset();
    assert_eq!(h.engine.process_incoming(), Err(DsError::ConnectionReset));
    assert_eq!(h.engine.phase(), HandshakePhase::Idle);
    assert_eq!(h.engine.cap_state(SVC_MD_UPDATE), Some(CapState::Unknown));
}

#[test]
fn new_session_uses_fresh_handles() {
    let h = Harness::new();
    h.establish();
    let old = h.handle(SVC_MD_UPDATE);

    h.engine.handle_event(ChannelEvent::Reset).unwrap();
    h.establish();
    let new = h.handle(SVC_MD_UPDATE);
    assert_ne!(old, new);
    assert_eq!(handle_index(old), handle_index(new));

    // A request addressed to the previous session's handle is refused.
    h.deliver(&data(old).u64(1).finish()).unwrap();
    let sent = h.host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].msg_type(), Some(MsgType::Nack.raw()));
    assert!(h.platform.calls().is_empty());
}

#[test]
fn unregistration_from_host() {
    let h = Harness::new();
    h.establish();
    let pri = h.handle(SVC_PRI);

    h.deliver(&MessageWriter::new(MsgType::UnregReq).u64(pri).finish())
        .unwrap();
    assert_eq!(h.engine.cap_state(SVC_PRI), Some(CapState::Unknown));
    let sent = h.host.take_sent();
    assert_eq!(sent[0].bytes, MessageWriter::new(MsgType::UnregAck).u64(pri).finish());

    h.deliver(&MessageWriter::new(MsgType::UnregReq).u64(99u64 << 32).finish())
        .unwrap();
    let sent = h.host.take_sent();
    assert_eq!(sent[0].msg_type(), Some(MsgType::UnregNack.raw()));
}

#[test]
fn without_hotplug_dr_cpu_is_not_offered() {
    let h = Harness::with_config(EngineConfig {
        cpu_hotplug: false,
        ..EngineConfig::default()
    });
    let regs = h.negotiate();
    assert_eq!(regs.len(), CATALOG.len() - 1);
    assert_eq!(h.engine.handle_of(SVC_DR_CPU), None);
    assert_eq!(handle_index(h.handle(SVC_PRI)), 3);
}

#[test]
fn failed_registration_send_leaves_service_unknown() {
    let h = Harness::with_config(EngineConfig {
        send_retry_limit: 2,
        ..EngineConfig::default()
    });
    h.engine.handle_event(ChannelEvent::Up).unwrap();
    h.host.take_sent();

    // Enough busy writes to exhaust the first REG_REQ only.
    h.host.set_busy(2);
    h.deliver(&MessageWriter::new(MsgType::InitAck).u16(0).finish())
        .unwrap();

    assert_eq!(h.engine.cap_state(SVC_MD_UPDATE), Some(CapState::Unknown));
    assert_eq!(
        h.engine.cap_state("domain-shutdown"),
        Some(CapState::RegistrationSent)
    );
    assert_eq!(h.host.take_sent().len(), CATALOG.len() - 1);
}

#[test]
fn nack_result_code_is_invalid_handle() {
    let h = Harness::new();
    h.establish();
    h.deliver(&data(0xdead_beef_0000_0001).u64(5).finish()).unwrap();
    let sent = h.host.take_sent();
    let mut r = sent[0].message().unwrap().reader();
    assert_eq!(r.u64().unwrap(), 0xdead_beef_0000_0001);
    assert_eq!(r.u64().unwrap(), ResultCode::InvalidHandle.raw());
}

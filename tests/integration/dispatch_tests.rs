//! DATA routing and the simple capability handlers.

use domsvc::adapters::PlatformCall;
use domsvc::ds::codec::{MessageWriter, WireReader};
use domsvc::ds::protocol::{MsgType, SVC_DOMAIN_PANIC, SVC_DOMAIN_SHUTDOWN, SVC_MD_UPDATE, SVC_PRI};
use domsvc::{DsError, EngineConfig};

use crate::mock_host::{Harness, data, parse_status_reply};

#[test]
fn unknown_handle_gets_exactly_one_nack() {
    let h = Harness::new();
    h.establish();

    assert_eq!(h.deliver(&data(77u64 << 32).u64(1).finish()), Ok(1));

    let sent = h.host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].msg_type(), Some(MsgType::Nack.raw()));
    assert_eq!(sent[0].handle(), Some(77u64 << 32));
    assert!(h.platform.calls().is_empty(), "no handler may run");
}

#[test]
fn md_update_acknowledges_then_refreshes() {
    let h = Harness::new();
    h.establish();
    let md = h.handle(SVC_MD_UPDATE);

    h.deliver(&data(md).u64(0x1234).finish()).unwrap();

    let sent = h.host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].handle(), Some(md));
    assert_eq!(parse_status_reply(&sent[0]), (0x1234, 0));
    assert_eq!(sent[0].body().len(), 12);
    assert_eq!(h.platform.calls(), [PlatformCall::Refresh]);
}

#[test]
fn shutdown_acknowledges_with_empty_reason() {
    let h = Harness::new();
    h.establish();
    let sd = h.handle(SVC_DOMAIN_SHUTDOWN);

    h.deliver(&data(sd).u64(8).u32(1500).finish()).unwrap();

    let sent = h.host.take_sent();
    assert_eq!(parse_status_reply(&sent[0]), (8, 0));
    assert_eq!(sent[0].body(), &[0, 0, 0, 0, 0, 0, 0, 8, 0, 0, 0, 0, 0]);
    assert_eq!(h.platform.calls(), [PlatformCall::Shutdown(1500)]);
}

#[test]
#[should_panic(expected = "halt")]
fn panic_request_halts() {
    let h = Harness::new();
    h.establish();
    let panic = h.handle(SVC_DOMAIN_PANIC);
    let _ = h.deliver(&data(panic).u64(3).finish());
}

#[test]
fn panic_request_is_acknowledged_before_halting() {
    let h = Harness::new();
    h.establish();
    let panic = h.handle(SVC_DOMAIN_PANIC);

    let engine = std::sync::Arc::clone(&h.engine);
    h.host.push(&data(panic).u64(3).finish());
    let outcome = std::thread::spawn(move || engine.process_incoming()).join();
    assert!(outcome.is_err(), "halt must not return");

    let sent = h.host.take_sent();
    assert_eq!(parse_status_reply(&sent[0]), (3, 0));
    assert!(matches!(
        h.platform.calls().as_slice(),
        [PlatformCall::Halt(_)]
    ));
}

#[test]
fn pri_is_logged_without_reply() {
    let h = Harness::new();
    h.establish();
    let pri = h.handle(SVC_PRI);

    assert_eq!(h.deliver(&data(pri).u64(1).u64(2).finish()), Ok(1));
    assert!(h.host.take_sent().is_empty());
    assert!(h.platform.calls().is_empty());
}

#[test]
fn peer_nack_is_only_logged() {
    let h = Harness::new();
    h.establish();

    let nack = MessageWriter::new(MsgType::Nack).u64(5).u64(3).finish();
    assert_eq!(h.deliver(&nack), Ok(1));
    assert!(h.host.take_sent().is_empty());
}

#[test]
fn short_data_aborts_rest_of_batch() {
    let h = Harness::new();
    h.establish();
    let md = h.handle(SVC_MD_UPDATE);

    // Payload too short to carry a handle, then a valid request.
    h.host.push(&MessageWriter::new(MsgType::Data).u32(1).finish());
    h.host.push(&data(md).u64(1).finish());
    assert_eq!(h.engine.process_incoming(), Err(DsError::MalformedMessage));
    assert!(h.platform.calls().is_empty());

    // The valid request is still queued and handled by the next batch.
    assert_eq!(h.engine.process_incoming(), Ok(1));
    assert_eq!(h.platform.calls(), [PlatformCall::Refresh]);
}

#[test]
fn declared_length_past_available_bytes_is_malformed() {
    let h = Harness::new();
    h.establish();
    let md = h.handle(SVC_MD_UPDATE);

    let mut msg = data(md).u64(1).finish();
    msg.truncate(msg.len() - 3);
    assert_eq!(h.deliver(&msg), Err(DsError::MalformedMessage));
    assert!(h.host.take_sent().is_empty());
    assert!(h.platform.calls().is_empty());
}

#[test]
fn truncated_field_in_handler_is_malformed() {
    let h = Harness::new();
    h.establish();
    let sd = h.handle(SVC_DOMAIN_SHUTDOWN);

    // req_num present, delay missing.
    assert_eq!(
        h.deliver(&data(sd).u64(1).finish()),
        Err(DsError::MalformedMessage)
    );
    assert!(h.platform.calls().is_empty());
}

#[test]
fn batch_handles_back_to_back_messages() {
    let h = Harness::new();
    h.establish();
    let md = h.handle(SVC_MD_UPDATE);

    let mut batch = data(md).u64(1).finish();
    batch.extend(data(md).u64(2).finish());
    batch.extend(data(md).u64(3).finish());
    assert_eq!(h.deliver(&batch), Ok(3));

    let req_nums: Vec<u64> = h
        .host
        .take_sent()
        .iter()
        .map(|m| WireReader::new(m.body()).u64().unwrap())
        .collect();
    assert_eq!(req_nums, [1, 2, 3]);
}

#[test]
fn busy_channel_is_retried_within_bound() {
    let h = Harness::with_config(EngineConfig {
        send_retry_limit: 10,
        ..EngineConfig::default()
    });
    h.establish();
    let md = h.handle(SVC_MD_UPDATE);

    h.host.set_busy(9);
    h.deliver(&data(md).u64(1).finish()).unwrap();
    assert_eq!(h.host.take_sent().len(), 1);
}

#[test]
fn reply_lost_to_busy_channel_does_not_stop_batch() {
    let h = Harness::with_config(EngineConfig {
        send_retry_limit: 3,
        ..EngineConfig::default()
    });
    h.establish();
    let md = h.handle(SVC_MD_UPDATE);

    h.host.set_busy(3);
    let mut batch = data(md).u64(1).finish();
    batch.extend(data(md).u64(2).finish());
    assert_eq!(h.deliver(&batch), Ok(2));

    let sent = h.host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(parse_status_reply(&sent[0]).0, 2);
    assert_eq!(
        h.platform.calls(),
        [PlatformCall::Refresh, PlatformCall::Refresh]
    );
}

#[test]
fn oversized_message_is_dropped_whole() {
    let h = Harness::new();
    h.establish();
    let md = h.handle(SVC_MD_UPDATE);

    // A valid md-update request hidden inside a payload too big to receive.
    let inner = data(md).u64(1).finish();
    let mut payload = inner.clone();
    payload.resize(5000, 0);
    let mut stream = MessageWriter::new(MsgType::Data).bytes(&payload).finish();
    stream.extend(data(md).u64(2).finish());
    h.host.push(&stream);

    assert_eq!(h.engine.process_incoming(), Err(DsError::MalformedMessage));
    assert_eq!(h.engine.process_incoming(), Ok(1));

    let sent = h.host.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(parse_status_reply(&sent[0]), (2, 0));
    assert_eq!(h.platform.calls(), [PlatformCall::Refresh]);
    assert_eq!(h.host.pending_inbound(), 0);
}

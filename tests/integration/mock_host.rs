//! Mock domain manager for integration tests.
//!
//! Wraps an engine wired to the loopback channel and the simulated
//! platform, and knows how to drive a session and decode replies.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use domsvc::adapters::{HostEnd, LoopbackTransport, SentMessage, SimPlatform, loopback};
use domsvc::ds::codec::{MessageWriter, WireReader};
use domsvc::ds::protocol::{MsgType, VarOp};
use domsvc::ds::{ChannelEvent, DsEngine};
use domsvc::{EngineConfig, Result};

pub type Engine = DsEngine<LoopbackTransport, SimPlatform>;

pub const WAIT: Duration = Duration::from_secs(2);

// ── Harness ───────────────────────────────────────────────────

pub struct Harness {
    pub engine: Arc<Engine>,
    pub host: HostEnd,
    pub platform: SimPlatform,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let (transport, host) = loopback();
        let platform = SimPlatform::new();
        let engine = DsEngine::new(transport, platform.clone(), config).expect("engine");
        Self {
            engine: Arc::new(engine),
            host,
            platform,
        }
    }

    /// Push bytes and run one receive batch.
    pub fn deliver(&self, bytes: &[u8]) -> Result<usize> {
        self.host.push(bytes);
        self.engine.process_incoming()
    }

    /// Channel up plus INIT_ACK. Returns the REG_REQs that went out.
    pub fn negotiate(&self) -> Vec<SentMessage> {
        self.engine.handle_event(ChannelEvent::Up).expect("channel up");
        let init = self.host.take_sent();
        assert_eq!(init.len(), 1);
        assert_eq!(init[0].msg_type(), Some(MsgType::InitReq.raw()));

        self.deliver(&MessageWriter::new(MsgType::InitAck).u16(0).finish())
            .expect("INIT_ACK");
        self.host.take_sent()
    }

    /// Negotiate and acknowledge every registration.
    pub fn establish(&self) {
        let regs = self.negotiate();
        let mut acks = Vec::new();
        for reg in &regs {
            acks.extend(reg_ack(reg.handle().expect("REG_REQ handle")));
        }
        self.deliver(&acks).expect("REG_ACKs");
        assert!(self.host.take_sent().is_empty());
    }

    pub fn handle(&self, service: &str) -> u64 {
        self.engine.handle_of(service).expect("service in catalog")
    }

    /// Answer every variable-config request with `result` until `stop`
    /// requests have been answered.
    pub fn spawn_var_responder(&self, result: u32, stop: usize) -> JoinHandle<Vec<SentMessage>> {
        let engine = Arc::clone(&self.engine);
        let host = self.host.clone();
        thread::spawn(move || {
            let mut seen = Vec::new();
            while seen.len() < stop {
                if !host.wait_sent(1, WAIT) {
                    break;
                }
                for req in host.take_sent() {
                    let handle = req.handle().expect("var request handle");
                    let op = WireReader::new(req.body()).u32().expect("var op");
                    let resp_op = if op == VarOp::DeleteReq as u32 {
                        VarOp::DeleteResp
                    } else {
                        VarOp::SetResp
                    };
                    host.push(&var_response(handle, resp_op, result));
                    seen.push(req);
                }
                engine.process_incoming().expect("var response batch");
            }
            seen
        })
    }
}

// ── Message builders ──────────────────────────────────────────

pub fn reg_ack(handle: u64) -> Vec<u8> {
    MessageWriter::new(MsgType::RegAck).u64(handle).u16(0).finish()
}

pub fn reg_nack(handle: u64) -> Vec<u8> {
    MessageWriter::new(MsgType::RegNack).u64(handle).u16(1).finish()
}

pub fn data(handle: u64) -> MessageWriter {
    MessageWriter::new(MsgType::Data).u64(handle)
}

pub fn cpu_request(handle: u64, req_num: u64, op: u32, ids: &[u32]) -> Vec<u8> {
    let mut w = data(handle).u64(req_num).u32(op).u32(ids.len() as u32);
    for &id in ids {
        w = w.u32(id);
    }
    w.finish()
}

pub fn var_response(handle: u64, op: VarOp, result: u32) -> Vec<u8> {
    data(handle).u32(op as u32).u32(result).finish()
}

// ── Reply decoding ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuReply {
    pub handle: u64,
    pub req_num: u64,
    pub op_result: u32,
    /// `(cpu, result, status)`
    pub records: Vec<(u32, u32, u32)>,
}

pub fn parse_cpu_reply(msg: &SentMessage) -> CpuReply {
    assert_eq!(msg.msg_type(), Some(MsgType::Data.raw()));
    assert_eq!(msg.bytes.len() % 4, 0, "cpu reply must be 4-byte aligned");
    let mut r = WireReader::new(msg.body());
    let req_num = r.u64().unwrap();
    let op_result = r.u32().unwrap();
    let count = r.u32().unwrap();
    let records = (0..count)
        .map(|_| {
            let rec = (r.u32().unwrap(), r.u32().unwrap(), r.u32().unwrap());
            assert_eq!(r.u32().unwrap(), 0, "str_off");
            rec
        })
        .collect();
    CpuReply {
        handle: msg.handle().unwrap(),
        req_num,
        op_result,
        records,
    }
}

/// `(req_num, result)` from an md-update reply, or the leading fields of
/// a shutdown / panic reply.
pub fn parse_status_reply(msg: &SentMessage) -> (u64, u32) {
    let mut r = WireReader::new(msg.body());
    (r.u64().unwrap(), r.u32().unwrap())
}

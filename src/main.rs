//! domsvc-sim: plays a domain manager against the engine in-process.
//!
//! ```text
//! ┌──────────────────────┐   loopback   ┌───────────────────────────┐
//! │ scripted host (main) │◀────────────▶│ DsEngine                  │
//! │  INIT_ACK, REG_ACK,  │              │  registry · dispatch      │
//! │  md-update, dr-cpu,  │              │  dr-cpu worker            │
//! │  var-config replies  │              │  var-config synchronizer  │
//! └──────────────────────┘              └─────────────┬─────────────┘
//!                                                     ▼
//!                                              SimPlatform (call log)
//! ```
//!
//! Usage: `domsvc-sim [config.json]`

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::{info, warn};

use domsvc::adapters::{HostEnd, SentMessage, SimPlatform, loopback};
use domsvc::ds::codec::MessageWriter;
use domsvc::ds::protocol::{CpuOp, MsgType, SVC_DR_CPU, SVC_MD_UPDATE, VarOp, VarResult};
use domsvc::ds::{ChannelEvent, DsEngine};
use domsvc::EngineConfig;

const REPLY_WAIT: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("domsvc-sim v{}", env!("CARGO_PKG_VERSION"));

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
            EngineConfig::from_json(&text).with_context(|| format!("parsing {path}"))?
        }
        None => EngineConfig::default(),
    };

    let (transport, host) = loopback();
    let platform = SimPlatform::new();
    let engine = Arc::new(DsEngine::new(transport, platform.clone(), config)?);

    // ── Handshake ─────────────────────────────────────────────
    engine.handle_event(ChannelEvent::Up)?;
    expect_replies(&host, 1, "INIT_REQ")?;
    host.take_sent();
    host.push(&MessageWriter::new(MsgType::InitAck).u16(0).finish());
    engine.handle_event(ChannelEvent::DataReady)?;

    let registrations = host.take_sent();
    for reg in &registrations {
        if let Some(handle) = reg.handle() {
            host.push(&MessageWriter::new(MsgType::RegAck).u64(handle).u16(0).finish());
        }
    }
    engine.handle_event(ChannelEvent::DataReady)?;
    info!("sim: {} services registered", registrations.len());

    // ── Machine description update ────────────────────────────
    let md = engine
        .handle_of(SVC_MD_UPDATE)
        .context("md-update missing from catalog")?;
    host.push(&MessageWriter::new(MsgType::Data).u64(md).u64(1).finish());
    engine.handle_event(ChannelEvent::DataReady)?;
    report("md-update", &host.take_sent());

    // ── CPU configure ─────────────────────────────────────────
    if let Some(dr) = engine.handle_of(SVC_DR_CPU) {
        let request = MessageWriter::new(MsgType::Data)
            .u64(dr)
            .u64(2)
            .u32(CpuOp::Configure as u32)
            .u32(3)
            .u32(1)
            .u32(2)
            .u32(1)
            .finish();
        host.push(&request);
        engine.handle_event(ChannelEvent::DataReady)?;
        expect_replies(&host, 1, "dr-cpu response")?;
        report("dr-cpu", &host.take_sent());
        info!("sim: online cpus {:?}", platform.online());
    }

    // ── Variable set ──────────────────────────────────────────
    let setter = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.set_var("auto-boot?", "true"))
    };
    if host.wait_sent(1, REPLY_WAIT) {
        for req in host.take_sent() {
            let Some(handle) = req.handle() else { continue };
            host.push(
                &MessageWriter::new(MsgType::Data)
                    .u64(handle)
                    .u32(VarOp::SetResp as u32)
                    .u32(VarResult::Success as u32)
                    .finish(),
            );
        }
        engine.handle_event(ChannelEvent::DataReady)?;
    }
    match setter.join() {
        Ok(Ok(())) => info!("sim: auto-boot? stored"),
        Ok(Err(e)) => warn!("sim: set_var failed: {e}"),
        Err(_) => bail!("set_var thread panicked"),
    }

    info!("sim: platform calls {:?}", platform.calls());
    Ok(())
}

fn expect_replies(host: &HostEnd, count: usize, what: &str) -> Result<()> {
    if !host.wait_sent(count, REPLY_WAIT) {
        bail!("no {what} from engine");
    }
    Ok(())
}

fn report(what: &str, sent: &[SentMessage]) {
    for msg in sent {
        info!(
            "sim: {what} reply type {:?} handle {:?} ({} bytes)",
            msg.msg_type(),
            msg.handle(),
            msg.bytes.len()
        );
    }
}

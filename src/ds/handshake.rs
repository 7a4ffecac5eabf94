//! Handshake state machine: version negotiation and service registration.
//!
//! ```text
//!   Idle ──Up / INIT_REQ sent──▶ Started ──INIT_ACK──▶ Done
//!    ▲                              │                   │
//!    └──────── anything else ───────┘    REG_ACK / REG_NACK / UNREG_*
//! ```
//!
//! Every message with a type below DATA lands here. A peer that answers
//! INIT_REQ with anything but INIT_ACK, or speaks before the channel came
//! up, has broken the protocol and the session is torn down.

use log::{error, info, warn};

use crate::error::{DsError, Result};

use super::codec::{Message, MessageWriter};
use super::protocol::MsgType;
use super::registry::{CapState, HandshakePhase, Registry};
use super::transport::{Link, Transport};

/// Start a new session: everything unregistered, INIT_REQ on the wire.
/// The phase moves to Started only if the send succeeded.
pub fn channel_up<T: Transport>(link: &mut Link<T>, reg: &mut Registry) -> Result<()> {
    reg.reset();

    let version = reg.protocol_version();
    let msg = MessageWriter::new(MsgType::InitReq)
        .u16(version.major)
        .u16(version.minor)
        .finish();

    match link.send(&msg) {
        Ok(()) => {
            info!("ds: INIT_REQ sent (protocol {version})");
            reg.set_phase(HandshakePhase::Started);
            Ok(())
        }
        Err(e) => {
            error!("ds: INIT_REQ send failed: {e}");
            Err(e)
        }
    }
}

/// Feed one handshake-class message to the state machine.
pub fn process<T: Transport>(link: &mut Link<T>, reg: &mut Registry, msg: &Message<'_>) -> Result<()> {
    match reg.phase() {
        HandshakePhase::Idle => conn_reset(reg, "handshake message before channel up"),
        HandshakePhase::Started => {
            if msg.msg_type() != Some(MsgType::InitAck) {
                return conn_reset(reg, "expected INIT_ACK");
            }
            let minor = msg.reader().u16()?;
            info!("ds: INIT_ACK (peer minor {minor})");
            reg.set_phase(HandshakePhase::Done);
            register_services(link, reg)
        }
        HandshakePhase::Done => process_done(link, reg, msg),
    }
}

/// Offer every capability that is not already registered under a fresh
/// handle. A capability whose REG_REQ could not be sent stays Unknown.
pub fn register_services<T: Transport>(link: &mut Link<T>, reg: &mut Registry) -> Result<()> {
    let service = reg.service_version();

    for index in 0..reg.len() {
        let Some(cap) = reg.get(index) else { continue };
        if cap.is_registered() {
            continue;
        }
        let name = cap.service_name();
        let Some(handle) = reg.fresh_handle(index) else { continue };

        let msg = MessageWriter::with_capacity(MsgType::RegReq, 12 + name.len())
            .u64(handle)
            .u16(service.major)
            .u16(service.minor)
            .bytes(name.as_bytes())
            .finish();

        match link.send(&msg) {
            Ok(()) => reg.set_state_at(index, CapState::RegistrationSent),
            Err(DsError::ConnectionReset) => return Err(DsError::ConnectionReset),
            Err(e) => warn!("ds: REG_REQ for {name} not sent: {e}"),
        }
    }
    Ok(())
}

fn process_done<T: Transport>(link: &mut Link<T>, reg: &mut Registry, msg: &Message<'_>) -> Result<()> {
    let Some(msg_type) = msg.msg_type() else {
        warn!("ds: unknown handshake type {:#x}", msg.tag.msg_type);
        return Ok(());
    };

    match msg_type {
        MsgType::RegAck => {
            let handle = msg.reader().u64()?;
            match reg.set_state(handle, CapState::Registered) {
                Some(cap) => info!("ds: registered {} service", cap.service_name()),
                None => warn!("ds: REG_ACK for unknown handle {handle:#018x}"),
            }
        }
        MsgType::RegNack => {
            let mut r = msg.reader();
            let handle = r.u64()?;
            let major = r.u16().unwrap_or(0);
            match reg.set_state(handle, CapState::Unknown) {
                Some(cap) => info!(
                    "ds: registration of {} rejected (peer major {major})",
                    cap.service_name()
                ),
                None => warn!("ds: REG_NACK for unknown handle {handle:#018x}"),
            }
        }
        MsgType::UnregReq => {
            let handle = msg.reader().u64()?;
            let reply_type = match reg.set_state(handle, CapState::Unknown) {
                Some(cap) => {
                    info!("ds: peer unregistered {}", cap.service_name());
                    MsgType::UnregAck
                }
                None => {
                    warn!("ds: UNREG_REQ for unknown handle {handle:#018x}");
                    MsgType::UnregNack
                }
            };
            link.reply(&MessageWriter::new(reply_type).u64(handle).finish())?;
        }
        MsgType::UnregAck => {
            let handle = msg.reader().u64()?;
            match reg.set_state(handle, CapState::Unknown) {
                Some(cap) => info!("ds: unregistered {}", cap.service_name()),
                None => warn!("ds: UNREG_ACK for unknown handle {handle:#018x}"),
            }
        }
        MsgType::UnregNack => {
            let handle = msg.reader().u64()?;
            warn!("ds: UNREG_NACK for handle {handle:#018x}");
        }
        other => warn!("ds: ignoring {other:?} after handshake"),
    }
    Ok(())
}

/// Tear the session down after a protocol violation.
fn conn_reset(reg: &mut Registry, why: &str) -> Result<()> {
    error!("ds: connection reset ({why})");
    reg.reset();
    Err(DsError::ConnectionReset)
}

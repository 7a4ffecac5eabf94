//! Per-message routing.
//!
//! ```text
//!   type < DATA ─────────────▶ handshake::process
//!   type == NACK ────────────▶ log
//!   otherwise (DATA class) ──▶ find_cap(handle) ─┬─ miss ─▶ NACK(InvalidHandle)
//!                                                └─ hit  ─▶ capability handler
//! ```

use log::warn;

use crate::app::ports::Platform;
use crate::error::{DsError, Result};

use super::codec::{DataMessage, Message, MessageWriter};
use super::dr_cpu;
use super::engine::{DsState, Shared};
use super::handlers;
use super::handshake;
use super::protocol::{MsgType, ResultCode};
use super::registry::CapabilityKind;
use super::transport::Transport;
use super::var_config;

/// Route one decoded message. Runs with the session lock held.
pub(crate) fn dispatch<T, P>(shared: &Shared<T, P>, state: &mut DsState<T>, msg: &Message<'_>) -> Result<()>
where
    T: Transport,
    P: Platform,
{
    if msg.tag.is_handshake() {
        return handshake::process(&mut state.link, &mut state.registry, msg);
    }

    if msg.msg_type() == Some(MsgType::Nack) {
        let mut r = msg.reader();
        let handle = r.u64()?;
        let result = r.u64()?;
        warn!("ds: peer NACK for handle {handle:#018x} (result {result})");
        return Ok(());
    }

    let data = DataMessage::parse(msg)?;
    let cap = match state.registry.resolve(data.handle) {
        Ok(cap) => cap,
        Err(err @ DsError::UnknownHandle(handle)) => {
            warn!("ds: {err}, sending NACK");
            let nack = MessageWriter::new(MsgType::Nack)
                .u64(handle)
                .u64(ResultCode::InvalidHandle.raw())
                .finish();
            return state.link.reply(&nack);
        }
        Err(err) => return Err(err),
    };

    match cap.kind() {
        CapabilityKind::MdUpdate => handlers::md_update(&mut state.link, &shared.platform, &data),
        CapabilityKind::Shutdown => handlers::domain_shutdown(&mut state.link, &shared.platform, &data),
        CapabilityKind::Panic => handlers::domain_panic(&mut state.link, &shared.platform, &data),
        CapabilityKind::Pri => handlers::pri(&data),
        CapabilityKind::CpuReconfig => {
            if dr_cpu::enqueue(&mut state.link, &mut state.cpu_queue, &data)? {
                shared.cpu_wake.notify_one();
            }
            Ok(())
        }
        CapabilityKind::VarConfig => {
            if var_config::on_data(&mut state.var, &data)? {
                shared.var_doorbell.notify_all();
            }
            Ok(())
        }
    }
}

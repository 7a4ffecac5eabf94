//! Handlers for the simple request/response capabilities.
//!
//! Each one decodes its request from the DATA body, answers on the
//! request's own handle and then hands off to the platform. None of them
//! blocks; `domain-panic` does not return at all.

use log::{info, warn};

use crate::app::ports::{MachineDescriptionPort, PowerPort};
use crate::error::Result;

use super::codec::{DataMessage, MessageWriter};
use super::protocol::{DATA_RESULT_OK, MsgType, PRI_DATA, PRI_REQUEST, PRI_UPDATE};
use super::transport::{Link, Transport};

/// `md-update`: acknowledge, then refresh the machine description.
pub fn md_update<T, M>(link: &mut Link<T>, md: &M, data: &DataMessage<'_>) -> Result<()>
where
    T: Transport,
    M: MachineDescriptionPort + ?Sized,
{
    let req_num = data.reader().u64()?;
    info!("ds: machine description update (req {req_num})");

    let reply = MessageWriter::new(MsgType::Data)
        .u64(data.handle)
        .u64(req_num)
        .u32(DATA_RESULT_OK)
        .finish();
    link.reply(&reply)?;

    md.refresh();
    Ok(())
}

/// `domain-shutdown`: acknowledge, then start an orderly shutdown.
pub fn domain_shutdown<T, P>(link: &mut Link<T>, power: &P, data: &DataMessage<'_>) -> Result<()>
where
    T: Transport,
    P: PowerPort + ?Sized,
{
    let mut r = data.reader();
    let req_num = r.u64()?;
    let delay_ms = r.u32()?;
    info!("ds: shutdown request (req {req_num}, delay {delay_ms} ms)");

    link.reply(&status_reply(data.handle, req_num))?;

    power.request_shutdown(delay_ms);
    Ok(())
}

/// `domain-panic`: acknowledge and halt. The halt happens even when the
/// acknowledgement could not be sent.
pub fn domain_panic<T, P>(link: &mut Link<T>, power: &P, data: &DataMessage<'_>) -> Result<()>
where
    T: Transport,
    P: PowerPort + ?Sized,
{
    let req_num = data.reader().u64()?;
    warn!("ds: panic request (req {req_num})");

    if let Err(e) = link.reply(&status_reply(data.handle, req_num)) {
        warn!("ds: panic reply not sent: {e}");
    }

    power.halt("panic requested by domain manager")
}

/// `pri`: log only.
pub fn pri(data: &DataMessage<'_>) -> Result<()> {
    let mut r = data.reader();
    let req_num = r.u64()?;
    let kind = r.u64()?;
    info!(
        "ds: PRI {} (req {req_num}, type {kind}, len {})",
        pri_subtype(kind),
        data.frame.len()
    );
    Ok(())
}

fn pri_subtype(kind: u64) -> &'static str {
    match kind {
        PRI_REQUEST => "request",
        PRI_DATA => "data",
        PRI_UPDATE => "update",
        _ => "unknown",
    }
}

/// `(req_num, result, reason = "")`, used by shutdown and panic replies.
fn status_reply(handle: u64, req_num: u64) -> Vec<u8> {
    MessageWriter::new(MsgType::Data)
        .u64(handle)
        .u64(req_num)
        .u32(DATA_RESULT_OK)
        .cstr(b"")
        .finish()
}

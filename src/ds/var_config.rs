//! Variable-config synchronizer: set or delete a persistent host variable
//! and wait, bounded, for the host's answer.
//!
//! ```text
//!  caller                         session lock                 receive path
//!  ──────                         ────────────                 ────────────
//!  var_flight.lock()
//!  state.lock() ─ arm doorbell ─ send SET/DELETE
//!  wait_while_for(doorbell) ◀──── lock released ───▶ on_data: store result,
//!                                                    ring doorbell, notify
//!  read result, unlock
//! ```
//!
//! Only one request is in flight at a time. A response that arrives after
//! the wait ceiling is stored but nobody reads it.

use log::{debug, info, warn};

use crate::app::ports::Platform;
use crate::error::{DsError, Result};

use super::codec::{DataMessage, MessageWriter};
use super::engine::Shared;
use super::protocol::{
    HANDLE_SIZE, HEADER_SIZE, MsgType, SVC_VAR_CONFIG, SVC_VAR_CONFIG_BACKUP, VAR_MSG_MAX, VarOp,
    VarResult,
};
use super::registry::Registry;
use super::transport::Transport;

// ── Doorbell ─────────────────────────────────────────────────

/// Response slot shared between the waiting caller and the receive path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VarExchange {
    doorbell: bool,
    response: Option<u32>,
}

impl VarExchange {
    /// Clear the slot before a new request goes out.
    pub fn arm(&mut self) {
        self.doorbell = false;
        self.response = None;
    }

    pub fn rung(&self) -> bool {
        self.doorbell
    }

    pub fn response(&self) -> Option<u32> {
        self.response
    }
}

/// Handle a DATA message for either var-config service. Returns `true`
/// when the doorbell was rung.
pub fn on_data(var: &mut VarExchange, data: &DataMessage<'_>) -> Result<bool> {
    let mut r = data.reader();
    let op = r.u32()?;
    match VarOp::from_raw(op) {
        Some(VarOp::SetResp | VarOp::DeleteResp) => {
            var.response = Some(r.u32()?);
            var.doorbell = true;
            Ok(true)
        }
        _ => {
            debug!("var-config: ignoring op {op:#x}");
            Ok(false)
        }
    }
}

// ── Requests ─────────────────────────────────────────────────

/// A validated SET or DELETE request, not yet bound to a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarRequest<'a> {
    op: VarOp,
    name: &'a str,
    value: Option<&'a str>,
}

impl<'a> VarRequest<'a> {
    pub fn set(name: &'a str, value: &'a str) -> Result<Self> {
        Self::new(VarOp::SetReq, name, Some(value))
    }

    pub fn delete(name: &'a str) -> Result<Self> {
        Self::new(VarOp::DeleteReq, name, None)
    }

    fn new(op: VarOp, name: &'a str, value: Option<&'a str>) -> Result<Self> {
        if name.is_empty() {
            return Err(DsError::InvalidArgument("empty variable name"));
        }
        if name.contains('\0') || value.is_some_and(|v| v.contains('\0')) {
            return Err(DsError::InvalidArgument("variable contains NUL"));
        }
        let req = Self { op, name, value };
        if req.encoded_len() > VAR_MSG_MAX {
            return Err(DsError::VariableTooLong);
        }
        Ok(req)
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    /// Size on the wire, tag and padding included.
    pub fn encoded_len(&self) -> usize {
        let strings = self.name.len() + 1 + self.value.map_or(0, |v| v.len() + 1);
        (HEADER_SIZE + HANDLE_SIZE + 4 + strings).next_multiple_of(4)
    }

    pub fn encode(&self, handle: u64) -> Vec<u8> {
        let mut w = MessageWriter::with_capacity(MsgType::Data, self.encoded_len())
            .u64(handle)
            .u32(self.op as u32)
            .cstr(self.name.as_bytes());
        if let Some(value) = self.value {
            w = w.cstr(value.as_bytes());
        }
        w.finish_aligned()
    }
}

// ── Exchange ─────────────────────────────────────────────────

/// The primary service if registered, otherwise the backup.
pub fn select_target(reg: &Registry) -> Option<u64> {
    [SVC_VAR_CONFIG, SVC_VAR_CONFIG_BACKUP]
        .into_iter()
        .filter_map(|name| reg.find_cap_by_string(name))
        .find(|cap| cap.is_registered())
        .map(|cap| cap.handle())
}

/// Send `request` and wait for the host's verdict.
pub(crate) fn exchange<T, P>(shared: &Shared<T, P>, request: &VarRequest<'_>) -> Result<()>
where
    T: Transport,
    P: Platform,
{
    let _flight = shared.var_flight.lock();
    let mut state = shared.state.lock();

    let Some(handle) = select_target(&state.registry) else {
        warn!(
            "var-config: not registered, {} not sent",
            request.name()
        );
        return Err(DsError::NotRegistered);
    };

    state.var.arm();
    state.link.send(&request.encode(handle))?;

    let _ = shared
        .var_doorbell
        .wait_while_for(&mut state, |s| !s.var.rung(), shared.config.var_timeout());

    if !state.var.rung() {
        warn!("var-config: no response for {}", request.name());
        return Err(DsError::Timeout);
    }
    match state.var.response() {
        Some(code) if code == VarResult::Success as u32 => {
            info!("var-config: {} updated", request.name());
            Ok(())
        }
        Some(code) => {
            warn!(
                "var-config: {} rejected ({:?})",
                request.name(),
                VarResult::from_raw(code)
            );
            Err(DsError::VarRejected(code))
        }
        None => Err(DsError::Timeout),
    }
}

//! Domain-services wire protocol definitions.
//!
//! Every message is a `{type: u32, length: u32}` tag followed by exactly
//! `length` payload bytes. All integers are big-endian and packed; the
//! only padding on the wire is the 4-byte rounding applied to CPU
//! reconfiguration responses and variable-config requests.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Size of the `{type, length}` message tag.
pub const HEADER_SIZE: usize = 8;

/// Size of the handle that leads every registration and DATA payload.
pub const HANDLE_SIZE: usize = 8;

/// Default channel MTU; the receive buffer is sized to this.
pub const DEFAULT_MTU: usize = 4096;

// ── Service names ────────────────────────────────────────────

pub const SVC_MD_UPDATE: &str = "md-update";
pub const SVC_DOMAIN_SHUTDOWN: &str = "domain-shutdown";
pub const SVC_DOMAIN_PANIC: &str = "domain-panic";
pub const SVC_DR_CPU: &str = "dr-cpu";
pub const SVC_PRI: &str = "pri";
pub const SVC_VAR_CONFIG: &str = "var-config";
pub const SVC_VAR_CONFIG_BACKUP: &str = "var-config-backup";

// ── Versions ─────────────────────────────────────────────────

/// Protocol or service version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

// ── Message types ────────────────────────────────────────────

/// Message type carried in the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MsgType {
    InitReq = 0x00,
    InitAck = 0x01,
    InitNack = 0x02,
    RegReq = 0x03,
    RegAck = 0x04,
    RegNack = 0x05,
    UnregReq = 0x06,
    UnregAck = 0x07,
    UnregNack = 0x08,
    Data = 0x09,
    Nack = 0x0a,
}

impl MsgType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x00 => Some(Self::InitReq),
            0x01 => Some(Self::InitAck),
            0x02 => Some(Self::InitNack),
            0x03 => Some(Self::RegReq),
            0x04 => Some(Self::RegAck),
            0x05 => Some(Self::RegNack),
            0x06 => Some(Self::UnregReq),
            0x07 => Some(Self::UnregAck),
            0x08 => Some(Self::UnregNack),
            0x09 => Some(Self::Data),
            0x0a => Some(Self::Nack),
            _ => None,
        }
    }

    pub const fn raw(self) -> u32 {
        self as u32
    }
}

/// Result codes used in NACKs and registration replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum ResultCode {
    Ok = 0x00,
    VersionNack = 0x01,
    /// Reserved; nothing in the engine produces it.
    DuplicateRegistration = 0x02,
    InvalidHandle = 0x03,
    UnknownType = 0x04,
}

impl ResultCode {
    pub const fn raw(self) -> u64 {
        self as u64
    }
}

/// `result` value in md-update, shutdown and panic replies.
pub const DATA_RESULT_OK: u32 = 0;

// ── PRI ──────────────────────────────────────────────────────

pub const PRI_REQUEST: u64 = 0x00;
pub const PRI_DATA: u64 = 0x01;
pub const PRI_UPDATE: u64 = 0x02;

// ── CPU reconfiguration ──────────────────────────────────────

/// Request op types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CpuOp {
    Configure = 0x43,
    Unconfigure = 0x55,
    ForceUnconfigure = 0x46,
    /// Recognised on the wire but not served.
    Status = 0x53,
}

impl CpuOp {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x43 => Some(Self::Configure),
            0x55 => Some(Self::Unconfigure),
            0x46 => Some(Self::ForceUnconfigure),
            0x53 => Some(Self::Status),
            _ => None,
        }
    }
}

/// Response `op_result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CpuOpResult {
    Ok = 0x6f,
    Error = 0x65,
}

/// Per-CPU record result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CpuResult {
    Ok = 0x00,
    Failure = 0x01,
    Blocked = 0x02,
    CpuNotResponding = 0x03,
    NotInDescription = 0x04,
}

/// Per-CPU record status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CpuStatus {
    NotPresent = 0x00,
    Unconfigured = 0x01,
    Configured = 0x02,
}

/// `req_num u64, op u32, count u32`
pub const CPU_TAG_SIZE: usize = 16;

/// `cpu u32, result u32, status u32, str_off u32`
pub const CPU_RECORD_SIZE: usize = 16;

// ── Variable config ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VarOp {
    SetReq = 0x00,
    DeleteReq = 0x01,
    SetResp = 0x02,
    DeleteResp = 0x03,
}

impl VarOp {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x00 => Some(Self::SetReq),
            0x01 => Some(Self::DeleteReq),
            0x02 => Some(Self::SetResp),
            0x03 => Some(Self::DeleteResp),
            _ => None,
        }
    }
}

/// Variable-config response codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum VarResult {
    Success = 0x00,
    NoSpace = 0x01,
    InvalidVariable = 0x02,
    InvalidValue = 0x03,
    NotPresent = 0x04,
}

impl VarResult {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::NoSpace),
            0x02 => Some(Self::InvalidVariable),
            0x03 => Some(Self::InvalidValue),
            0x04 => Some(Self::NotPresent),
            _ => None,
        }
    }
}

/// Largest variable-config request the engine will put on the wire.
pub const VAR_MSG_MAX: usize = 512;

//! Unified error types for the domain-services engine.
//!
//! A single `DsError` enum that every subsystem converts into, so the
//! receive loop can decide in one place whether a failure aborts the
//! current batch or only drops one message. All variants are `Copy` so
//! they pass through the session lock and the worker without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level engine error
// ---------------------------------------------------------------------------

/// Every fallible operation in the engine funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsError {
    /// The transport reported a reset, or the peer violated the handshake.
    ConnectionReset,
    /// A message was shorter than its header claims, or a field read
    /// would run past the declared length.
    MalformedMessage,
    /// A DATA message addressed a handle the registry cannot resolve.
    UnknownHandle(u64),
    /// The transport failed for a reason other than a reset.
    Transport(TransportError),
    /// A queue entry or response buffer could not be allocated.
    AllocationFailure,
    /// A CPU reconfiguration request carried an unsupported op type.
    UnsupportedSubtype(u32),
    /// Neither variable-config service is registered.
    NotRegistered,
    /// No variable-config response arrived before the wait ceiling.
    Timeout,
    /// The host answered a variable-config request with a non-success code.
    VarRejected(u32),
    /// A variable-config request does not fit in one message.
    VariableTooLong,
    /// A caller-supplied argument cannot be encoded on the wire.
    InvalidArgument(&'static str),
    /// A CPU could not be brought up or down.
    Hotplug(HotplugError),
    /// Configuration is invalid or could not be decoded.
    Config(ConfigError),
    /// Engine start-up failed.
    Init(&'static str),
}

impl fmt::Display for DsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionReset => write!(f, "connection reset"),
            Self::MalformedMessage => write!(f, "malformed message"),
            Self::UnknownHandle(h) => write!(f, "unknown handle {h:#018x}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::AllocationFailure => write!(f, "allocation failure"),
            Self::UnsupportedSubtype(t) => write!(f, "unsupported subtype {t:#x}"),
            Self::NotRegistered => write!(f, "service not registered"),
            Self::Timeout => write!(f, "timed out waiting for response"),
            Self::VarRejected(code) => write!(f, "variable request rejected ({code})"),
            Self::VariableTooLong => write!(f, "variable request too long"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Hotplug(e) => write!(f, "hotplug: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
        }
    }
}

impl std::error::Error for DsError {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// Transient back-pressure; the write may be retried.
    Busy,
    /// The channel was reset underneath us.
    ConnectionReset,
    /// The transport accepted fewer bytes than the message length.
    ShortWrite,
    /// The channel is closed.
    Closed,
    /// Any other I/O failure.
    Io,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "channel busy"),
            Self::ConnectionReset => write!(f, "connection reset"),
            Self::ShortWrite => write!(f, "short write"),
            Self::Closed => write!(f, "channel closed"),
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for DsError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::ConnectionReset => Self::ConnectionReset,
            other => Self::Transport(other),
        }
    }
}

// ---------------------------------------------------------------------------
// CPU hotplug errors
// ---------------------------------------------------------------------------

/// Why a CPU bring-up or bring-down failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotplugError {
    /// The CPU did not respond to the start request.
    NotResponding,
    /// Any other failure, with the platform's error number.
    Failed(i32),
}

impl fmt::Display for HotplugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotResponding => write!(f, "cpu not responding"),
            Self::Failed(err) => write!(f, "failed ({err})"),
        }
    }
}

impl std::error::Error for HotplugError {}

impl From<HotplugError> for DsError {
    fn from(e: HotplugError) -> Self {
        Self::Hotplug(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A config field failed range validation.
    /// The `&'static str` names the field and the rule.
    ValidationFailed(&'static str),
    /// The JSON document could not be parsed.
    Parse,
    /// The persisted blob could not be encoded or decoded.
    Encoding,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Parse => write!(f, "parse error"),
            Self::Encoding => write!(f, "encoding error"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for DsError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Engine-wide `Result` alias.
pub type Result<T> = core::result::Result<T, DsError>;

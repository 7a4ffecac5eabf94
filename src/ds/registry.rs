//! Capability registry: the fixed table of services and the handshake
//! context.
//!
//! ```text
//! ┌───────┬───────────────────┬─────────────┬──────────────────────┐
//! │ index │ service           │ kind        │ handle               │
//! ├───────┼───────────────────┼─────────────┼──────────────────────┤
//! │ 0     │ md-update         │ MdUpdate    │ 0x00000000_<nonce>   │
//! │ 1     │ domain-shutdown   │ Shutdown    │ 0x00000001_<nonce>   │
//! │ 2     │ domain-panic      │ Panic       │ 0x00000002_<nonce>   │
//! │ 3     │ dr-cpu (hotplug)  │ CpuReconfig │ 0x00000003_<nonce>   │
//! │ …     │ pri               │ Pri         │                      │
//! │ …     │ var-config        │ VarConfig   │                      │
//! │ …     │ var-config-backup │ VarConfig   │                      │
//! └───────┴───────────────────┴─────────────┴──────────────────────┘
//! ```
//!
//! A handle is `(index << 32) | nonce`. The nonce changes on every
//! registration attempt, so a handle from an earlier session never
//! resolves to the current one.

use std::sync::OnceLock;
use std::time::Instant;

use crate::error::{DsError, Result};

use super::protocol::{
    SVC_DOMAIN_PANIC, SVC_DOMAIN_SHUTDOWN, SVC_DR_CPU, SVC_MD_UPDATE, SVC_PRI, SVC_VAR_CONFIG,
    SVC_VAR_CONFIG_BACKUP, Version,
};

/// Upper bound on the catalog size.
pub const MAX_CAPABILITIES: usize = 8;

// ── Capability ───────────────────────────────────────────────

/// Registration state of one capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapState {
    Unknown,
    RegistrationSent,
    Registered,
}

/// The closed set of capability behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    MdUpdate,
    Shutdown,
    Panic,
    CpuReconfig,
    Pri,
    VarConfig,
}

/// One row of the registry.
#[derive(Debug, Clone)]
pub struct Capability {
    index: usize,
    service_name: &'static str,
    kind: CapabilityKind,
    state: CapState,
    handle: u64,
}

impl Capability {
    fn new(index: usize, service_name: &'static str, kind: CapabilityKind) -> Self {
        Self {
            index,
            service_name,
            kind,
            state: CapState::Unknown,
            handle: (index as u64) << 32,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn service_name(&self) -> &'static str {
        self.service_name
    }

    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    pub fn state(&self) -> CapState {
        self.state
    }

    pub fn handle(&self) -> u64 {
        self.handle
    }

    pub fn is_registered(&self) -> bool {
        self.state == CapState::Registered
    }
}

/// Table index encoded in the high half of a handle.
pub fn handle_index(handle: u64) -> usize {
    (handle >> 32) as usize
}

// ── Handshake context ────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    Idle,
    Started,
    Done,
}

// ── Registry ─────────────────────────────────────────────────

/// The fixed capability table plus handshake phase and versions.
pub struct Registry {
    caps: heapless::Vec<Capability, MAX_CAPABILITIES>,
    phase: HandshakePhase,
    protocol: Version,
    service: Version,
}

impl Registry {
    /// Build the catalog. `dr-cpu` is present only when the host supports
    /// CPU hotplug; later indices shift down when it is absent.
    pub fn new(cpu_hotplug: bool, protocol: Version, service: Version) -> Self {
        let catalog = [
            (SVC_MD_UPDATE, CapabilityKind::MdUpdate),
            (SVC_DOMAIN_SHUTDOWN, CapabilityKind::Shutdown),
            (SVC_DOMAIN_PANIC, CapabilityKind::Panic),
            (SVC_DR_CPU, CapabilityKind::CpuReconfig),
            (SVC_PRI, CapabilityKind::Pri),
            (SVC_VAR_CONFIG, CapabilityKind::VarConfig),
            (SVC_VAR_CONFIG_BACKUP, CapabilityKind::VarConfig),
        ];

        let caps = catalog
            .into_iter()
            .filter(|(_, kind)| cpu_hotplug || *kind != CapabilityKind::CpuReconfig)
            .enumerate()
            .map(|(index, (name, kind))| Capability::new(index, name, kind))
            .collect();

        Self {
            caps,
            phase: HandshakePhase::Idle,
            protocol,
            service,
        }
    }

    pub fn len(&self) -> usize {
        self.caps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    pub fn caps(&self) -> &[Capability] {
        &self.caps
    }

    pub fn get(&self, index: usize) -> Option<&Capability> {
        self.caps.get(index)
    }

    pub fn phase(&self) -> HandshakePhase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: HandshakePhase) {
        self.phase = phase;
    }

    pub fn protocol_version(&self) -> Version {
        self.protocol
    }

    pub fn service_version(&self) -> Version {
        self.service
    }

    /// Resolve a handle. The index must be in range and the handle must be
    /// the one the slot currently holds.
    pub fn find_cap(&self, handle: u64) -> Option<&Capability> {
        self.caps
            .get(handle_index(handle))
            .filter(|cap| cap.handle == handle)
    }

    pub fn find_cap_by_string(&self, name: &str) -> Option<&Capability> {
        self.caps.iter().find(|cap| cap.service_name == name)
    }

    /// [`find_cap`](Self::find_cap) as a crate error, for the DATA path.
    pub fn resolve(&self, handle: u64) -> Result<&Capability> {
        self.find_cap(handle).ok_or(DsError::UnknownHandle(handle))
    }

    /// Set the state of the capability `handle` resolves to.
    /// Returns the capability on success, `None` if it does not resolve.
    pub fn set_state(&mut self, handle: u64, state: CapState) -> Option<&Capability> {
        let index = self.find_cap(handle)?.index;
        let cap = &mut self.caps[index];
        cap.state = state;
        Some(cap)
    }

    pub(crate) fn set_state_at(&mut self, index: usize, state: CapState) {
        if let Some(cap) = self.caps.get_mut(index) {
            cap.state = state;
        }
    }

    /// Generate and store a fresh handle for slot `index`.
    pub fn fresh_handle(&mut self, index: usize) -> Option<u64> {
        let cap = self.caps.get_mut(index)?;
        let old_nonce = cap.handle as u32;
        let mut nonce = clock_nonce();
        if nonce == old_nonce {
            nonce = nonce.wrapping_add(1);
        }
        cap.handle = ((index as u64) << 32) | u64::from(nonce);
        Some(cap.handle)
    }

    /// Drop back to the start-of-session state: handshake idle and every
    /// capability unregistered.
    pub fn reset(&mut self) {
        self.phase = HandshakePhase::Idle;
        for cap in &mut self.caps {
            cap.state = CapState::Unknown;
        }
    }
}

// ── Nonce source ─────────────────────────────────────────────

/// Low 32 bits of a monotonic nanosecond clock.
fn clock_nonce() -> u32 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_nanos() as u32
}

// ── Tests ────────────────────────────────────────────────────

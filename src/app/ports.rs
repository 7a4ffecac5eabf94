//! Port traits: the boundary between the engine and the host platform.
//!
//! ```text
//!   DsEngine ──▶ Port trait ──▶ Adapter (kernel glue / simulator)
//! ```
//!
//! The engine calls these from both the receive path and the CPU worker,
//! so every method takes `&self` and implementations are `Send + Sync`.
//! None of them may call back into the engine.

pub use crate::error::HotplugError;

// ───────────────────────────────────────────────────────────────
// Machine description port
// ───────────────────────────────────────────────────────────────

/// Read and refresh the host's machine description (the topology the
/// domain manager publishes).
pub trait MachineDescriptionPort {
    /// Re-read the machine description. Fire-and-forget.
    fn refresh(&self);

    /// Materialize per-CPU topology for `cpus` ahead of bring-up.
    fn fill_in_cpu_data(&self, cpus: &[u32]);

    /// Whether `cpu` appears in the current description.
    fn cpu_present(&self, cpu: u32) -> bool;
}

// ───────────────────────────────────────────────────────────────
// CPU hotplug port
// ───────────────────────────────────────────────────────────────

/// Bring individual CPUs up and down.
pub trait CpuHotplugPort {
    /// Start `cpu`. May block for as long as the platform needs.
    fn cpu_up(&self, cpu: u32) -> Result<(), HotplugError>;

    /// Stop `cpu`.
    fn cpu_down(&self, cpu: u32) -> Result<(), HotplugError>;

    /// Redistribute interrupt affinity after the online set grew.
    fn rebalance_irqs(&self);
}

// ───────────────────────────────────────────────────────────────
// Power port
// ───────────────────────────────────────────────────────────────

/// Whole-system power transitions.
pub trait PowerPort {
    /// Begin an orderly shutdown after `delay_ms`.
    fn request_shutdown(&self, delay_ms: u32);

    /// Halt immediately. Never returns.
    fn halt(&self, reason: &str) -> !;

    /// Reset the system (used by reboot).
    fn system_reset(&self);

    /// Power the system off.
    fn power_off(&self);
}

// ───────────────────────────────────────────────────────────────
// Aggregate
// ───────────────────────────────────────────────────────────────

/// Everything the engine needs from the host.
pub trait Platform: MachineDescriptionPort + CpuHotplugPort + PowerPort + Send + Sync {}

impl<T> Platform for T where T: MachineDescriptionPort + CpuHotplugPort + PowerPort + Send + Sync {}

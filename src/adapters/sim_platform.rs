//! Simulated host platform.
//!
//! Records every port call in order and keeps a toy online-CPU set.
//! CPUs can be marked absent from the machine description or made to
//! fail bring-up and bring-down, which is all the engine can observe.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use log::info;
use parking_lot::Mutex;

use crate::app::ports::{CpuHotplugPort, HotplugError, MachineDescriptionPort, PowerPort};

/// `-EINVAL`, returned when bring-up targets a CPU the description lacks.
const EINVAL: i32 = -22;

/// One observed port call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    Refresh,
    FillInCpuData(Vec<u32>),
    CpuUp(u32),
    CpuDown(u32),
    RebalanceIrqs,
    Shutdown(u32),
    Halt(String),
    SystemReset,
    PowerOff,
}

#[derive(Debug, Default)]
struct SimState {
    calls: Vec<PlatformCall>,
    online: BTreeSet<u32>,
    absent: BTreeSet<u32>,
    up_failures: BTreeMap<u32, HotplugError>,
    down_failures: BTreeMap<u32, HotplugError>,
    op_delay: Duration,
}

/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimPlatform {
    inner: Arc<Mutex<SimState>>,
}

impl SimPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// `cpu` is not in the machine description.
    pub fn mark_absent(&self, cpu: u32) {
        self.inner.lock().absent.insert(cpu);
    }

    pub fn fail_cpu_up(&self, cpu: u32, err: HotplugError) {
        self.inner.lock().up_failures.insert(cpu, err);
    }

    pub fn fail_cpu_down(&self, cpu: u32, err: HotplugError) {
        self.inner.lock().down_failures.insert(cpu, err);
    }

    /// Make every bring-up and bring-down take `delay`.
    pub fn set_op_delay(&self, delay: Duration) {
        self.inner.lock().op_delay = delay;
    }

    pub fn set_online(&self, cpus: &[u32]) {
        self.inner.lock().online = cpus.iter().copied().collect();
    }

    pub fn online(&self) -> Vec<u32> {
        self.inner.lock().online.iter().copied().collect()
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.inner.lock().calls.clone()
    }

    pub fn take_calls(&self) -> Vec<PlatformCall> {
        core::mem::take(&mut self.inner.lock().calls)
    }

    fn record(&self, call: PlatformCall) {
        self.inner.lock().calls.push(call);
    }

    fn op_delay(&self) -> Duration {
        self.inner.lock().op_delay
    }
}

impl MachineDescriptionPort for SimPlatform {
    fn refresh(&self) {
        info!("sim: machine description refreshed");
        self.record(PlatformCall::Refresh);
    }

    fn fill_in_cpu_data(&self, cpus: &[u32]) {
        self.record(PlatformCall::FillInCpuData(cpus.to_vec()));
    }

    fn cpu_present(&self, cpu: u32) -> bool {
        !self.inner.lock().absent.contains(&cpu)
    }
}

impl CpuHotplugPort for SimPlatform {
    fn cpu_up(&self, cpu: u32) -> Result<(), HotplugError> {
        self.record(PlatformCall::CpuUp(cpu));
        std::thread::sleep(self.op_delay());

        let mut state = self.inner.lock();
        if state.absent.contains(&cpu) {
            return Err(HotplugError::Failed(EINVAL));
        }
        if let Some(err) = state.up_failures.get(&cpu) {
            return Err(*err);
        }
        state.online.insert(cpu);
        Ok(())
    }

    fn cpu_down(&self, cpu: u32) -> Result<(), HotplugError> {
        self.record(PlatformCall::CpuDown(cpu));
        std::thread::sleep(self.op_delay());

        let mut state = self.inner.lock();
        if let Some(err) = state.down_failures.get(&cpu) {
            return Err(*err);
        }
        state.online.remove(&cpu);
        Ok(())
    }

    fn rebalance_irqs(&self) {
        self.record(PlatformCall::RebalanceIrqs);
    }
}

impl PowerPort for SimPlatform {
    fn request_shutdown(&self, delay_ms: u32) {
        info!("sim: orderly shutdown in {delay_ms} ms");
        self.record(PlatformCall::Shutdown(delay_ms));
    }

    fn halt(&self, reason: &str) -> ! {
        self.record(PlatformCall::Halt(reason.to_owned()));
        panic!("sim: halt: {reason}");
    }

    fn system_reset(&self) {
        self.record(PlatformCall::SystemReset);
    }

    fn power_off(&self) {
        self.record(PlatformCall::PowerOff);
    }
}

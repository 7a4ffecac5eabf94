//! The domain-services engine: one session over one channel.
//!
//! [`DsEngine`] owns the session state behind a single lock and is driven
//! by [`ChannelEvent`]s from whoever owns the transport. Callers on other
//! threads use the same engine for variable-config and power requests.

use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::{Condvar, Mutex};

use crate::app::ports::Platform;
use crate::config::EngineConfig;
use crate::error::{DsError, Result};

use super::codec::Message;
use super::dispatch;
use super::dr_cpu::{CpuQueue, DrCpuWorker};
use super::handshake;
use super::registry::{CapState, HandshakePhase, Registry};
use super::transport::{ChannelEvent, Link, Transport};
use super::var_config::{self, VarExchange, VarRequest};

/// Variable that carries the boot command across a reset.
const REBOOT_COMMAND_VAR: &str = "reboot-command";

// ── Shared session ───────────────────────────────────────────

/// Everything guarded by the session lock.
pub struct DsState<T> {
    pub link: Link<T>,
    pub registry: Registry,
    pub cpu_queue: CpuQueue,
    pub var: VarExchange,
    pub stopping: bool,
}

/// State shared between the receive path, the CPU worker and callers.
pub struct Shared<T, P> {
    pub state: Mutex<DsState<T>>,
    /// Signalled when the CPU queue grows or the engine stops.
    pub cpu_wake: Condvar,
    /// Signalled when a variable-config response arrives.
    pub var_doorbell: Condvar,
    /// Held for the whole of one variable-config exchange.
    pub var_flight: Mutex<()>,
    pub platform: P,
    pub config: EngineConfig,
}

// ── Engine ───────────────────────────────────────────────────

pub struct DsEngine<T, P>
where
    T: Transport + Send + 'static,
    P: Platform + 'static,
{
    shared: Arc<Shared<T, P>>,
    worker: Option<DrCpuWorker<T, P>>,
}

impl<T, P> DsEngine<T, P>
where
    T: Transport + Send + 'static,
    P: Platform + 'static,
{
    /// Build the session and, with CPU hotplug enabled, start the
    /// reconfiguration worker. Nothing is sent until [`ChannelEvent::Up`].
    pub fn new(transport: T, platform: P, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let registry = Registry::new(config.cpu_hotplug, config.protocol, config.service);
        let services = registry.len();
        let shared = Arc::new(Shared {
            state: Mutex::new(DsState {
                link: Link::new(transport, config.retry_policy()),
                registry,
                cpu_queue: CpuQueue::new(),
                var: VarExchange::default(),
                stopping: false,
            }),
            cpu_wake: Condvar::new(),
            var_doorbell: Condvar::new(),
            var_flight: Mutex::new(()),
            platform,
            config,
        });

        let worker = if shared.config.cpu_hotplug {
            Some(DrCpuWorker::spawn(Arc::clone(&shared))?)
        } else {
            None
        };

        info!(
            "ds: engine ready ({services} services, protocol {})",
            shared.config.protocol
        );
        Ok(Self { shared, worker })
    }

    // ── Channel events ───────────────────────────────────────

    pub fn handle_event(&self, event: ChannelEvent) -> Result<()> {
        match event {
            ChannelEvent::Up => self.channel_up(),
            ChannelEvent::DataReady => self.process_incoming().map(|_| ()),
            ChannelEvent::Reset => {
                self.reset();
                Ok(())
            }
        }
    }

    /// Start a fresh session with INIT_REQ.
    pub fn channel_up(&self) -> Result<()> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        handshake::channel_up(&mut state.link, &mut state.registry)
    }

    /// Drain every pending message. Returns how many were handled.
    ///
    /// A malformed message or a connection reset aborts the rest of the
    /// batch; a reset also drops the session back to Idle.
    pub fn process_incoming(&self) -> Result<usize> {
        let mut buf = vec![0u8; self.shared.config.mtu];
        let mut handled = 0;

        loop {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;

            let tag = match state.link.recv(&mut buf) {
                Ok(Some(tag)) => tag,
                Ok(None) => return Ok(handled),
                Err(e) => return Err(abort_batch(state, e)),
            };

            let outcome = Message::parse(&buf[..tag.frame_len()])
                .and_then(|msg| dispatch::dispatch(&*self.shared, state, &msg));
            if let Err(e) = outcome {
                return Err(abort_batch(state, e));
            }
            handled += 1;
        }
    }

    /// The channel went away: forget the session.
    pub fn reset(&self) {
        info!("ds: channel reset");
        self.shared.state.lock().registry.reset();
    }

    // ── Variable config ──────────────────────────────────────

    pub fn set_var(&self, name: &str, value: &str) -> Result<()> {
        var_config::exchange(&*self.shared, &VarRequest::set(name, value)?)
    }

    pub fn delete_var(&self, name: &str) -> Result<()> {
        var_config::exchange(&*self.shared, &VarRequest::delete(name)?)
    }

    // ── Power ────────────────────────────────────────────────

    /// Store `"boot <command>"` for the next boot, then reset the system.
    /// The reset happens even if the variable could not be stored.
    pub fn reboot(&self, boot_command: &str) {
        if !boot_command.is_empty() {
            let mut full: heapless::String<256> = heapless::String::new();
            for ch in "boot ".chars().chain(boot_command.chars()) {
                if full.push(ch).is_err() {
                    warn!("ds: boot command truncated to {} bytes", full.len());
                    break;
                }
            }
            if let Err(e) = self.set_var(REBOOT_COMMAND_VAR, &full) {
                error!("ds: could not store {REBOOT_COMMAND_VAR}: {e}");
            }
        }
        self.shared.platform.system_reset();
    }

    pub fn power_off(&self) {
        self.shared.platform.power_off();
    }

    // ── Introspection ────────────────────────────────────────

    pub fn phase(&self) -> HandshakePhase {
        self.shared.state.lock().registry.phase()
    }

    pub fn cap_state(&self, service: &str) -> Option<CapState> {
        let state = self.shared.state.lock();
        state.registry.find_cap_by_string(service).map(|c| c.state())
    }

    pub fn handle_of(&self, service: &str) -> Option<u64> {
        let state = self.shared.state.lock();
        state.registry.find_cap_by_string(service).map(|c| c.handle())
    }

    pub fn platform(&self) -> &P {
        &self.shared.platform
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Stop the CPU worker after it finishes what is queued.
    pub fn stop(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }
    }
}

fn abort_batch<T>(state: &mut DsState<T>, e: DsError) -> DsError {
    match e {
        DsError::ConnectionReset => {
            error!("ds: connection reset, session dropped");
            state.registry.reset();
        }
        DsError::MalformedMessage => warn!("ds: malformed message, rest of batch dropped"),
        ref other => error!("ds: receive failed: {other}"),
    }
    e
}

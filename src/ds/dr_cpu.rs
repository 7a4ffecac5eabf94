//! Dynamic CPU reconfiguration (`dr-cpu`).
//!
//! ```text
//!  receive path                       worker thread
//!  ────────────                       ─────────────
//!  DATA(dr-cpu) ──copy──▶ CpuQueue ──swap──▶ batch ──▶ plan ──▶ cpu_up / cpu_down
//!       │ (full / no memory)                                        │
//!       └──▶ error reply                          one response per request
//! ```
//!
//! The receive path only copies the request and wakes the worker. All
//! bring-up and bring-down runs on the worker with the session lock
//! released; the lock is taken again only to send each response.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{error, info, warn};

use crate::app::ports::{HotplugError, Platform};
use crate::error::{DsError, Result};

use super::codec::{DataMessage, MessageWriter, WireReader};
use super::engine::Shared;
use super::protocol::{
    CPU_RECORD_SIZE, CPU_TAG_SIZE, CpuOp, CpuOpResult, CpuResult, CpuStatus, HANDLE_SIZE, MsgType,
};
use super::transport::{Link, Transport};

/// Requests held between the receive path and the worker.
pub const CPU_QUEUE_DEPTH: usize = 32;

pub type CpuQueue = heapless::Deque<CpuRequest, CPU_QUEUE_DEPTH>;

// ── Queue entry ──────────────────────────────────────────────

/// An owned copy of one reconfiguration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuRequest {
    pub handle: u64,
    pub body: Vec<u8>,
}

impl CpuRequest {
    /// Copy the request body without aborting on allocation failure.
    pub fn copy_from(data: &DataMessage<'_>) -> Result<Self> {
        let mut body = Vec::new();
        body.try_reserve_exact(data.body.len())
            .map_err(|_| DsError::AllocationFailure)?;
        body.extend_from_slice(data.body);
        Ok(Self {
            handle: data.handle,
            body,
        })
    }
}

/// `req_num u64, op u32, count u32`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTag {
    pub req_num: u64,
    pub op: u32,
    pub count: u32,
}

impl CpuTag {
    pub fn parse(r: &mut WireReader<'_>) -> Result<Self> {
        Ok(Self {
            req_num: r.u64()?,
            op: r.u32()?,
            count: r.u32()?,
        })
    }
}

// ── Planning ─────────────────────────────────────────────────

/// What the worker will do for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuPlan {
    pub req_num: u64,
    pub op: CpuOp,
    /// Distinct, in-range ids in ascending order.
    pub cpus: Vec<u32>,
}

/// Why a request cannot be carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanError {
    /// No complete tag; nothing to correlate a reply with.
    NoTag,
    /// The op is not configure, unconfigure or force-unconfigure.
    Unsupported { req_num: u64, op: u32 },
    /// The declared record count runs past the message.
    Truncated { req_num: u64, count: u32 },
}

impl PlanError {
    /// Correlation id for the error reply, if there is one.
    pub fn req_num(&self) -> Option<u64> {
        match self {
            Self::NoTag => None,
            Self::Unsupported { req_num, .. } | Self::Truncated { req_num, .. } => Some(*req_num),
        }
    }
}

impl From<PlanError> for DsError {
    fn from(e: PlanError) -> Self {
        match e {
            PlanError::Unsupported { op, .. } => Self::UnsupportedSubtype(op),
            PlanError::NoTag | PlanError::Truncated { .. } => Self::MalformedMessage,
        }
    }
}

/// Decode a request body into a plan.
pub fn plan_request(body: &[u8], max_cpus: u32) -> core::result::Result<CpuPlan, PlanError> {
    let mut r = WireReader::new(body);
    let tag = CpuTag::parse(&mut r).map_err(|_| PlanError::NoTag)?;

    let op = match CpuOp::from_raw(tag.op) {
        Some(op @ (CpuOp::Configure | CpuOp::Unconfigure | CpuOp::ForceUnconfigure)) => op,
        Some(CpuOp::Status) | None => {
            return Err(PlanError::Unsupported {
                req_num: tag.req_num,
                op: tag.op,
            });
        }
    };

    let truncated = PlanError::Truncated {
        req_num: tag.req_num,
        count: tag.count,
    };
    let list_len = (tag.count as usize).checked_mul(4).ok_or(truncated)?;
    let list = r.bytes(list_len).map_err(|_| truncated)?;
    let ids = list
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]));

    Ok(CpuPlan {
        req_num: tag.req_num,
        op,
        cpus: purge_ids(ids, max_cpus),
    })
}

/// Drop duplicates and ids at or above `max_cpus`; ascending order.
pub fn purge_ids(ids: impl IntoIterator<Item = u32>, max_cpus: u32) -> Vec<u32> {
    ids.into_iter()
        .filter(|&id| id < max_cpus)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ── Response ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuRecord {
    pub cpu: u32,
    pub result: CpuResult,
    pub status: CpuStatus,
}

/// Aggregated answer to one request, one record per planned CPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuResponse {
    req_num: u64,
    records: Vec<CpuRecord>,
}

impl CpuResponse {
    /// Every record starts as OK with `default_status`.
    pub fn new(req_num: u64, cpus: &[u32], default_status: CpuStatus) -> Result<Self> {
        let mut records = Vec::new();
        records
            .try_reserve_exact(cpus.len())
            .map_err(|_| DsError::AllocationFailure)?;
        records.extend(cpus.iter().map(|&cpu| CpuRecord {
            cpu,
            result: CpuResult::Ok,
            status: default_status,
        }));
        Ok(Self { req_num, records })
    }

    pub fn mark(&mut self, cpu: u32, result: CpuResult, status: CpuStatus) {
        if let Some(rec) = self.records.iter_mut().find(|r| r.cpu == cpu) {
            rec.result = result;
            rec.status = status;
        }
    }

    pub fn records(&self) -> &[CpuRecord] {
        &self.records
    }

    pub fn encode(&self, handle: u64) -> Vec<u8> {
        let capacity = HANDLE_SIZE + CPU_TAG_SIZE + self.records.len() * CPU_RECORD_SIZE;
        let mut w = MessageWriter::with_capacity(MsgType::Data, capacity)
            .u64(handle)
            .u64(self.req_num)
            .u32(CpuOpResult::Ok as u32)
            .u32(self.records.len() as u32);
        for rec in &self.records {
            w = w
                .u32(rec.cpu)
                .u32(rec.result as u32)
                .u32(rec.status as u32)
                .u32(0);
        }
        w.finish_aligned()
    }
}

/// `op_result = Error`, no records.
pub fn encode_error(handle: u64, req_num: u64) -> Vec<u8> {
    MessageWriter::with_capacity(MsgType::Data, HANDLE_SIZE + CPU_TAG_SIZE)
        .u64(handle)
        .u64(req_num)
        .u32(CpuOpResult::Error as u32)
        .u32(0)
        .finish_aligned()
}

// ── Producer ─────────────────────────────────────────────────

/// Queue a request from the receive path. Returns `true` when the worker
/// has something new to do.
///
/// A request without a complete tag is malformed. A full queue or a failed
/// copy is answered straight away with an error reply.
pub fn enqueue<T: Transport>(link: &mut Link<T>, queue: &mut CpuQueue, data: &DataMessage<'_>) -> Result<bool> {
    let tag = CpuTag::parse(&mut data.reader())?;

    let entry = match CpuRequest::copy_from(data) {
        Ok(entry) => entry,
        Err(e) => {
            error!("dr-cpu: req {} dropped: {e}", tag.req_num);
            link.reply(&encode_error(data.handle, tag.req_num))?;
            return Ok(false);
        }
    };

    if queue.push_back(entry).is_err() {
        error!("dr-cpu: queue full, req {} rejected", tag.req_num);
        link.reply(&encode_error(data.handle, tag.req_num))?;
        return Ok(false);
    }
    Ok(true)
}

// ── Worker ───────────────────────────────────────────────────

/// The reconfiguration thread. Stopping it finishes whatever is queued.
pub struct DrCpuWorker<T, P>
where
    T: Transport + Send + 'static,
    P: Platform + 'static,
{
    shared: Arc<Shared<T, P>>,
    thread: Option<JoinHandle<()>>,
}

impl<T, P> DrCpuWorker<T, P>
where
    T: Transport + Send + 'static,
    P: Platform + 'static,
{
    pub fn spawn(shared: Arc<Shared<T, P>>) -> Result<Self> {
        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("dr-cpu".into())
            .spawn(move || run::<T, P>(&worker_shared))
            .map_err(|_| DsError::Init("failed to spawn dr-cpu worker"))?;
        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.shared.state.lock().stopping = true;
        self.shared.cpu_wake.notify_all();
        if thread.join().is_err() {
            error!("dr-cpu: worker panicked");
        }
    }
}

impl<T, P> Drop for DrCpuWorker<T, P>
where
    T: Transport + Send + 'static,
    P: Platform + 'static,
{
    fn drop(&mut self) {
        self.stop();
    }
}

fn run<T: Transport, P: Platform>(shared: &Shared<T, P>) {
    info!("dr-cpu: worker started");
    loop {
        let mut batch = {
            let mut state = shared.state.lock();
            shared
                .cpu_wake
                .wait_while(&mut state, |s| s.cpu_queue.is_empty() && !s.stopping);
            if state.cpu_queue.is_empty() {
                break;
            }
            core::mem::replace(&mut state.cpu_queue, CpuQueue::new())
        };

        while let Some(req) = batch.pop_front() {
            process_request(shared, &req);
        }
    }
    info!("dr-cpu: worker stopped");
}

fn process_request<T: Transport, P: Platform>(shared: &Shared<T, P>, req: &CpuRequest) {
    let plan = match plan_request(&req.body, shared.config.max_cpus) {
        Ok(plan) => plan,
        Err(e) => {
            let err = DsError::from(e);
            match e.req_num() {
                Some(req_num) => {
                    warn!("dr-cpu: req {req_num} refused: {err}");
                    send(shared, &encode_error(req.handle, req_num));
                }
                None => warn!("dr-cpu: request dropped: {err}"),
            }
            return;
        }
    };

    let outcome = match plan.op {
        CpuOp::Configure => configure(shared, req.handle, &plan),
        _ => unconfigure(shared, req.handle, &plan),
    };
    if let Err(e) = outcome {
        error!("dr-cpu: req {} failed: {e}", plan.req_num);
        send(shared, &encode_error(req.handle, plan.req_num));
    }
}

fn configure<T: Transport, P: Platform>(shared: &Shared<T, P>, handle: u64, plan: &CpuPlan) -> Result<()> {
    let platform = &shared.platform;
    let mut resp = CpuResponse::new(plan.req_num, &plan.cpus, CpuStatus::Configured)?;

    platform.fill_in_cpu_data(&plan.cpus);

    for &cpu in &plan.cpus {
        info!("dr-cpu: starting cpu {cpu}");
        if let Err(e) = platform.cpu_up(cpu) {
            let err = DsError::from(e);
            warn!("dr-cpu: cpu {cpu} startup failed: {err}");
            let (result, status) = startup_outcome(err, platform.cpu_present(cpu));
            resp.mark(cpu, result, status);
        }
    }

    send(shared, &resp.encode(handle));

    platform.rebalance_irqs();
    Ok(())
}

/// Record for a CPU whose bring-up failed.
fn startup_outcome(err: DsError, present: bool) -> (CpuResult, CpuStatus) {
    match err {
        _ if !present => (CpuResult::NotInDescription, CpuStatus::NotPresent),
        DsError::Hotplug(HotplugError::NotResponding) => {
            (CpuResult::CpuNotResponding, CpuStatus::Unconfigured)
        }
        _ => (CpuResult::Failure, CpuStatus::Unconfigured),
    }
}

fn unconfigure<T: Transport, P: Platform>(shared: &Shared<T, P>, handle: u64, plan: &CpuPlan) -> Result<()> {
    let platform = &shared.platform;
    let mut resp = CpuResponse::new(plan.req_num, &plan.cpus, CpuStatus::Unconfigured)?;

    for &cpu in &plan.cpus {
        info!("dr-cpu: shutting down cpu {cpu}");
        if let Err(e) = platform.cpu_down(cpu) {
            warn!("dr-cpu: cpu {cpu} shutdown failed: {}", DsError::from(e));
            resp.mark(cpu, CpuResult::Failure, CpuStatus::Configured);
        }
    }

    send(shared, &resp.encode(handle));
    Ok(())
}

fn send<T: Transport, P: Platform>(shared: &Shared<T, P>, msg: &[u8]) {
    if let Err(e) = shared.state.lock().link.send(msg) {
        error!("dr-cpu: response dropped: {e}");
    }
}

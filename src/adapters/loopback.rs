//! In-process loopback channel.
//!
//! ```text
//!   DsEngine ──write──▶ LoopbackTransport ──▶ sent queue ──▶ HostEnd::take_sent
//!   DsEngine ◀──read─── LoopbackTransport ◀── inbound bytes ◀── HostEnd::push
//! ```
//!
//! The host end plays the domain manager in the simulator and in tests.
//! It can also make the channel busy for a number of writes or inject a
//! reset that the next read or write observes.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::ds::codec::Message;
use crate::ds::protocol::{HANDLE_SIZE, HEADER_SIZE};
use crate::ds::transport::Transport;
use crate::error::{Result, TransportError};

/// One message the engine wrote, stamped with when it arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub bytes: Vec<u8>,
    pub at: Instant,
}

impl SentMessage {
    pub fn message(&self) -> Result<Message<'_>> {
        Message::parse(&self.bytes)
    }

    pub fn msg_type(&self) -> Option<u32> {
        self.message().ok().map(|m| m.tag.msg_type)
    }

    /// Leading handle of a registration or DATA-class payload.
    pub fn handle(&self) -> Option<u64> {
        self.message().ok()?.reader().u64().ok()
    }

    /// Payload after the handle.
    pub fn body(&self) -> &[u8] {
        self.bytes.get(HEADER_SIZE + HANDLE_SIZE..).unwrap_or(&[])
    }
}

#[derive(Default)]
struct Wire {
    inbound: VecDeque<u8>,
    sent: VecDeque<SentMessage>,
    busy_writes: u32,
    reset_pending: bool,
    closed: bool,
}

#[derive(Default)]
struct Inner {
    wire: Mutex<Wire>,
    sent_cv: Condvar,
}

/// Guest side, handed to the engine.
pub struct LoopbackTransport {
    inner: Arc<Inner>,
}

/// Host side, kept by the caller.
#[derive(Clone)]
pub struct HostEnd {
    inner: Arc<Inner>,
}

/// Create a connected pair.
pub fn loopback() -> (LoopbackTransport, HostEnd) {
    let inner = Arc::new(Inner::default());
    (
        LoopbackTransport {
            inner: Arc::clone(&inner),
        },
        HostEnd { inner },
    )
}

impl Transport for LoopbackTransport {
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, TransportError> {
        let mut wire = self.inner.wire.lock();
        if wire.reset_pending {
            wire.reset_pending = false;
            return Err(TransportError::ConnectionReset);
        }
        if wire.closed {
            return Err(TransportError::Closed);
        }
        let n = wire.inbound.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> core::result::Result<usize, TransportError> {
        let mut wire = self.inner.wire.lock();
        if wire.reset_pending {
            wire.reset_pending = false;
            return Err(TransportError::ConnectionReset);
        }
        if wire.closed {
            return Err(TransportError::Closed);
        }
        if wire.busy_writes > 0 {
            wire.busy_writes -= 1;
            return Err(TransportError::Busy);
        }
        wire.sent.push_back(SentMessage {
            bytes: data.to_vec(),
            at: Instant::now(),
        });
        self.inner.sent_cv.notify_all();
        Ok(data.len())
    }
}

impl HostEnd {
    /// Queue bytes for the engine to read.
    pub fn push(&self, bytes: &[u8]) {
        self.inner.wire.lock().inbound.extend(bytes);
    }

    pub fn pending_inbound(&self) -> usize {
        self.inner.wire.lock().inbound.len()
    }

    /// Fail the next `writes` writes with [`TransportError::Busy`].
    pub fn set_busy(&self, writes: u32) {
        self.inner.wire.lock().busy_writes = writes;
    }

    /// The next read or write reports a connection reset.
    pub fn inject_reset(&self) {
        self.inner.wire.lock().reset_pending = true;
    }

    pub fn close(&self) {
        self.inner.wire.lock().closed = true;
    }

    pub fn sent_count(&self) -> usize {
        self.inner.wire.lock().sent.len()
    }

    pub fn take_sent(&self) -> Vec<SentMessage> {
        self.inner.wire.lock().sent.drain(..).collect()
    }

    /// Wait until at least `count` messages are waiting in the sent queue.
    /// Returns `false` on timeout.
    pub fn wait_sent(&self, count: usize, timeout: Duration) -> bool {
        let mut wire = self.inner.wire.lock();
        let _ = self
            .inner
            .sent_cv
            .wait_while_for(&mut wire, |w| w.sent.len() < count, timeout);
        wire.sent.len() >= count
    }
}

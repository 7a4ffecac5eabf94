//! Transport abstraction: the reliable, message-oriented channel to the
//! domain manager.
//!
//! The engine never opens, binds or reconnects the channel; the owner of
//! the transport does that and reports liveness through [`ChannelEvent`].
//! [`Link`] wraps a transport with the bounded retry policy applied to
//! every send.

use core::time::Duration;

use log::{error, warn};

use crate::error::{DsError, Result, TransportError};

use super::codec::{self, MsgTag};

/// Byte-oriented channel.
pub trait Transport {
    /// Read up to `buf.len()` bytes into `buf`.
    /// Returns the number of bytes actually read; 0 means nothing pending.
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, TransportError>;

    /// Write `data` to the channel.
    /// Returns the number of bytes accepted; [`TransportError::Busy`] is
    /// transient and may be retried.
    fn write(&mut self, data: &[u8]) -> core::result::Result<usize, TransportError>;
}

/// Liveness and readiness events reported by the transport owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel came up; start the handshake.
    Up,
    /// One or more messages are waiting to be read.
    DataReady,
    /// The channel was reset; the session is gone.
    Reset,
}

/// How often and how patiently a busy channel is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 1000,
            delay: Duration::from_micros(1),
        }
    }
}

/// A transport plus its send policy.
pub struct Link<T> {
    transport: T,
    retry: RetryPolicy,
}

impl<T: Transport> Link<T> {
    pub fn new(transport: T, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    /// Send one complete message.
    ///
    /// A busy channel is retried up to `retry.attempts` times with
    /// `retry.delay` between attempts; running out of attempts is a hard
    /// failure reported to the caller and never retried further up.
    pub fn send(&mut self, msg: &[u8]) -> Result<()> {
        let mut attempts = 0;
        loop {
            match self.transport.write(msg) {
                Ok(n) if n == msg.len() => return Ok(()),
                Ok(n) => {
                    warn!("ds: short write ({n} of {} bytes)", msg.len());
                    return Err(DsError::Transport(TransportError::ShortWrite));
                }
                Err(TransportError::Busy) => {
                    attempts += 1;
                    if attempts >= self.retry.attempts {
                        warn!("ds: channel busy after {attempts} attempts, dropping send");
                        return Err(DsError::Transport(TransportError::Busy));
                    }
                    std::thread::sleep(self.retry.delay);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Send a reply whose loss does not end the batch. Only a connection
    /// reset is passed back to the caller.
    pub fn reply(&mut self, msg: &[u8]) -> Result<()> {
        match self.send(msg) {
            Err(DsError::ConnectionReset) => Err(DsError::ConnectionReset),
            Err(e) => {
                error!("ds: reply dropped: {e}");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    /// Read the next message into `buf`; see [`codec::read_message`].
    pub fn recv(&mut self, buf: &mut [u8]) -> Result<Option<MsgTag>> {
        codec::read_message(&mut self.transport, buf)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

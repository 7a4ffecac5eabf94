//! Tag + payload message codec.
//!
//! Wire format:
//! ```text
//! ┌────────────┬────────────┬──────────────────────────┐
//! │ Type (4B)  │ Length (4B)│ Payload (Length bytes)   │
//! │ BE u32     │ BE u32     │                          │
//! └────────────┴────────────┴──────────────────────────┘
//! ```
//!
//! The peer is untrusted. Nothing here reads a field without first
//! checking it lies inside the declared payload, and a transport that
//! delivers fewer bytes than the tag declares yields
//! [`DsError::MalformedMessage`] instead of zero-filled data.

use log::warn;

use crate::error::{DsError, Result};

use super::protocol::{HANDLE_SIZE, HEADER_SIZE, MsgType};
use super::transport::Transport;

// ── Tag ──────────────────────────────────────────────────────

/// Decoded `{type, length}` message tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgTag {
    pub msg_type: u32,
    pub len: u32,
}

impl MsgTag {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut r = WireReader::new(bytes);
        Ok(Self {
            msg_type: r.u32()?,
            len: r.u32()?,
        })
    }

    /// Types below DATA belong to the handshake state machine.
    pub fn is_handshake(&self) -> bool {
        self.msg_type < MsgType::Data.raw()
    }

    /// Total size of the message on the wire.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.len as usize
    }
}

// ── Borrowed message views ───────────────────────────────────

/// A complete message: tag plus exactly `tag.len` payload bytes.
#[derive(Debug, Clone, Copy)]
pub struct Message<'a> {
    pub tag: MsgTag,
    pub payload: &'a [u8],
    frame: &'a [u8],
}

impl<'a> Message<'a> {
    /// Parse a frame. Bytes past the declared length are ignored.
    pub fn parse(frame: &'a [u8]) -> Result<Self> {
        let tag = MsgTag::parse(frame)?;
        let end = HEADER_SIZE
            .checked_add(tag.len as usize)
            .ok_or(DsError::MalformedMessage)?;
        let frame = frame.get(..end).ok_or(DsError::MalformedMessage)?;
        Ok(Self {
            tag,
            payload: &frame[HEADER_SIZE..],
            frame,
        })
    }

    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::from_raw(self.tag.msg_type)
    }

    /// The whole message, tag included.
    pub fn frame(&self) -> &'a [u8] {
        self.frame
    }

    pub fn reader(&self) -> WireReader<'a> {
        WireReader::new(self.payload)
    }
}

/// A DATA-class message split into its handle and capability body.
#[derive(Debug, Clone, Copy)]
pub struct DataMessage<'a> {
    pub handle: u64,
    pub body: &'a [u8],
    pub frame: &'a [u8],
}

impl<'a> DataMessage<'a> {
    pub fn parse(msg: &Message<'a>) -> Result<Self> {
        let mut r = msg.reader();
        let handle = r.u64()?;
        Ok(Self {
            handle,
            body: &msg.payload[HANDLE_SIZE..],
            frame: msg.frame(),
        })
    }

    pub fn reader(&self) -> WireReader<'a> {
        WireReader::new(self.body)
    }
}

// ── Bounds-checked field reader ──────────────────────────────

/// Cursor over a payload. Every accessor fails with
/// [`DsError::MalformedMessage`] instead of reading past the end.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(DsError::MalformedMessage)?;
        let out = self.buf.get(self.pos..end).ok_or(DsError::MalformedMessage)?;
        self.pos = end;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    pub fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    /// Read a NUL-terminated string; the terminator is consumed but not
    /// returned. A missing terminator is malformed.
    pub fn cstr(&mut self) -> Result<&'a [u8]> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DsError::MalformedMessage)?;
        self.pos += nul + 1;
        Ok(&rest[..nul])
    }

    /// Everything not yet consumed.
    pub fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }
}

// ── Encoder ──────────────────────────────────────────────────

/// Builds one message. The length field is filled in by `finish`.
#[derive(Debug, Clone)]
pub struct MessageWriter {
    buf: Vec<u8>,
}

impl MessageWriter {
    pub fn new(msg_type: MsgType) -> Self {
        Self::with_capacity(msg_type, 0)
    }

    pub fn with_capacity(msg_type: MsgType, payload_capacity: usize) -> Self {
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload_capacity);
        buf.extend_from_slice(&msg_type.raw().to_be_bytes());
        buf.extend_from_slice(&[0; 4]);
        Self { buf }
    }

    #[must_use]
    pub fn u16(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    #[must_use]
    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    #[must_use]
    pub fn u64(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    #[must_use]
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(data);
        self
    }

    /// Append `s` followed by a NUL terminator.
    #[must_use]
    pub fn cstr(mut self, s: &[u8]) -> Self {
        self.buf.extend_from_slice(s);
        self.buf.push(0);
        self
    }

    /// Current total length, tag included.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.len() == HEADER_SIZE
    }

    /// Fill in the length field and return the encoded message.
    pub fn finish(mut self) -> Vec<u8> {
        let len = (self.buf.len() - HEADER_SIZE) as u32;
        self.buf[4..HEADER_SIZE].copy_from_slice(&len.to_be_bytes());
        self.buf
    }

    /// Zero-pad the total length up to a 4-byte boundary, then finish.
    pub fn finish_aligned(mut self) -> Vec<u8> {
        let padded = self.buf.len().next_multiple_of(4);
        self.buf.resize(padded, 0);
        self.finish()
    }
}

// ── Transport read path ──────────────────────────────────────

/// Read one message from `transport` into `buf`.
///
/// Returns `Ok(None)` when the transport has nothing pending. A header
/// that arrives partially, a declared length that does not fit in `buf`,
/// or a payload read that comes up short all yield
/// [`DsError::MalformedMessage`]; the caller must abort the batch.
///
/// None of a rejected message's bytes are left for the next read: an
/// oversized payload is read into `buf` and dropped, exactly `len` bytes,
/// and a truncated message has already drained everything pending.
pub fn read_message<T: Transport + ?Sized>(transport: &mut T, buf: &mut [u8]) -> Result<Option<MsgTag>> {
    if buf.len() < HEADER_SIZE {
        return Err(DsError::MalformedMessage);
    }

    let n = fill(transport, &mut buf[..HEADER_SIZE])?;
    if n == 0 {
        return Ok(None);
    }
    if n < HEADER_SIZE {
        return Err(DsError::MalformedMessage);
    }

    let tag = MsgTag::parse(&buf[..HEADER_SIZE])?;
    let len = tag.len as usize;
    if len > buf.len() - HEADER_SIZE {
        let dropped = discard(transport, buf, len)?;
        warn!("ds: {len}-byte payload exceeds receive buffer, {dropped} bytes dropped");
        return Err(DsError::MalformedMessage);
    }
    if fill(transport, &mut buf[HEADER_SIZE..HEADER_SIZE + len])? < len {
        return Err(DsError::MalformedMessage);
    }

    Ok(Some(tag))
}

/// Read until `dst` is full or the transport has nothing more.
fn fill<T: Transport + ?Sized>(transport: &mut T, dst: &mut [u8]) -> Result<usize> {
    let mut got = 0;
    while got < dst.len() {
        let n = transport.read(&mut dst[got..])?;
        if n == 0 {
            break;
        }
        got += n;
    }
    Ok(got)
}

/// Consume up to `len` bytes through `scratch`. Returns how many went.
fn discard<T: Transport + ?Sized>(transport: &mut T, scratch: &mut [u8], len: usize) -> Result<usize> {
    let mut dropped = 0;
    while dropped < len {
        let want = (len - dropped).min(scratch.len());
        let n = transport.read(&mut scratch[..want])?;
        if n == 0 {
            break;
        }
        dropped += n;
    }
    Ok(dropped)
}

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::ring::attrs::AttrKind;
use crate::ring::{NotifyMode, RingCore};

/// Outcome of a successful reader acquire.
///
/// Payload never crosses an attribute anchor in a single grant: when a
/// record lies within or at the start of the requested range the grant is
/// truncated at its anchor and reported as `PendingAttribute`, so the caller
/// drains the record before acquiring past it.
#[derive(Debug)]
pub enum Acquired<'a> {
    /// Granted bytes with no attribute inside the range.
    Data(&'a [u8]),
    /// Bytes up to the next attribute anchor; possibly empty when the
    /// record sits exactly at the read frontier.
    PendingAttribute(&'a [u8]),
}

impl<'a> Acquired<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        match self {
            Acquired::Data(b) | Acquired::PendingAttribute(b) => b,
        }
    }

    pub fn is_pending_attribute(&self) -> bool {
        matches!(self, Acquired::PendingAttribute(_))
    }
}

/// A Variable attribute retrieved by the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VarAttribute {
    pub tag: u16,
    pub param: u32,
    /// Payload length copied into the caller's buffer.
    pub len: usize,
}

/// The consuming endpoint of a ring.
pub struct Reader {
    core: Arc<RingCore>,
    /// Bytes acquired but not yet released or cancelled.
    pending: usize,
    /// Capability flags from open time; stored, not interpreted.
    flags: u32,
}

impl Reader {
    pub(crate) fn new(core: Arc<RingCore>, flags: u32) -> Self {
        Self {
            core,
            pending: 0,
            flags,
        }
    }

    /// Absolute position up to which this endpoint has claimed the stream:
    /// consumed bytes plus the outstanding grant. Attributes anchored at or
    /// before this frontier are deliverable.
    fn frontier(&self) -> u64 {
        self.core.buffer.read_position() + self.pending as u64
    }

    /// Reserve up to `requested` contiguous unread bytes at the read
    /// frontier. `Empty` is an error, never a zero-byte success, and a
    /// zero-byte request is rejected with `ZeroAcquire`; a grant
    /// truncated by an attribute anchor comes back as `PendingAttribute`
    /// (possibly with zero bytes) so the caller does not spuriously block.
    pub fn acquire(&mut self, requested: usize) -> Result<Acquired<'_>> {
        if self.core.terminated() {
            return Err(Error::Closed);
        }
        if requested == 0 {
            return Err(Error::ZeroAcquire);
        }
        let (mut span, avail) = self.core.buffer.reader_span(self.pending, requested);
        let anchor = self.core.attrs.lock().next_anchor_from(span.start);

        if let Some(a) = anchor {
            if a == span.start {
                return Ok(Acquired::PendingAttribute(&[]));
            }
            if a < span.start + span.len as u64 {
                span.len = (a - span.start) as usize;
                self.pending += span.len;
                // Safety: span is within the published unread region.
                return Ok(Acquired::PendingAttribute(unsafe {
                    self.core.buffer.read_slice(span)
                }));
            }
        }
        if span.len == 0 && avail == 0 {
            if self.core.writer_closed.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }
            return Err(Error::Empty);
        }
        self.pending += span.len;
        // Safety: span is within the published unread region.
        Ok(Acquired::Data(unsafe { self.core.buffer.read_slice(span) }))
    }

    /// Return `released` of the acquired bytes to the writer as free
    /// capacity, oldest first. Releasing more than acquired is the fatal
    /// `ReleaseOverrun`.
    pub fn release(&mut self, released: usize) -> Result<()> {
        if self.core.terminated() {
            return Err(Error::Closed);
        }
        if released > self.pending {
            return Err(Error::ReleaseOverrun {
                granted: self.pending,
                released,
            });
        }
        self.pending -= released;
        self.core.buffer.consume(released);
        // Unread dropped; record it so the next publish can register as a
        // watermark crossing on this side.
        self.core.reader_gate.observe(self.core.buffer.unread());
        // The writer-side gate watches free space.
        let free = self.core.buffer.capacity() - self.core.buffer.unread();
        self.core.writer_gate.fire_if(free);
        Ok(())
    }

    /// Relinquish every acquired-but-unreleased byte; a subsequent acquire
    /// grants the same bytes again.
    pub fn cancel(&mut self) -> Result<()> {
        if self.core.terminated() {
            return Err(Error::Closed);
        }
        self.pending = 0;
        Ok(())
    }

    /// After the writer has closed, an empty queue means end of stream
    /// rather than "try again later".
    fn map_drained(&self, e: Error) -> Error {
        match e {
            Error::NoAttribute if self.core.writer_closed.load(Ordering::Acquire) => Error::Closed,
            other => other,
        }
    }

    /// Pop the next attribute record once the read frontier has reached its
    /// anchor. Routing errors: `NoAttribute` (nothing queued), `PendingData`
    /// (anchor not yet reached), `VariableAttribute` (use
    /// [`get_var_attribute`](Self::get_var_attribute)).
    pub fn get_attribute(&mut self) -> Result<(u16, u32)> {
        if self.core.terminated() {
            return Err(Error::Closed);
        }
        let frontier = self.frontier();
        let mut attrs = self.core.attrs.lock();
        let front = match attrs.reachable_front(frontier) {
            Ok(front) => front,
            Err(e) => return Err(self.map_drained(e)),
        };
        if matches!(front.kind, AttrKind::Variable(_)) {
            return Err(Error::VariableAttribute);
        }
        let record = attrs.pop().ok_or(Error::NoAttribute)?;
        drop(attrs);
        // Freed metadata space; wake a writer blocked on the queue or
        // draining for close.
        self.core.writer_gate.force();
        Ok((record.tag, record.param))
    }

    /// Pop the next Variable record, copying its payload into `buf`. With
    /// `buf` sized to the ring's declared maximum, `BufferTooSmall` cannot
    /// happen; treat it as a fatal protocol mismatch.
    pub fn get_var_attribute(&mut self, buf: &mut [u8]) -> Result<VarAttribute> {
        if self.core.terminated() {
            return Err(Error::Closed);
        }
        let frontier = self.frontier();
        let mut attrs = self.core.attrs.lock();
        let front = match attrs.reachable_front(frontier) {
            Ok(front) => front,
            Err(e) => return Err(self.map_drained(e)),
        };
        let payload = match &front.kind {
            AttrKind::Fixed => return Err(Error::FixedAttribute),
            AttrKind::Variable(p) => p,
        };
        if payload.len() > buf.len() {
            return Err(Error::BufferTooSmall {
                needed: payload.len(),
                provided: buf.len(),
            });
        }
        let len = payload.len();
        buf[..len].copy_from_slice(payload);
        let record = attrs.pop().ok_or(Error::NoAttribute)?;
        drop(attrs);
        self.core.writer_gate.force();
        Ok(VarAttribute {
            tag: record.tag,
            param: record.param,
            len,
        })
    }

    /// Bytes of attribute metadata not yet consumed.
    pub fn pending_attr_size(&self) -> usize {
        self.core.attrs.lock().pending_size()
    }

    /// Declared maximum Variable payload size; size receive buffers to this.
    pub fn max_attr_payload(&self) -> usize {
        self.core.attrs.lock().max_payload()
    }

    /// Arm this endpoint's gate: fire once unread bytes cross `watermark`
    /// (0 fires on any empty-to-non-empty transition or attribute arrival).
    pub fn register_notifier(&mut self, watermark: usize, mode: NotifyMode) -> Result<()> {
        if self.core.terminated() {
            return Err(Error::Closed);
        }
        self.core.reader_gate.register(watermark, mode);
        Ok(())
    }

    /// Block until this endpoint's gate fires. `None` waits forever; expiry
    /// of `Some` is the retryable `TimedOut`.
    pub fn wait_notify(&self, timeout: Option<Duration>) -> Result<()> {
        self.core.reader_gate.wait(timeout, &self.core.terminated)
    }

    /// Unread byte count currently published by the writer.
    pub fn available(&self) -> usize {
        self.core.buffer.unread()
    }

    /// Close this endpoint. The writer learns through its next operation.
    pub fn close(&mut self) {
        self.core.reader_closed.store(true, Ordering::Release);
        self.core.writer_gate.force();
    }

    /// Capability flags supplied at open time.
    pub fn flags(&self) -> u32 {
        self.flags
    }
}

impl Drop for Reader {
    fn drop(&mut self) {
        self.close();
    }
}

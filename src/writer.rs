use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::ring::{NotifyMode, RingCore};

/// The producing endpoint of a ring.
///
/// All operations take `&mut self`: a ring has exactly one writer-acquirer
/// by construction, and the borrow rules enforce that an acquired grant is
/// dropped before `release` or `cancel` touches the cursors.
pub struct Writer {
    core: Arc<RingCore>,
    /// Bytes acquired but not yet released or cancelled.
    pending: usize,
    /// Capability flags from open time (cache behavior, exact-size
    /// acquisition). Transport concerns; stored, not interpreted here.
    flags: u32,
}

impl Writer {
    pub(crate) fn new(core: Arc<RingCore>, flags: u32) -> Self {
        Self {
            core,
            pending: 0,
            flags,
        }
    }

    fn closed(&self) -> bool {
        self.core.terminated()
            || self.core.reader_closed.load(Ordering::Acquire)
            || self.core.writer_closed.load(Ordering::Acquire)
    }

    /// Reserve up to `requested` contiguous free bytes at the write frontier
    /// for filling. The grant is truncated at the physical wrap boundary and
    /// at the fill level; it is never empty, and a zero-byte request is
    /// rejected with `ZeroAcquire`. Errors with `Full` when no byte is
    /// free: wait on the gate and retry.
    ///
    /// Acquired bytes stay invisible to the reader until `release`.
    pub fn acquire(&mut self, requested: usize) -> Result<&mut [u8]> {
        if self.closed() {
            return Err(Error::Closed);
        }
        if requested == 0 {
            return Err(Error::ZeroAcquire);
        }
        let span = self.core.buffer.writer_span(self.pending, requested)?;
        self.pending += span.len;
        // Free space dropped; record the level so the next freeing release
        // registers as a crossing.
        self.core
            .writer_gate
            .observe(self.core.buffer.free(self.pending));
        // Safety: the span lies in the free region and the reader cannot
        // observe it until publish().
        Ok(unsafe { self.core.buffer.write_slice(span) })
    }

    /// Publish `released` of the acquired bytes to the reader, oldest first.
    /// Releasing more than acquired is the fatal `ReleaseOverrun`.
    pub fn release(&mut self, released: usize) -> Result<()> {
        if self.closed() {
            return Err(Error::Closed);
        }
        if released > self.pending {
            return Err(Error::ReleaseOverrun {
                granted: self.pending,
                released,
            });
        }
        self.pending -= released;
        self.core.buffer.publish(released);
        // Visibility update first, then the gate; a woken reader always
        // observes the state that fired it.
        self.core.reader_gate.fire_if(self.core.buffer.unread());
        Ok(())
    }

    /// Relinquish every acquired-but-unreleased byte without publishing it.
    /// The bytes return to free capacity and can be re-acquired; the reader
    /// never sees them.
    pub fn cancel(&mut self) -> Result<()> {
        if self.closed() {
            return Err(Error::Closed);
        }
        self.pending = 0;
        self.core.writer_gate.observe(self.core.buffer.free(0));
        Ok(())
    }

    /// Queue a Fixed attribute, anchored at the current published position:
    /// the reader receives it exactly there in the byte sequence. Errors
    /// with `AttrQueueFull` when the metadata budget is exhausted — retry
    /// after the reader consumes records.
    pub fn set_attribute(&mut self, tag: u16, param: u32) -> Result<()> {
        if self.closed() {
            return Err(Error::Closed);
        }
        let anchor = self.core.buffer.write_position();
        self.core.attrs.lock().push_fixed(anchor, tag, param)?;
        self.core.reader_gate.fire_if(self.core.buffer.unread());
        Ok(())
    }

    /// Queue a Variable attribute carrying a small payload, bounded by the
    /// ring's declared maximum. An oversize payload is the caller-contract
    /// error `PayloadTooLarge`.
    pub fn set_var_attribute(&mut self, tag: u16, param: u32, payload: &[u8]) -> Result<()> {
        if self.closed() {
            return Err(Error::Closed);
        }
        let anchor = self.core.buffer.write_position();
        self.core
            .attrs
            .lock()
            .push_variable(anchor, tag, param, payload)?;
        self.core.reader_gate.fire_if(self.core.buffer.unread());
        Ok(())
    }

    /// Bytes of attribute metadata the reader has not consumed yet.
    pub fn pending_attr_size(&self) -> usize {
        self.core.attrs.lock().pending_size()
    }

    /// Arm this endpoint's gate: fire once free space crosses `watermark`
    /// bytes (0 fires on any space freed). Registration can fail only on a
    /// terminated ring; the setup contract is retry until success.
    pub fn register_notifier(&mut self, watermark: usize, mode: NotifyMode) -> Result<()> {
        if self.core.terminated() {
            return Err(Error::Closed);
        }
        self.core.writer_gate.register(watermark, mode);
        Ok(())
    }

    /// Block until this endpoint's gate fires. `None` waits forever; expiry
    /// of `Some` is the retryable `TimedOut`.
    pub fn wait_notify(&self, timeout: Option<Duration>) -> Result<()> {
        self.core.writer_gate.wait(timeout, &self.core.terminated)
    }

    /// Force-wake the reader regardless of its watermark. Used after an
    /// end-of-transfer attribute so a peer blocked only on data still
    /// observes it.
    pub fn notify(&self) {
        self.core.reader_gate.force();
    }

    /// Deliver the reserved terminate signal: every blocking wait on either
    /// side aborts and every subsequent acquire/release returns `Closed`.
    pub fn terminate(&mut self) {
        debug!("writer terminating ring");
        self.core.terminate();
    }

    /// Close this endpoint, first waiting until the reader has drained all
    /// pending attribute records so none is silently lost. Fails cleanly
    /// with `TimedOut` on expiry or `Closed` when the reader is gone with
    /// records still queued.
    pub fn close(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.core.terminated() {
            self.core.writer_closed.store(true, Ordering::Release);
            return Ok(());
        }
        let deadline = timeout.map(|d| Instant::now() + d);
        loop {
            if self.core.attrs.lock().pending_size() == 0 {
                self.core.writer_closed.store(true, Ordering::Release);
                self.core.reader_gate.force();
                return Ok(());
            }
            if self.core.reader_closed.load(Ordering::Acquire) {
                return Err(Error::Closed);
            }
            let remaining = match deadline {
                None => None,
                Some(at) => Some(
                    at.checked_duration_since(Instant::now())
                        .ok_or(Error::TimedOut)?,
                ),
            };
            self.core.writer_gate.wait(remaining, &self.core.terminated)?;
        }
    }

    /// Capability flags supplied at open time.
    pub fn flags(&self) -> u32 {
        self.flags
    }
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.core.writer_closed.load(Ordering::Acquire) && !self.core.terminated() {
            let pending = self.core.attrs.lock().pending_size();
            if pending > 0 {
                warn!(pending, "writer dropped with attribute bytes undrained");
            }
            self.core.writer_closed.store(true, Ordering::Release);
            self.core.reader_gate.force();
        }
    }
}

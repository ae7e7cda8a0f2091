use std::slice;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use super::buffer::RingBuffer;
use crate::error::{Error, Result};

/// A contiguous span computed by an acquire call: absolute start position
/// plus granted length. Never crosses the physical wrap boundary.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Span {
    pub start: u64,
    pub len: usize,
}

impl RingBuffer {
    /// Allocate storage for `capacity` bytes. Allocation failure is reported,
    /// not aborted on, so creation leaves nothing half-built.
    pub(crate) fn new(capacity: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)?;
        data.resize(capacity, 0);
        Ok(Self {
            data: std::cell::UnsafeCell::new(data.into_boxed_slice()),
            capacity,
            write_pos: Default::default(),
            read_pos: Default::default(),
        })
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Published-but-unread byte count. Called from either side, so both
    /// cursor loads use Acquire.
    #[inline]
    pub(crate) fn unread(&self) -> usize {
        let w = self.write_pos.load(Acquire);
        let r = self.read_pos.load(Acquire);
        (w - r) as usize
    }

    /// Free byte count, from the writer's perspective. `writer_pending` is
    /// the writer's acquired-but-unreleased count, which still occupies
    /// capacity even though it is not yet published.
    #[inline]
    pub(crate) fn free(&self, writer_pending: usize) -> usize {
        self.capacity - self.unread() - writer_pending
    }

    /// Compute a writer grant of up to `requested` contiguous free bytes
    /// starting at the write frontier. Errors with `Full` when zero bytes
    /// are free; a wrap boundary truncates the grant instead.
    pub(crate) fn writer_span(&self, writer_pending: usize, requested: usize) -> Result<Span> {
        let free = self.free(writer_pending);
        if free == 0 {
            return Err(Error::Full);
        }
        let start = self.write_pos.load(Relaxed) + writer_pending as u64;
        let to_wrap = self.capacity - (start % self.capacity as u64) as usize;
        let len = requested.min(free).min(to_wrap);
        Ok(Span { start, len })
    }

    /// Compute a reader grant of up to `requested` contiguous unread bytes
    /// starting at the read frontier. Returns the span and the number of
    /// unread bytes ahead of the frontier; the caller applies attribute
    /// anchoring on top. A zero-length span here means empty.
    pub(crate) fn reader_span(&self, reader_pending: usize, requested: usize) -> (Span, usize) {
        let w = self.write_pos.load(Acquire);
        let start = self.read_pos.load(Relaxed) + reader_pending as u64;
        let avail = (w - start) as usize;
        let to_wrap = self.capacity - (start % self.capacity as u64) as usize;
        let len = requested.min(avail).min(to_wrap);
        (Span { start, len }, avail)
    }

    /// Advance the write cursor by `released`, publishing those bytes to the
    /// reader. Caller has already validated `released` against its grant.
    #[inline]
    pub(crate) fn publish(&self, released: usize) {
        let w = self.write_pos.load(Relaxed);
        self.write_pos.store(w + released as u64, Release);
    }

    /// Advance the read cursor by `released`, returning those bytes to the
    /// writer as free capacity.
    #[inline]
    pub(crate) fn consume(&self, released: usize) {
        let r = self.read_pos.load(Relaxed);
        self.read_pos.store(r + released as u64, Release);
    }

    /// Current published write position (attribute anchors point here).
    #[inline]
    pub(crate) fn write_position(&self) -> u64 {
        self.write_pos.load(Relaxed)
    }

    /// Current consumed read position.
    #[inline]
    pub(crate) fn read_position(&self) -> u64 {
        self.read_pos.load(Relaxed)
    }

    /// Shared view of a span of published bytes.
    ///
    /// # Safety
    /// `span` must lie within the unread region granted to the reader; the
    /// writer will not touch those bytes until the reader releases them.
    #[inline]
    pub(crate) unsafe fn read_slice(&self, span: Span) -> &[u8] {
        let base = (*self.data.get()).as_ptr();
        let idx = (span.start % self.capacity as u64) as usize;
        slice::from_raw_parts(base.add(idx), span.len)
    }

    /// Exclusive view of a span of free bytes.
    ///
    /// # Safety
    /// `span` must lie within the free region granted to the writer; the
    /// reader cannot observe it until `publish` advances past it.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn write_slice(&self, span: Span) -> &mut [u8] {
        let base = (*self.data.get()).as_mut_ptr();
        let idx = (span.start % self.capacity as u64) as usize;
        slice::from_raw_parts_mut(base.add(idx), span.len)
    }
}

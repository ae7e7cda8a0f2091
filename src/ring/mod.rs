//! Protocol core: byte storage, attribute side channel and notification
//! gates for one ring direction.

pub mod attrs;
pub mod buffer;
pub mod buffer_impl;
pub mod notify;

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use self::attrs::AttrQueue;
use self::buffer::RingBuffer;
use self::notify::Gate;
use crate::error::Result;

pub use self::attrs::DEFAULT_MAX_ATTR_PAYLOAD;
pub use self::notify::NotifyMode;

/// Shared control block for one ring direction: the byte buffer, the
/// attribute queue, and one gate per endpoint. Endpoints hold this behind an
/// `Arc`; all cross-endpoint state lives here.
pub(crate) struct RingCore {
    pub buffer: RingBuffer,
    pub attrs: Mutex<AttrQueue>,
    /// Fired by writer-side releases and attribute arrivals; the reader
    /// waits here.
    pub reader_gate: Gate,
    /// Fired by reader-side releases and attribute consumption; the writer
    /// waits here.
    pub writer_gate: Gate,
    /// Hard stop: set by `Writer::terminate`. Aborts every blocking wait and
    /// fails every subsequent operation with `Closed`.
    pub terminated: AtomicBool,
    /// Set once the writer has closed (after draining its attributes). The
    /// reader may still consume what was published; `Empty` then becomes
    /// `Closed`.
    pub writer_closed: AtomicBool,
    /// Set once the reader has closed; the writer has no one left to
    /// publish to.
    pub reader_closed: AtomicBool,
}

impl RingCore {
    pub fn new(capacity: usize, attr_capacity: usize, max_payload: usize) -> Result<Self> {
        Ok(Self {
            buffer: RingBuffer::new(capacity)?,
            attrs: Mutex::new(AttrQueue::new(attr_capacity, max_payload)),
            reader_gate: Gate::new(),
            writer_gate: Gate::new(),
            terminated: AtomicBool::new(false),
            writer_closed: AtomicBool::new(false),
            reader_closed: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Terminate the ring: abort all blocking waits on both sides and turn
    /// every subsequent acquire/release into `Closed`.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        self.reader_gate.force();
        self.writer_gate.force();
        self.reader_gate.interrupt();
        self.writer_gate.interrupt();
    }
}

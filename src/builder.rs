use std::sync::Arc;

use crate::error::Result;
use crate::reader::Reader;
use crate::ring::{RingCore, DEFAULT_MAX_ATTR_PAYLOAD};
use crate::writer::Writer;

/// Default data capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 16 * 1024;

/// Default attribute metadata budget in bytes.
pub const DEFAULT_ATTR_CAPACITY: usize = 1024;

/// Builder for one ring direction. Produces the writer and reader endpoint
/// pair over a freshly allocated ring.
///
/// A full-duplex link is two rings built separately, one per direction.
pub struct RingBuilder {
    capacity: usize,
    attr_capacity: usize,
    max_attr_payload: usize,
    flags: u32,
}

impl Default for RingBuilder {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            attr_capacity: DEFAULT_ATTR_CAPACITY,
            max_attr_payload: DEFAULT_MAX_ATTR_PAYLOAD,
            flags: 0,
        }
    }
}

impl RingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data capacity in bytes.
    pub fn capacity(mut self, bytes: usize) -> Self {
        self.capacity = bytes;
        self
    }

    /// Attribute metadata budget in bytes. Each record is charged a fixed
    /// overhead plus its variable payload length.
    pub fn attr_capacity(mut self, bytes: usize) -> Self {
        self.attr_capacity = bytes;
        self
    }

    /// Declared maximum Variable attribute payload size. Readers size their
    /// receive buffers to this.
    pub fn max_attr_payload(mut self, bytes: usize) -> Self {
        self.max_attr_payload = bytes;
        self
    }

    /// Capability flags handed to both endpoints (cache behavior,
    /// exact-size acquisition). They belong to the transport collaborator;
    /// the core stores them without interpreting them.
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Allocate the ring and open both endpoints. Allocation failure
    /// propagates immediately; no partial construction is left live.
    pub fn build(self) -> Result<(Writer, Reader)> {
        assert!(self.capacity > 0, "ring capacity must be non-zero");
        let core = Arc::new(RingCore::new(
            self.capacity,
            self.attr_capacity,
            self.max_attr_payload,
        )?);
        Ok((
            Writer::new(Arc::clone(&core), self.flags),
            Reader::new(core, self.flags),
        ))
    }
}

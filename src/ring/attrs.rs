// Ordered control-record side channel, interleaved with the data stream by
// position anchors.

use std::collections::VecDeque;

use crate::error::{Error, Result};

/// Metadata overhead charged per record against the attribute byte budget,
/// on top of any variable payload. Covers type, param and anchor bookkeeping.
pub(crate) const RECORD_OVERHEAD: usize = 16;

/// Default upper bound on a variable attribute payload: one 32-bit word.
pub const DEFAULT_MAX_ATTR_PAYLOAD: usize = 4;

#[derive(Debug, Clone)]
pub(crate) enum AttrKind {
    Fixed,
    Variable(Vec<u8>),
}

/// One control record, anchored at an absolute position in the byte stream.
/// Delivered to the reader exactly when its anchor is reached, never
/// reordered against the surrounding data.
#[derive(Debug, Clone)]
pub(crate) struct AttrRecord {
    pub anchor: u64,
    pub tag: u16,
    pub param: u32,
    pub kind: AttrKind,
}

impl AttrRecord {
    fn cost(&self) -> usize {
        match &self.kind {
            AttrKind::Fixed => RECORD_OVERHEAD,
            AttrKind::Variable(p) => RECORD_OVERHEAD + p.len(),
        }
    }
}

/// Bounded FIFO of attribute records. Single producer, single consumer,
/// guarded by the ring's attribute mutex.
pub(crate) struct AttrQueue {
    records: VecDeque<AttrRecord>,
    used: usize,
    capacity: usize,
    max_payload: usize,
}

impl AttrQueue {
    pub fn new(capacity: usize, max_payload: usize) -> Self {
        Self {
            records: VecDeque::new(),
            used: 0,
            capacity,
            max_payload,
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Bytes of metadata not yet consumed. Zero is the teardown drain
    /// condition for the writer endpoint.
    pub fn pending_size(&self) -> usize {
        self.used
    }

    pub fn push_fixed(&mut self, anchor: u64, tag: u16, param: u32) -> Result<()> {
        self.push(AttrRecord {
            anchor,
            tag,
            param,
            kind: AttrKind::Fixed,
        })
    }

    pub fn push_variable(&mut self, anchor: u64, tag: u16, param: u32, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: self.max_payload,
            });
        }
        self.push(AttrRecord {
            anchor,
            tag,
            param,
            kind: AttrKind::Variable(payload.to_vec()),
        })
    }

    fn push(&mut self, record: AttrRecord) -> Result<()> {
        let cost = record.cost();
        if self.used + cost > self.capacity {
            return Err(Error::AttrQueueFull {
                used: self.used,
                capacity: self.capacity,
            });
        }
        self.used += cost;
        self.records.push_back(record);
        Ok(())
    }

    /// Anchor of the first record at or past `pos`, if any. Reader acquires
    /// truncate their grant here so payload never crosses a record boundary.
    pub fn next_anchor_from(&self, pos: u64) -> Option<u64> {
        self.records
            .iter()
            .map(|r| r.anchor)
            .find(|&a| a >= pos)
    }

    /// Front record, only if the read frontier has reached its anchor.
    pub fn reachable_front(&self, frontier: u64) -> Result<&AttrRecord> {
        let front = self.records.front().ok_or(Error::NoAttribute)?;
        if front.anchor > frontier {
            return Err(Error::PendingData {
                ahead: (front.anchor - frontier) as usize,
            });
        }
        Ok(front)
    }

    /// Pop the front record and return its metadata bytes to the budget.
    pub fn pop(&mut self) -> Option<AttrRecord> {
        let record = self.records.pop_front()?;
        self.used -= record.cost();
        Some(record)
    }
}

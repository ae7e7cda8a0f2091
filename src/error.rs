use std::collections::TryReserveError;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for ring operations.
///
/// The variants split into three classes:
/// - flow control (`is_transient() == true`): the caller blocks on its
///   notification gate and retries the identical call, these never surface
///   to the application layer;
/// - protocol violations: the transfer is desynchronized, cursor or queue
///   state can no longer be trusted, abort the transfer;
/// - endpoint-fatal: allocation failure at creation, or a closed peer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// Reader acquire found no unread bytes and no reachable attribute.
    #[error("ring empty")]
    Empty,

    /// Writer acquire found zero free bytes.
    #[error("ring full")]
    Full,

    /// The bounded attribute metadata budget is exhausted. Retry after the
    /// reader consumes records.
    #[error("attribute queue full ({used} of {capacity} bytes in use)")]
    AttrQueueFull { used: usize, capacity: usize },

    /// An attribute record exists but the read frontier has not yet reached
    /// its anchor; consume the data in front of it first.
    #[error("attribute anchored {ahead} bytes past the read frontier")]
    PendingData { ahead: usize },

    /// No attribute record is queued.
    #[error("no attribute pending")]
    NoAttribute,

    /// The next record is a Variable attribute; retrieve it with
    /// `get_var_attribute` instead.
    #[error("next record is a variable attribute")]
    VariableAttribute,

    /// The next record is a Fixed attribute; retrieve it with
    /// `get_attribute` instead.
    #[error("next record is a fixed attribute")]
    FixedAttribute,

    /// A blocking wait expired. Retryable; re-issue the wait or the
    /// operation that preceded it.
    #[error("wait timed out")]
    TimedOut,

    /// The caller's receive buffer is smaller than the stored payload. With
    /// a buffer sized to the ring's declared maximum this cannot happen, so
    /// it is a fatal producer/consumer mismatch, not a retry condition.
    #[error("receive buffer too small: payload is {needed} bytes, buffer holds {provided}")]
    BufferTooSmall { needed: usize, provided: usize },

    /// A variable attribute payload exceeds the ring's declared maximum.
    #[error("attribute payload of {len} bytes exceeds declared maximum {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// `release` was called with more bytes than the outstanding grant.
    #[error("release of {released} bytes exceeds the {granted} bytes acquired")]
    ReleaseOverrun { granted: usize, released: usize },

    /// `acquire` was called for zero bytes. A grant is never empty, so a
    /// zero request is a caller bug, not a flow-control condition.
    #[error("zero-byte acquire request")]
    ZeroAcquire,

    /// An attribute type arrived where the state machine expected another.
    #[error("unexpected attribute type {found:#06x} (expected {expected:#06x})")]
    UnexpectedAttribute { expected: u16, found: u16 },

    /// The ring was terminated or the peer endpoint has closed.
    #[error("endpoint closed")]
    Closed,

    /// Backing storage allocation failed at creation time.
    #[error("ring allocation failed: {0}")]
    Allocation(#[from] TryReserveError),
}

impl Error {
    /// True for flow-control conditions that the caller resolves by waiting
    /// on its notification gate and retrying the same call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Empty
                | Error::Full
                | Error::AttrQueueFull { .. }
                | Error::PendingData { .. }
                | Error::NoAttribute
                | Error::TimedOut
        )
    }
}

// Byte storage and cursors for one ring direction.

use std::cell::UnsafeCell;
use std::sync::atomic::AtomicU64;

use crossbeam_utils::CachePadded;

/// Fixed-capacity circular byte store shared by exactly one writer endpoint
/// and one reader endpoint.
///
/// ### Concurrency design
/// - **Cursors**: `write_pos` and `read_pos` are monotonically increasing
///   byte positions, never wrapped; the physical index of a position `p` is
///   `p % capacity`. The writer stores `write_pos` with `Release` after
///   filling bytes, the reader loads it with `Acquire` before reading them,
///   and symmetrically for `read_pos`. That pair is the only happens-before
///   edge data publication needs.
/// - **Grants**: acquired-but-unreleased byte counts live on the endpoints,
///   not here. A region between a cursor and its endpoint's pending frontier
///   is exclusively owned by that endpoint until released or cancelled.
/// - Cursors are cache-padded so the two sides never share a line.
pub struct RingBuffer {
    /// Backing byte storage. Interior-mutable: the writer holds `&mut` views
    /// into its acquired span while the reader holds `&` views into the
    /// unread span, and the cursor invariant keeps those spans disjoint.
    pub(crate) data: UnsafeCell<Box<[u8]>>,

    /// Capacity in bytes, fixed at creation.
    pub(crate) capacity: usize,

    /// Next position the writer will publish up to. Bytes at positions
    /// `< write_pos` are consumer-visible.
    pub(crate) write_pos: CachePadded<AtomicU64>,

    /// Next position the reader will consume from. Bytes at positions
    /// `< read_pos` have been returned to the writer as free capacity.
    pub(crate) read_pos: CachePadded<AtomicU64>,
}

// Safety: the unread span (reader views) and the writer's acquired span are
// disjoint by the cursor invariant, each endpoint mutates only through
// `&mut self` methods, and cursor publication is Release/Acquire ordered.
unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

//! Single-writer/single-reader byte-stream ring with an embedded, ordered
//! side channel for typed control metadata.
//!
//! A ring multiplexes two things over one fixed-capacity circular byte
//! store: bulk payload, moved with a three-phase acquire/release/cancel
//! protocol, and small "attribute" records anchored to positions in the
//! byte stream, delivered to the reader exactly where the writer inserted
//! them. Watermark-based notification gates let the two endpoints block
//! and wake each other without busy-polling.
//!
//! ```
//! use ringio::{RingBuilder, Acquired};
//!
//! let (mut writer, mut reader) = RingBuilder::new().capacity(1024).build()?;
//!
//! let buf = writer.acquire(4)?;
//! buf.copy_from_slice(b"ping");
//! writer.release(4)?;
//! writer.set_attribute(7, 42)?;
//!
//! match reader.acquire(16)? {
//!     Acquired::PendingAttribute(bytes) => assert_eq!(bytes, b"ping"),
//!     Acquired::Data(bytes) => assert_eq!(bytes, b"ping"),
//! }
//! reader.release(4)?;
//! assert_eq!(reader.get_attribute()?, (7, 42));
//! # Ok::<(), ringio::Error>(())
//! ```
//!
//! This is not a message queue: it is a byte stream. Grants are contiguous,
//! never cross the physical wrap boundary, and never cross an attribute
//! anchor, so callers loop. The [`pipeline`] module shows the intended
//! bracketed-transfer usage pattern.

mod builder;
mod error;
mod reader;
pub mod ring;
mod writer;

pub mod pipeline;

pub use builder::{RingBuilder, DEFAULT_ATTR_CAPACITY, DEFAULT_CAPACITY};
pub use error::{Error, Result};
pub use reader::{Acquired, Reader, VarAttribute};
pub use ring::{NotifyMode, DEFAULT_MAX_ATTR_PAYLOAD};
pub use writer::Writer;

/// Reserved attribute type for in-band terminate signaling, distinct from
/// any application-level bracket type. The pipeline treats it as an end of
/// stream wherever an attribute is expected; the value stays reserved so it
/// never collides with application tags.
pub const ATTR_TERMINATE: u16 = u16::MAX;

/// Capability flag bits reserved for the transport collaborator. The core
/// accepts and stores them on endpoints without interpreting them.
pub mod flags {
    /// Cache coherence maintained for the data region.
    pub const DATABUF_CACHEUSE: u32 = 1 << 0;
    /// Cache coherence maintained for the attribute region.
    pub const ATTRBUF_CACHEUSE: u32 = 1 << 1;
    /// Cache coherence maintained for the control structure.
    pub const CONTROL_CACHEUSE: u32 = 1 << 2;
    /// Acquires should grant exactly the requested size or fail.
    pub const NEED_EXACT_SIZE: u32 = 1 << 3;
}

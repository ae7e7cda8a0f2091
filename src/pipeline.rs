//! Sample orchestration: one logical transfer is a `DATA_START` bracket, one
//! or more length-declared payload chunks, and a `DATA_END` bracket. The
//! pipeline drains that bracket from its input ring, runs the payload
//! through a transform, and re-brackets it on its output ring.
//!
//! This layer is a consumer of the protocol, not part of it; it defines the
//! usage pattern the core must support. One parameterized pipeline replaces
//! hand-duplicated per-ring transfer loops: instantiate it once per ring
//! pair.

use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::reader::Reader;
use crate::ring::NotifyMode;
use crate::writer::Writer;
use crate::ATTR_TERMINATE;

/// Fixed attribute bracketing the start of a logical transfer.
pub const ATTR_DATA_START: u16 = 1;
/// Variable attribute declaring the byte length of the chunk that follows,
/// as a little-endian u32 payload.
pub const ATTR_DATA_LEN: u16 = 2;
/// Fixed attribute bracketing the end of a logical transfer.
pub const ATTR_DATA_END: u16 = 3;

/// Per-transfer phase of an endpoint loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    WaitingStart,
    Streaming,
    Draining,
    Closing,
}

fn decode_len(buf: [u8; 4]) -> usize {
    u32::from_le_bytes(buf) as usize
}

/// Emit one bracketed transfer on `writer`: `DATA_START`, a
/// `Variable(length)` declaration, the payload in grants of up to `quantum`
/// bytes, then `DATA_END` plus a wake for a peer blocked only on data.
///
/// Requests `quantum` bytes per acquire even near the end of the payload, so
/// the final grant may overshoot the declared remaining length; the excess
/// is cancelled, never published.
pub fn send_transfer(
    writer: &mut Writer,
    data: &[u8],
    quantum: usize,
    timeout: Option<Duration>,
) -> Result<()> {
    set_attribute_blocking(writer, ATTR_DATA_START, 0, timeout)?;
    writer.notify();

    let declared = data.len() as u32;
    set_var_attribute_blocking(writer, ATTR_DATA_LEN, &declared.to_le_bytes(), timeout)?;

    let mut written = 0;
    while written < data.len() {
        let rest = data.len() - written;
        match writer.acquire(quantum) {
            Ok(buf) => {
                let n = buf.len().min(rest);
                buf[..n].copy_from_slice(&data[written..written + n]);
                let overshoot = buf.len() > rest;
                writer.release(n)?;
                if overshoot {
                    // Acquired past the declared length; the excess must
                    // not become reader-visible.
                    writer.cancel()?;
                }
                written += n;
            }
            Err(Error::Full) => writer.wait_notify(timeout)?,
            Err(e) => return Err(e),
        }
    }

    set_attribute_blocking(writer, ATTR_DATA_END, 0, timeout)?;
    writer.notify();
    Ok(())
}

/// Receive one bracketed transfer from `reader`, appending the payload to
/// `out`. Returns `Ok(false)` when the ring closed before a transfer
/// started; a close mid-transfer is the `Closed` error.
pub fn recv_transfer_into(
    reader: &mut Reader,
    out: &mut Vec<u8>,
    quantum: usize,
    timeout: Option<Duration>,
) -> Result<bool> {
    match wait_for_start(reader, timeout) {
        Ok(()) => {}
        Err(Error::Closed) => return Ok(false),
        Err(e) => return Err(e),
    }

    // Chunk bookkeeping mirrors the writer side: a declared remaining count
    // that resets to a full quantum for multi-chunk transfers.
    let mut remaining = match read_chunk_len(reader, timeout)? {
        Some(len) => len,
        None => return Ok(true), // empty transfer: START immediately followed by END
    };

    loop {
        if remaining == 0 {
            remaining = quantum;
        }
        match reader.acquire(remaining.min(quantum)) {
            Ok(grant) => {
                let at_anchor = grant.is_pending_attribute() && grant.bytes().is_empty();
                let n = grant.bytes().len();
                out.extend_from_slice(grant.bytes());
                if n > 0 {
                    reader.release(n)?;
                    remaining = remaining.saturating_sub(n);
                } else if at_anchor {
                    match stream_attribute(reader, timeout)? {
                        StreamEvent::Length(len) => remaining = len,
                        StreamEvent::End => return Ok(true),
                    }
                }
            }
            Err(Error::Empty) => reader.wait_notify(timeout)?,
            Err(e) => return Err(e),
        }
    }
}

/// Receive one bracketed transfer into a fresh buffer. `Ok(None)` means the
/// ring closed before a transfer started.
pub fn recv_transfer(
    reader: &mut Reader,
    quantum: usize,
    timeout: Option<Duration>,
) -> Result<Option<Vec<u8>>> {
    let mut out = Vec::new();
    Ok(recv_transfer_into(reader, &mut out, quantum, timeout)?.then_some(out))
}

/// Block until the transfer-start bracket arrives. A terminate record ends
/// the stream; any other fixed attribute here is a sequencing violation.
fn wait_for_start(reader: &mut Reader, timeout: Option<Duration>) -> Result<()> {
    loop {
        match reader.get_attribute() {
            Ok((ATTR_DATA_START, _)) => return Ok(()),
            Ok((ATTR_TERMINATE, _)) => return Err(Error::Closed),
            Ok((tag, _)) => {
                return Err(Error::UnexpectedAttribute {
                    expected: ATTR_DATA_START,
                    found: tag,
                })
            }
            Err(Error::VariableAttribute) => {
                return Err(Error::UnexpectedAttribute {
                    expected: ATTR_DATA_START,
                    found: ATTR_DATA_LEN,
                })
            }
            Err(e) if e.is_transient() => reader.wait_notify(timeout)?,
            Err(e) => return Err(e),
        }
    }
}

/// Read the `Variable(length)` declaration that must follow `DATA_START`.
/// `Ok(None)` is an immediate `DATA_END` (zero-length transfer).
fn read_chunk_len(reader: &mut Reader, timeout: Option<Duration>) -> Result<Option<usize>> {
    loop {
        match reader.get_attribute() {
            Err(Error::VariableAttribute) => break,
            Ok((ATTR_DATA_END, _)) => return Ok(None),
            Ok((ATTR_TERMINATE, _)) => return Err(Error::Closed),
            Ok((tag, _)) => {
                return Err(Error::UnexpectedAttribute {
                    expected: ATTR_DATA_LEN,
                    found: tag,
                })
            }
            Err(e) if e.is_transient() => reader.wait_notify(timeout)?,
            Err(e) => return Err(e),
        }
    }
    // Per-call receive buffer sized to the declared length payload.
    let mut lenbuf = [0u8; 4];
    let attr = reader.get_var_attribute(&mut lenbuf)?;
    if attr.tag != ATTR_DATA_LEN {
        return Err(Error::UnexpectedAttribute {
            expected: ATTR_DATA_LEN,
            found: attr.tag,
        });
    }
    Ok(Some(decode_len(lenbuf)))
}

enum StreamEvent {
    Length(usize),
    End,
}

/// Handle the attribute at the current read anchor while streaming payload:
/// a new chunk-length declaration or the end bracket.
fn stream_attribute(reader: &mut Reader, timeout: Option<Duration>) -> Result<StreamEvent> {
    loop {
        match reader.get_attribute() {
            Ok((ATTR_DATA_END, _)) => return Ok(StreamEvent::End),
            Ok((ATTR_TERMINATE, _)) => return Err(Error::Closed),
            Ok((tag, _)) => {
                return Err(Error::UnexpectedAttribute {
                    expected: ATTR_DATA_END,
                    found: tag,
                })
            }
            Err(Error::VariableAttribute) => {
                let mut lenbuf = [0u8; 4];
                let attr = reader.get_var_attribute(&mut lenbuf)?;
                if attr.tag != ATTR_DATA_LEN {
                    return Err(Error::UnexpectedAttribute {
                        expected: ATTR_DATA_LEN,
                        found: attr.tag,
                    });
                }
                return Ok(StreamEvent::Length(decode_len(lenbuf)));
            }
            Err(e) if e.is_transient() => reader.wait_notify(timeout)?,
            Err(e) => return Err(e),
        }
    }
}

fn set_attribute_blocking(
    writer: &mut Writer,
    tag: u16,
    param: u32,
    timeout: Option<Duration>,
) -> Result<()> {
    loop {
        match writer.set_attribute(tag, param) {
            Ok(()) => return Ok(()),
            Err(Error::AttrQueueFull { .. }) => writer.wait_notify(timeout)?,
            Err(e) => return Err(e),
        }
    }
}

fn set_var_attribute_blocking(
    writer: &mut Writer,
    tag: u16,
    payload: &[u8],
    timeout: Option<Duration>,
) -> Result<()> {
    loop {
        match writer.set_var_attribute(tag, 0, payload) {
            Ok(()) => return Ok(()),
            Err(Error::AttrQueueFull { .. }) => writer.wait_notify(timeout)?,
            Err(e) => return Err(e),
        }
    }
}

/// Orchestrates full logical transfers from an input ring to an output
/// ring through a payload transform.
///
/// One pipeline per ring pair; the transform and the acquire quantum are
/// parameters, so differently sized ring pairs share this one
/// implementation.
pub struct TransferPipeline<F> {
    input: Reader,
    output: Writer,
    quantum: usize,
    timeout: Option<Duration>,
    transform: F,
    scratch: Vec<u8>,
    phase: Phase,
    transfers: u64,
}

impl<F: FnMut(&mut [u8])> TransferPipeline<F> {
    /// Bind a pipeline to a ring pair, registering persistent zero-watermark
    /// notifiers on both endpoints. Registration fails only on a terminated
    /// ring, which no retry can undo, so the failure propagates as `Closed`.
    pub fn new(mut input: Reader, mut output: Writer, quantum: usize, transform: F) -> Result<Self> {
        input.register_notifier(0, NotifyMode::Persistent)?;
        output.register_notifier(0, NotifyMode::Persistent)?;
        Ok(Self {
            input,
            output,
            quantum,
            timeout: None,
            transform,
            scratch: Vec::new(),
            phase: Phase::Idle,
            transfers: 0,
        })
    }

    /// Bound every blocking wait. Expiry surfaces as the retryable
    /// `TimedOut`; the default `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Completed transfer count.
    pub fn transfers(&self) -> u64 {
        self.transfers
    }

    /// Run one logical transfer through the pipeline. Returns `Ok(false)`
    /// when the ring closed instead of starting one; once the pipeline has
    /// observed the close it stays in `Closing` and refuses further
    /// transfers.
    pub fn transfer_once(&mut self) -> Result<bool> {
        if self.phase == Phase::Closing {
            return Err(Error::Closed);
        }
        self.phase = Phase::WaitingStart;
        self.scratch.clear();
        if !recv_transfer_into(&mut self.input, &mut self.scratch, self.quantum, self.timeout)? {
            self.phase = Phase::Closing;
            return Ok(false);
        }

        self.phase = Phase::Streaming;
        (self.transform)(&mut self.scratch);
        send_transfer(&mut self.output, &self.scratch, self.quantum, self.timeout)?;

        self.phase = Phase::Draining;
        self.transfers += 1;
        trace!(
            transfers = self.transfers,
            bytes = self.scratch.len(),
            "pipeline transfer complete"
        );
        self.phase = Phase::Idle;
        Ok(true)
    }

    /// Loop transfers until the ring terminates or closes. Terminate and
    /// peer close are the sanctioned exits and return `Ok`; protocol
    /// violations surface as errors.
    pub fn run(&mut self) -> Result<()> {
        loop {
            match self.transfer_once() {
                Ok(true) => {}
                Ok(false) => break,
                Err(Error::Closed) => {
                    self.phase = Phase::Closing;
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        debug!(transfers = self.transfers, phase = ?self.phase, "pipeline closing");
        Ok(())
    }

    /// Tear the pipeline down, draining the output side before close so no
    /// in-flight attribute is lost.
    pub fn shutdown(mut self) -> Result<()> {
        self.input.close();
        self.output.close(self.timeout)
    }
}

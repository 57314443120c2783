//! Frames assembled from the serial byte stream.
//!
//! A [`Frame`] is immutable once the assembler hands it out.  It is moved
//! from the assembler to the bridge controller and from there to the client
//! registry; nothing keeps a second reference to it.

pub mod assembler;

use std::fmt;
use std::time::{Duration, Instant};

/// One complete Modbus RTU frame, delimited by bus silence.
///
/// The bytes are exactly what arrived on the line, minus any bytes that did
/// not fit the assembler buffer.  Checksums are not validated here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    sequence: u64,
    bytes: Vec<u8>,
    started_at: Instant,
    completed_at: Instant,
    dropped_bytes: usize,
}

impl Frame {
    pub(crate) fn new(
        sequence: u64,
        bytes: Vec<u8>,
        started_at: Instant,
        completed_at: Instant,
        dropped_bytes: usize,
    ) -> Self {
        Self {
            sequence,
            bytes,
            started_at,
            completed_at,
            dropped_bytes,
        }
    }

    /// Message counter value for this frame, starting at 1.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// The buffered bytes, in arrival order.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always `false` for frames produced by the assembler.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Arrival time of the first byte.
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Time the assembler declared the frame complete.
    pub fn completed_at(&self) -> Instant {
        self.completed_at
    }

    /// Time between the first byte and completion.
    pub fn duration(&self) -> Duration {
        self.completed_at.saturating_duration_since(self.started_at)
    }

    /// `true` if bytes were dropped because the buffer was full.
    ///
    /// A truncated frame is still delivered: the bridge forwards what it has
    /// rather than stopping.
    pub fn is_truncated(&self) -> bool {
        self.dropped_bytes > 0
    }

    /// How many bytes arrived after the buffer filled up.
    pub fn dropped_bytes(&self) -> usize {
        self.dropped_bytes
    }

    /// Space-separated upper-case hex rendering, e.g. `"01 04 00 00"`.
    pub fn to_hex(&self) -> String {
        hex_dump(&self.bytes)
    }

    /// Consumes the frame and returns its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{} bytes", self.sequence, self.bytes.len())?;
        if self.is_truncated() {
            write!(f, ", {} dropped", self.dropped_bytes)?;
        }
        write!(f, "] {}", self.to_hex())
    }
}

/// Formats bytes as space-separated upper-case hex pairs.
///
/// Used for frames and for raw client requests in log output.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

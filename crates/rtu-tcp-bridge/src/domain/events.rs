//! Observability events emitted by the bridge controller.
//!
//! The controller never logs directly.  It records what happened as
//! [`BridgeEvent`]s; the infrastructure layer drains them after every tick and
//! turns them into log lines (see `infrastructure::event_log`).  Tests assert
//! on the events instead of scraping log output.
//!
//! None of these events is fatal.  Faults (overflow, partial writes, serial
//! errors, disconnects) are reported and the bridge keeps forwarding.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use rtu_core::Classification;

/// Position of a client in the fixed-capacity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIndex(pub usize);

impl fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.0)
    }
}

/// Why a client slot was freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// A read returned end-of-stream.
    PeerClosed,
    /// A read failed with an I/O error.
    ReadFailed,
    /// A write failed with an I/O error.
    WriteFailed,
    /// Too many consecutive writes were only partially accepted.
    PersistentPartialWrites,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PeerClosed => "peer closed the connection",
            Self::ReadFailed => "read failed",
            Self::WriteFailed => "write failed",
            Self::PersistentPartialWrites => "persistent partial writes",
        };
        f.write_str(text)
    }
}

/// Everything the bridge reports to its observability sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    ClientRegistered {
        slot: SlotIndex,
        peer: SocketAddr,
    },
    /// The registry was full; the connection was refused.
    ClientRejected {
        peer: SocketAddr,
        capacity: usize,
    },
    ClientUnregistered {
        slot: SlotIndex,
        peer: SocketAddr,
        reason: DisconnectReason,
    },
    /// Client bytes were written to the serial bus and the tracker armed.
    RequestForwarded {
        slot: SlotIndex,
        peer: SocketAddr,
        len: usize,
        hex: String,
        /// `true` if an earlier request was still awaiting its response.
        superseded_pending: bool,
    },
    SerialWriteFailed {
        slot: SlotIndex,
        error: String,
    },
    SerialReadFailed {
        error: String,
    },
    FrameReceived {
        sequence: u64,
        len: usize,
        truncated: bool,
        hex: String,
    },
    /// The frame exceeded the buffer; `dropped` bytes were discarded.
    BufferOverflow {
        sequence: u64,
        capacity: usize,
        dropped: usize,
    },
    FrameClassified {
        sequence: u64,
        classification: Classification,
    },
    FrameBroadcast {
        sequence: u64,
        /// Live slots the frame was offered to.
        attempted: usize,
        /// Slots that accepted every byte.
        delivered: usize,
    },
    PartialWrite {
        slot: SlotIndex,
        written: usize,
        expected: usize,
    },
    /// The response window elapsed with no frame at all.
    MissedResponse {
        waited: Duration,
    },
}

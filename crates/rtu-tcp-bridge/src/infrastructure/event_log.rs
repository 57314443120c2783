//! Turns [`BridgeEvent`]s into `tracing` records.
//!
//! Routine traffic (requests, frames, classifications) is logged at `info`
//! so an operator watching the console sees every exchange with its hex dump.
//! Recoverable faults are `warn`; I/O failures on the serial side are
//! `error`.  Per-broadcast delivery counts are only interesting while
//! debugging and go to `debug`.

use tracing::{debug, error, info, trace, warn, Level};

use crate::domain::{BridgeEvent, BridgeStatus};

/// Emits a record at a level chosen at runtime.
///
/// `tracing` fixes the level of each callsite at compile time, so this
/// expands to one callsite per level and picks among them.
macro_rules! event_at {
    ($level:expr, $($rest:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            error!($($rest)+)
        } else if level == Level::WARN {
            warn!($($rest)+)
        } else if level == Level::INFO {
            info!($($rest)+)
        } else if level == Level::DEBUG {
            debug!($($rest)+)
        } else {
            trace!($($rest)+)
        }
    }};
}

/// Severity an event is logged at.
pub fn level_of(event: &BridgeEvent) -> Level {
    match event {
        BridgeEvent::SerialReadFailed { .. } | BridgeEvent::SerialWriteFailed { .. } => Level::ERROR,
        BridgeEvent::ClientRejected { .. }
        | BridgeEvent::BufferOverflow { .. }
        | BridgeEvent::PartialWrite { .. }
        | BridgeEvent::MissedResponse { .. }
        | BridgeEvent::RequestForwarded {
            superseded_pending: true,
            ..
        } => Level::WARN,
        BridgeEvent::FrameBroadcast { .. } => Level::DEBUG,
        BridgeEvent::ClientUnregistered { .. }
        | BridgeEvent::ClientRegistered { .. }
        | BridgeEvent::RequestForwarded { .. }
        | BridgeEvent::FrameReceived { .. }
        | BridgeEvent::FrameClassified { .. } => Level::INFO,
    }
}

/// Emits one log record for `event`, at [`level_of`] its severity.
pub fn log_event(event: &BridgeEvent) {
    let level = level_of(event);
    match event {
        BridgeEvent::ClientRegistered { slot, peer } => {
            event_at!(level, %peer, %slot, "client connected");
        }
        BridgeEvent::ClientRejected { peer, capacity } => {
            event_at!(level, %peer, capacity, "client limit reached; connection refused");
        }
        BridgeEvent::ClientUnregistered { slot, peer, reason } => {
            event_at!(level, %peer, %slot, %reason, "client disconnected");
        }
        BridgeEvent::RequestForwarded {
            slot,
            peer,
            len,
            hex,
            superseded_pending,
        } => {
            event_at!(level, %peer, %slot, len, superseded_pending, "TCP -> RTU: {hex}");
        }
        BridgeEvent::SerialWriteFailed { slot, error } => {
            event_at!(level, %slot, "serial write failed: {error}");
        }
        BridgeEvent::SerialReadFailed { error } => {
            event_at!(level, "serial read failed: {error}");
        }
        BridgeEvent::FrameReceived {
            sequence,
            len,
            truncated,
            hex,
        } => {
            event_at!(level, sequence, len, truncated, "RTU frame: {hex}");
        }
        BridgeEvent::BufferOverflow {
            sequence,
            capacity,
            dropped,
        } => {
            event_at!(level, sequence, capacity, dropped, "frame exceeded buffer; tail dropped");
        }
        BridgeEvent::FrameClassified {
            sequence,
            classification,
        } => {
            event_at!(level, sequence, "RTU -> TCP: {classification}");
        }
        BridgeEvent::FrameBroadcast {
            sequence,
            attempted,
            delivered,
        } => {
            event_at!(level, sequence, attempted, delivered, "frame broadcast");
        }
        BridgeEvent::PartialWrite {
            slot,
            written,
            expected,
        } => {
            event_at!(level, %slot, written, expected, "partial write to client");
        }
        BridgeEvent::MissedResponse { waited } => {
            let waited_ms = waited.as_millis() as u64;
            event_at!(level, waited_ms, "no response to last request");
        }
    }
}

/// Emits the periodic status summary.
pub fn log_status(status: &BridgeStatus) {
    info!("status: {status}");
}

// ── Tests ─────────────────────────────────────────────────────────────────────

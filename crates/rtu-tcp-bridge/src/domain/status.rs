//! Running counters and the status snapshot built from them.

use std::fmt;
use std::time::Duration;

/// Monotonic counters kept by the bridge controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub requests_forwarded: u64,
    pub request_bytes: u64,
    pub frames_received: u64,
    pub frame_bytes: u64,
    pub responses: u64,
    pub unsolicited: u64,
    pub missed_responses: u64,
    pub truncated_frames: u64,
    pub partial_writes: u64,
    pub clients_accepted: u64,
    pub clients_rejected: u64,
    pub serial_errors: u64,
}

/// Point-in-time view of the bridge, logged periodically by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeStatus {
    pub uptime: Duration,
    pub active_clients: usize,
    pub capacity: usize,
    pub awaiting_response: bool,
    pub stats: BridgeStats,
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "up {}s, clients {}/{}, requests {}, frames {} ({} responses, {} unsolicited), missed {}",
            self.uptime.as_secs(),
            self.active_clients,
            self.capacity,
            self.stats.requests_forwarded,
            self.stats.frames_received,
            self.stats.responses,
            self.stats.unsolicited,
            self.stats.missed_responses,
        )?;
        if self.awaiting_response {
            f.write_str(", awaiting response")?;
        }
        Ok(())
    }
}

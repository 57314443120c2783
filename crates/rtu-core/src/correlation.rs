//! CorrelationTracker: decides whether a completed frame answers a request.
//!
//! The serial link has exactly one master (the bridge) and one slave (the
//! field device), and Modbus RTU carries no transaction identifier.  At most
//! one request can be outstanding, so a single "awaiting since T" marker is
//! enough; there is no queue and no per-request table.
//!
//! # State machine
//!
//! ```text
//!            arm(now)                      classify(frame) within window
//!   Idle ─────────────► AwaitingResponse ───────────────────────────► Idle  (Response)
//!    ▲                      │   │
//!    │                      │   ├── classify(frame) after window ──► Idle  (Unsolicited)
//!    │                      │   └── classify(frame started before arm) ► stays (Unsolicited)
//!    │                      └────── check_timeout(now) after window ► Idle  (MissedResponse)
//!    └── classify(frame) while Idle: no transition (Unsolicited)
//! ```
//!
//! Arming while already awaiting simply moves the forward timestamp to the
//! newest request.

use std::fmt;
use std::time::{Duration, Instant};

use crate::timing::DEFAULT_RESPONSE_WINDOW;

/// Current tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationState {
    /// No request is outstanding.
    Idle,
    /// A request was written to the bus at `forwarded_at`.
    AwaitingResponse { forwarded_at: Instant },
}

/// How a completed frame relates to the outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Completed within the response window of the outstanding request.
    Response {
        /// Time from forwarding the request to completing the frame.
        elapsed: Duration,
    },
    /// No request outstanding, or the window had already elapsed.
    Unsolicited,
}

impl Classification {
    /// `true` for [`Classification::Response`].
    pub fn is_response(&self) -> bool {
        matches!(self, Self::Response { .. })
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response { .. } => f.write_str("RESPONSE"),
            Self::Unsolicited => f.write_str("UNSOLICITED"),
        }
    }
}

/// Reported once when a request's window elapses with no frame at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissedResponse {
    pub forwarded_at: Instant,
    /// How long the tracker actually waited (≥ the response window).
    pub waited: Duration,
}

/// Single-slot request/response correlation.
#[derive(Debug, Clone)]
pub struct CorrelationTracker {
    state: CorrelationState,
    response_window: Duration,
}

impl Default for CorrelationTracker {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSE_WINDOW)
    }
}

impl CorrelationTracker {
    pub fn new(response_window: Duration) -> Self {
        Self {
            state: CorrelationState::Idle,
            response_window,
        }
    }

    pub fn state(&self) -> CorrelationState {
        self.state
    }

    pub fn response_window(&self) -> Duration {
        self.response_window
    }

    pub fn is_awaiting(&self) -> bool {
        matches!(self.state, CorrelationState::AwaitingResponse { .. })
    }

    /// Records that a request was written to the bus at `now`.
    ///
    /// Re-arming while a request is already pending replaces its timestamp.
    pub fn arm(&mut self, now: Instant) {
        self.state = CorrelationState::AwaitingResponse { forwarded_at: now };
    }

    /// Classifies a frame that started at `started_at` and completed at
    /// `completed_at`.
    ///
    /// A frame whose first byte arrived no later than the request was written
    /// cannot be its reply on a half-duplex bus: it is `Unsolicited` and the
    /// request stays pending.  Otherwise the tracker returns to `Idle`, and a
    /// frame completing exactly at the end of the window still counts as the
    /// response.
    pub fn classify(&mut self, started_at: Instant, completed_at: Instant) -> Classification {
        match self.state {
            CorrelationState::Idle => Classification::Unsolicited,
            CorrelationState::AwaitingResponse { forwarded_at } if started_at <= forwarded_at => {
                Classification::Unsolicited
            }
            CorrelationState::AwaitingResponse { forwarded_at } => {
                self.state = CorrelationState::Idle;
                let elapsed = completed_at.saturating_duration_since(forwarded_at);
                if elapsed <= self.response_window {
                    Classification::Response { elapsed }
                } else {
                    Classification::Unsolicited
                }
            }
        }
    }

    /// Returns to `Idle` if the response window elapsed before `now`.
    ///
    /// Fires at most once per armed request.
    pub fn check_timeout(&mut self, now: Instant) -> Option<MissedResponse> {
        let CorrelationState::AwaitingResponse { forwarded_at } = self.state else {
            return None;
        };
        let waited = now.saturating_duration_since(forwarded_at);
        if waited > self.response_window {
            self.state = CorrelationState::Idle;
            Some(MissedResponse {
                forwarded_at,
                waited,
            })
        } else {
            None
        }
    }
}

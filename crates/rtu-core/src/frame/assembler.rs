//! FrameAssembler: groups serial bytes into frames by inter-byte silence.
//!
//! # How it works (for beginners)
//!
//! ```text
//!  bytes:  01 04 00 00 00 01 31 CA            01 03 ...
//!  time:   |--1ms--|--1ms--| ... |---3ms gap---|
//!                                  ▲
//!                                  silence ≥ threshold → frame complete
//! ```
//!
//! The assembler is a pure byte-timing state machine.  It knows nothing about
//! function codes, slave addresses or CRCs.  A frame completes when either:
//!
//! 1. the time since the last byte reaches the silence threshold, or
//! 2. the time since the first byte reaches the maximum frame duration (a
//!    stalled or chattering line must not hold a frame open forever).
//!
//! Completion is detected in two places: [`FrameAssembler::feed`] notices it
//! when the *next* byte arrives late, and [`FrameAssembler::poll`] notices it
//! when no byte arrives at all.  Callers must call `poll` regularly.
//!
//! # Overflow
//!
//! The buffer never grows past `max_frame_size`.  Extra bytes are counted and
//! discarded, the frame keeps accumulating timing metadata, and the emitted
//! [`Frame`] is flagged as truncated.  Reporting the overflow is left to the
//! caller; the assembler itself never logs.

use std::time::{Duration, Instant};

use super::Frame;
use crate::timing::{DEFAULT_MAX_FRAME_DURATION, DEFAULT_MAX_FRAME_SIZE};

/// Limits that drive frame completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblerConfig {
    /// Silence after the last byte that ends a frame.
    pub silence_threshold: Duration,
    /// Hard ceiling on the time between a frame's first byte and completion.
    pub max_frame_duration: Duration,
    /// Capacity of the accumulation buffer in bytes.
    pub max_frame_size: usize,
}

impl Default for AssemblerConfig {
    /// Values for a 19200 bps bus: 2 ms silence, 500 ms ceiling, 256 bytes.
    fn default() -> Self {
        Self {
            silence_threshold: Duration::from_millis(2),
            max_frame_duration: DEFAULT_MAX_FRAME_DURATION,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Timing metadata of the frame currently being accumulated.
#[derive(Debug, Clone, Copy)]
struct PendingFrame {
    started_at: Instant,
    last_byte_at: Instant,
    dropped: usize,
}

/// Stateful accumulator turning a byte stream into [`Frame`]s.
#[derive(Debug)]
pub struct FrameAssembler {
    config: AssemblerConfig,
    buffer: Vec<u8>,
    pending: Option<PendingFrame>,
    last_sequence: u64,
}

impl FrameAssembler {
    /// Creates an idle assembler.
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            buffer: Vec::with_capacity(config.max_frame_size),
            config,
            pending: None,
            last_sequence: 0,
        }
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &AssemblerConfig {
        &self.config
    }

    /// `true` while at least one byte of an unfinished frame has been seen.
    pub fn is_in_progress(&self) -> bool {
        self.pending.is_some()
    }

    /// Number of bytes currently buffered for the unfinished frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Sequence number of the most recently emitted frame (0 before the first).
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Accepts one byte received at `now`.
    ///
    /// Returns the *previous* frame if this byte arrived after that frame had
    /// already completed (silence gap or duration ceiling).  The byte itself
    /// always starts or continues the current frame; a frame is never split.
    pub fn feed(&mut self, byte: u8, now: Instant) -> Option<Frame> {
        let completed = self.poll(now);

        let pending = self.pending.get_or_insert(PendingFrame {
            started_at: now,
            last_byte_at: now,
            dropped: 0,
        });
        pending.last_byte_at = now;

        if self.buffer.len() < self.config.max_frame_size {
            self.buffer.push(byte);
        } else {
            pending.dropped += 1;
        }

        completed
    }

    /// Completes the current frame if it has gone silent or hit the duration
    /// ceiling by `now`.
    ///
    /// Calling `poll` with no frame in progress always returns `None`.
    pub fn poll(&mut self, now: Instant) -> Option<Frame> {
        let pending = self.pending?;
        let silent_for = now.saturating_duration_since(pending.last_byte_at);
        let open_for = now.saturating_duration_since(pending.started_at);

        if silent_for >= self.config.silence_threshold
            || open_for >= self.config.max_frame_duration
        {
            Some(self.finish(pending, now))
        } else {
            None
        }
    }

    fn finish(&mut self, pending: PendingFrame, now: Instant) -> Frame {
        self.pending = None;
        self.last_sequence = self.last_sequence.wrapping_add(1);
        let bytes = std::mem::replace(
            &mut self.buffer,
            Vec::with_capacity(self.config.max_frame_size),
        );
        Frame::new(
            self.last_sequence,
            bytes,
            pending.started_at,
            now,
            pending.dropped,
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

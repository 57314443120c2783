//! Modbus RTU bus timing.
//!
//! # Where do the numbers come from? (for beginners)
//!
//! On an RTU line every byte travels as an 11-bit *character*: one start bit,
//! eight data bits, one parity bit (or a second stop bit) and one stop bit.
//! The Modbus serial line specification says two frames must be separated by
//! at least 3.5 character times of silence.  At 9600 bps one character takes
//! 11 / 9600 s ≈ 1.146 ms, so the gap is ≈ 4.01 ms.
//!
//! At high bit rates those gaps become too short for most UARTs to measure,
//! so the specification fixes the gap at 1.75 ms for every rate from 19200
//! bps upward.
//!
//! The bridge polls with millisecond resolution, so the threshold is rounded
//! *up* to the next whole millisecond.  Rounding down would risk splitting a
//! frame whose bytes arrive just under the true gap apart.

use std::time::Duration;

use thiserror::Error;

/// Bits per RTU character: start + 8 data + parity/stop + stop.
pub const BITS_PER_CHARACTER: u64 = 11;

/// Bit rate from which the silence threshold is a fixed 1.75 ms.
pub const FIXED_GAP_BAUD_RATE: u32 = 19_200;

/// Fixed inter-frame gap used at and above [`FIXED_GAP_BAUD_RATE`].
pub const FIXED_INTER_FRAME_GAP: Duration = Duration::from_micros(1_750);

/// Largest frame the bridge buffers (Modbus RTU ADU limit).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256;

/// Ceiling on the total duration of one frame.
///
/// Some inverters stream long status frames slowly.
pub const DEFAULT_MAX_FRAME_DURATION: Duration = Duration::from_millis(500);

/// How long after a forwarded request a completed frame still counts as its
/// response.
pub const DEFAULT_RESPONSE_WINDOW: Duration = Duration::from_millis(5_000);

/// Errors from timing derivation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimingError {
    /// A bit rate of zero has no character time.
    #[error("baud rate must be greater than zero")]
    ZeroBaudRate,
}

/// Returns the duration of one 11-bit character at `baud_rate`.
///
/// # Errors
///
/// Returns [`TimingError::ZeroBaudRate`] if `baud_rate` is zero.
pub fn character_time(baud_rate: u32) -> Result<Duration, TimingError> {
    if baud_rate == 0 {
        return Err(TimingError::ZeroBaudRate);
    }
    let nanos = BITS_PER_CHARACTER * 1_000_000_000 / u64::from(baud_rate);
    Ok(Duration::from_nanos(nanos))
}

/// Returns the inter-frame silence threshold for `baud_rate`, rounded up to
/// the next whole millisecond.
///
/// | Baud rate | 3.5 chars   | Threshold |
/// |-----------|-------------|-----------|
/// | 1200      | 32.08 ms    | 33 ms     |
/// | 9600      | 4.01 ms     | 5 ms      |
/// | 19200     | 1.75 ms (*) | 2 ms      |
/// | 115200    | 1.75 ms (*) | 2 ms      |
///
/// (*) fixed gap from the Modbus serial line specification.
///
/// # Errors
///
/// Returns [`TimingError::ZeroBaudRate`] if `baud_rate` is zero.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use rtu_core::inter_frame_silence;
///
/// assert_eq!(inter_frame_silence(19_200).unwrap(), Duration::from_millis(2));
/// ```
pub fn inter_frame_silence(baud_rate: u32) -> Result<Duration, TimingError> {
    let exact = if baud_rate >= FIXED_GAP_BAUD_RATE {
        FIXED_INTER_FRAME_GAP
    } else {
        character_time(baud_rate)? * 7 / 2
    };
    Ok(round_up_to_millis(exact))
}

fn round_up_to_millis(duration: Duration) -> Duration {
    let millis = duration.as_nanos().div_ceil(1_000_000);
    Duration::from_millis(millis as u64)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! # rtu-core
//!
//! Timing-driven building blocks for bridging a Modbus RTU serial bus to TCP
//! clients.  Nothing in this crate touches a socket, a serial port, or a
//! clock: every operation takes the current [`std::time::Instant`] as an
//! argument, so the whole crate can be exercised with logical time in tests.
//!
//! # Architecture overview (for beginners)
//!
//! Modbus RTU frames carry no length prefix.  A frame ends when the line goes
//! quiet for at least 3.5 character times.  Turning a raw byte stream into
//! frames is therefore a question of *when* bytes arrived, not *what* they
//! contain.
//!
//! - **`frame`** – The [`Frame`] value type and the [`FrameAssembler`] state
//!   machine that groups bytes into frames by inter-byte silence, with a hard
//!   ceiling on total frame duration for stalled lines.
//!
//! - **`correlation`** – The [`CorrelationTracker`]: a single-slot state
//!   machine that remembers whether a request was written to the bus and is
//!   still inside its response window.  Completed frames are classified as
//!   responses or unsolicited traffic against it.
//!
//! - **`timing`** – Bus timing helpers that derive the inter-frame silence
//!   threshold from the serial bit rate, plus the default limits.

pub mod correlation;
pub mod frame;
pub mod timing;

pub use correlation::{Classification, CorrelationState, CorrelationTracker, MissedResponse};
pub use frame::assembler::{AssemblerConfig, FrameAssembler};
pub use frame::Frame;
pub use timing::{inter_frame_silence, TimingError};

//! Domain layer for rtu-tcp-bridge.
//!
//! Pure types with no I/O: configuration, observability events and the
//! status snapshot.  Nothing in here opens a port or reads a clock.

pub mod config;
pub mod events;
pub mod status;

pub use config::{BridgeConfig, BridgeSettings, DataBits, Parity, SerialSettings, StopBits};
pub use events::{BridgeEvent, DisconnectReason, SlotIndex};
pub use status::{BridgeStats, BridgeStatus};

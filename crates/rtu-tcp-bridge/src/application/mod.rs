//! Application layer for the bridge.
//!
//! # What is the "application" layer? (for beginners)
//!
//! It sits between the domain types (configuration, events) and the
//! infrastructure (serial port, sockets, files).  Code here decides *what*
//! happens to bytes; it never opens a port or a socket itself.  All I/O goes
//! through the traits in [`ports`], so the whole bridge can be driven from
//! tests with in-memory mocks and logical time.
//!
//! # Sub-modules
//!
//! - **`ports`** – the `SerialLink` and `ClientConnection` traits.
//! - **`client_registry`** – fixed-capacity slot table of TCP clients, with
//!   request polling and response broadcast.
//! - **`bridge_service`** – the `BridgeController` that wires the frame
//!   assembler, the correlation tracker and the registry together.

pub mod bridge_service;
pub mod client_registry;
pub mod ports;

pub use bridge_service::BridgeController;
pub use client_registry::{
    BroadcastReport, ClientRegistry, ClientSlot, Departure, InboundRequest, PartialDelivery,
    PollOutcome, RegistryError,
};
pub use ports::{ClientConnection, SerialLink};

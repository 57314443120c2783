//! rtu-tcp-bridge library entry point.
//!
//! Shares one RS-485 Modbus RTU field device with several Modbus TCP clients.
//! Client bytes are written to the bus verbatim; everything the device sends
//! back is split into frames by bus silence and fanned out to every client.
//!
//! # Layers
//!
//! - [`domain`] – configuration, events and status types.  No I/O.
//! - [`application`] – the `BridgeController` and `ClientRegistry`, written
//!   against the `SerialLink` / `ClientConnection` traits.
//! - [`infrastructure`] – real serial port and sockets, TOML config, logging
//!   and the run loop.
//!
//! Frame assembly and request/response correlation live in `rtu_core`.

pub mod application;
pub mod domain;
pub mod infrastructure;

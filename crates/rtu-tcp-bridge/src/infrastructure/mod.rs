//! Infrastructure layer for the bridge.
//!
//! OS-facing adapters: the serial port, TCP sockets, the configuration file,
//! the log sink and the run loop that ties them to the controller.
//!
//! **Dependency rule**: this layer may depend on `application`, `domain` and
//! `rtu_core`, but MUST NOT be imported by the `application` or domain layers
//! (test modules excepted, which borrow the mocks in [`mock`]).

pub mod config_file;
pub mod event_log;
pub mod mock;
pub mod serial;
pub mod server;
pub mod tcp;

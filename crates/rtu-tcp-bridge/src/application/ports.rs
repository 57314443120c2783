//! I/O seams between the bridge controller and the outside world.
//!
//! The controller only ever talks to these two traits.  Production code plugs
//! in a real serial port and TCP sockets (see `infrastructure`); tests plug in
//! the in-memory mocks from `infrastructure::mock`.
//!
//! Both traits are *non-blocking by contract*: the controller calls them from
//! a single polling loop that also advances frame and response timers, so a
//! call that waits would stretch every timer in the system.

use std::io;
use std::net::SocketAddr;

/// The serial side: one exclusively owned byte channel to the field device.
#[cfg_attr(test, mockall::automock)]
pub trait SerialLink {
    /// Copies pending bytes into `buf` and returns how many were copied.
    ///
    /// Returns `Ok(0)` when nothing is pending.  Must not wait for data.
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes a request verbatim and flushes it onto the bus.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// One connected TCP client.
///
/// Semantics follow non-blocking sockets: `ErrorKind::WouldBlock` means
/// "nothing right now", and `Ok(0)` from [`try_read`](Self::try_read) means
/// the peer closed the connection.
pub trait ClientConnection {
    fn peer_addr(&self) -> SocketAddr;

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes as much of `bytes` as the socket accepts right now.
    fn try_write(&mut self, bytes: &[u8]) -> io::Result<usize>;
}

//! In-memory serial link and TCP client for tests.
//!
//! Both mocks are cheap handles over shared state: clone one, hand the clone
//! to the bridge, and keep the original to inject bytes and inspect what the
//! bridge wrote.

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use crate::application::ports::{ClientConnection, SerialLink};

// ── Serial ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SerialState {
    inbound: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    fail_reads: bool,
    fail_writes: bool,
}

/// A [`SerialLink`] backed by a byte queue.
#[derive(Debug, Clone, Default)]
pub struct MockSerial {
    state: Arc<Mutex<SerialState>>,
}

impl MockSerial {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues bytes as if the field device had just sent them.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state
            .lock()
            .expect("lock poisoned")
            .inbound
            .extend(bytes.iter().copied());
    }

    /// Every `write_all` call the bridge made, in order.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state.lock().expect("lock poisoned").written.clone()
    }

    /// Makes every subsequent read fail, as an unplugged adapter would.
    pub fn fail_reads(&self) {
        self.state.lock().expect("lock poisoned").fail_reads = true;
    }

    pub fn fail_writes(&self) {
        self.state.lock().expect("lock poisoned").fail_writes = true;
    }
}

impl SerialLink for MockSerial {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::Other, "mock serial read failure"));
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock serial write failure"));
        }
        state.written.push(bytes.to_vec());
        Ok(())
    }
}

// ── TCP client ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct ClientState {
    inbound: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    closed: bool,
    fail_reads: bool,
    write_limit: Option<usize>,
}

/// A [`ClientConnection`] with scripted reads and recorded writes.
#[derive(Debug, Clone)]
pub struct MockClient {
    peer: SocketAddr,
    state: Arc<Mutex<ClientState>>,
}

impl MockClient {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            state: Arc::new(Mutex::new(ClientState::default())),
        }
    }

    /// Queues one read's worth of bytes; each call is returned by a separate
    /// `try_read`.
    pub fn push_inbound(&self, bytes: &[u8]) {
        self.state
            .lock()
            .expect("lock poisoned")
            .inbound
            .push_back(bytes.to_vec());
    }

    /// Simulates the peer hanging up.
    ///
    /// Queued bytes are still readable; after them reads return `Ok(0)`.
    /// Writes fail with `BrokenPipe` and record nothing.
    pub fn close(&self) {
        self.state.lock().expect("lock poisoned").closed = true;
    }

    pub fn fail_reads(&self) {
        self.state.lock().expect("lock poisoned").fail_reads = true;
    }

    /// Caps every write at `limit` bytes.  A limit of zero makes writes
    /// report `WouldBlock`.
    pub fn limit_writes(&self, limit: usize) {
        self.state.lock().expect("lock poisoned").write_limit = Some(limit);
    }

    /// All bytes the bridge managed to write, concatenated.
    pub fn written(&self) -> Vec<u8> {
        self.state.lock().expect("lock poisoned").written.clone()
    }
}

impl ClientConnection for MockClient {
    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.fail_reads {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "mock read failure"));
        }
        let Some(mut chunk) = state.inbound.pop_front() else {
            return if state.closed {
                Ok(0)
            } else {
                Err(io::ErrorKind::WouldBlock.into())
            };
        };
        let n = buf.len().min(chunk.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            state.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn try_write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.closed {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        let n = match state.write_limit {
            Some(0) => return Err(io::ErrorKind::WouldBlock.into()),
            Some(limit) => limit.min(bytes.len()),
            None => bytes.len(),
        };
        state.written.extend_from_slice(&bytes[..n]);
        Ok(n)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

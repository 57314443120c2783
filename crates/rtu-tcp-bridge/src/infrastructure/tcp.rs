//! Modbus TCP side: the listener and the per-client socket adapter.
//!
//! Accepting happens on the tokio reactor.  Each accepted stream is then
//! converted back into a non-blocking `std::net::TcpStream`, because the
//! bridge controller polls clients synchronously from its tick and only
//! needs "read what is there / write what fits" without any awaiting.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::application::ports::ClientConnection;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to prepare accepted socket from {peer}: {source}")]
    Accept {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Binds the Modbus TCP listener.
pub async fn bind_listener(addr: SocketAddr) -> Result<TcpListener, NetworkError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| NetworkError::BindFailed { addr, source })
}

/// A connected Modbus TCP client.
#[derive(Debug)]
pub struct TcpClient {
    stream: TcpStream,
    peer: SocketAddr,
}

impl TcpClient {
    /// Takes ownership of an accepted tokio stream.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be detached from the reactor or switched to
    /// non-blocking mode.
    pub fn from_tokio(stream: tokio::net::TcpStream, peer: SocketAddr) -> Result<Self, NetworkError> {
        let stream = stream
            .into_std()
            .map_err(|source| NetworkError::Accept { peer, source })?;
        Self::from_std(stream, peer)
    }

    /// Wraps a std stream, switching it to non-blocking mode.
    pub fn from_std(stream: TcpStream, peer: SocketAddr) -> Result<Self, NetworkError> {
        stream
            .set_nonblocking(true)
            .map_err(|source| NetworkError::Accept { peer, source })?;
        // Modbus frames are small; don't let Nagle hold a reply back.
        stream
            .set_nodelay(true)
            .map_err(|source| NetworkError::Accept { peer, source })?;
        Ok(Self { stream, peer })
    }
}

impl ClientConnection for TcpClient {
    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }

    fn try_write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.stream.write(bytes)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

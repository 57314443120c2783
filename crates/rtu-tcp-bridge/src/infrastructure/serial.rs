//! The RS-485 adapter, opened through `tokio-serial`.
//!
//! The port is opened as a plain `SerialPort` rather than an async stream:
//! the bridge polls it once per tick and needs "give me what is there, now"
//! semantics.  [`SerialPortLink::read_available`] asks the driver how many
//! bytes are buffered before reading, so a read never waits on the line.

use std::io::{self, Read, Write};
use std::time::Duration;

use thiserror::Error;
use tokio_serial::SerialPort;
use tracing::debug;

use crate::application::ports::SerialLink;
use crate::domain::{DataBits, Parity, SerialSettings, StopBits};

/// Read timeout handed to the driver.  Reads are sized from `bytes_to_read`,
/// so this only bounds the pathological case of the driver over-reporting.
const READ_TIMEOUT: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
}

/// [`SerialLink`] over a real serial device.
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialPortLink {
    /// Opens and configures the device described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`SerialError::Open`] if the device does not exist, is in use
    /// by another process, or rejects the line settings.
    pub fn open(settings: &SerialSettings) -> Result<Self, SerialError> {
        let port = tokio_serial::new(&settings.port, settings.baud_rate)
            .data_bits(data_bits(settings.data_bits))
            .parity(parity(settings.parity))
            .stop_bits(stop_bits(settings.stop_bits))
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| SerialError::Open {
                port: settings.port.clone(),
                source,
            })?;
        debug!(port = %settings.port, "serial port opened");
        Ok(Self {
            port,
            name: settings.port.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SerialLink for SerialPortLink {
    fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pending = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if pending == 0 {
            return Ok(0);
        }
        let len = pending.min(buf.len());
        match self.port.read(&mut buf[..len]) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        Write::write_all(&mut self.port, bytes)?;
        self.port.flush()
    }
}

fn data_bits(bits: DataBits) -> tokio_serial::DataBits {
    match bits {
        DataBits::Seven => tokio_serial::DataBits::Seven,
        DataBits::Eight => tokio_serial::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

fn stop_bits(bits: StopBits) -> tokio_serial::StopBits {
    match bits {
        StopBits::One => tokio_serial::StopBits::One,
        StopBits::Two => tokio_serial::StopBits::Two,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

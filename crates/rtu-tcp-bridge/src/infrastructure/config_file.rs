//! TOML configuration file and command-line overrides.
//!
//! # What is TOML? (for beginners)
//!
//! TOML is a small configuration format made of `[sections]` and
//! `key = value` pairs.  A complete bridge configuration looks like this:
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 19200
//! data_bits = 8
//! parity = "none"
//! stop_bits = 1
//!
//! [network]
//! bind_address = "0.0.0.0"
//! port = 502
//! max_clients = 4
//!
//! [timing]
//! # silence_threshold_ms = 2   # derived from baud_rate when omitted
//! max_frame_duration_ms = 500
//! response_window_ms = 5000
//! tick_interval_ms = 1
//! status_interval_secs = 60    # 0 disables the status log
//!
//! [limits]
//! max_frame_size = 256
//! max_partial_writes = 3
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so an empty file (or no
//! file at all) yields the stock configuration and a file only needs the keys
//! that differ.
//!
//! # Precedence
//!
//! Built-in defaults, then the file, then [`ConfigOverrides`] from the
//! command line or `RTU_BRIDGE_*` environment variables.  The merged result
//! is validated once by [`FileConfig::into_bridge_config`].

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rtu_core::timing::{
    inter_frame_silence, TimingError, DEFAULT_MAX_FRAME_DURATION, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_RESPONSE_WINDOW, FIXED_GAP_BAUD_RATE,
};
use rtu_core::AssemblerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::{DEFAULT_MAX_CLIENTS, DEFAULT_MAX_PARTIAL_WRITES, DEFAULT_TCP_PORT};
use crate::domain::{BridgeConfig, BridgeSettings, DataBits, Parity, SerialSettings, StopBits};

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Timing(#[from] TimingError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// On-disk configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub serial: SerialSection,
    pub network: NetworkSection,
    pub timing: TimingSection,
    pub limits: LimitsSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SerialSection {
    #[serde(default = "default_serial_port")]
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// 7 or 8.
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_parity")]
    pub parity: Parity,
    /// 1 or 2.
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    /// IP address to listen on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingSection {
    /// Bus silence that ends a frame.  Derived from the baud rate if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub silence_threshold_ms: Option<u64>,
    #[serde(default = "default_max_frame_duration_ms")]
    pub max_frame_duration_ms: u64,
    #[serde(default = "default_response_window_ms")]
    pub response_window_ms: u64,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Zero disables the periodic status log.
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitsSection {
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
    #[serde(default = "default_max_partial_writes")]
    pub max_partial_writes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud_rate() -> u32 {
    FIXED_GAP_BAUD_RATE
}
fn default_data_bits() -> u8 {
    8
}
fn default_parity() -> Parity {
    Parity::None
}
fn default_stop_bits() -> u8 {
    1
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    DEFAULT_TCP_PORT
}
fn default_max_clients() -> usize {
    DEFAULT_MAX_CLIENTS
}
fn default_max_frame_duration_ms() -> u64 {
    DEFAULT_MAX_FRAME_DURATION.as_millis() as u64
}
fn default_response_window_ms() -> u64 {
    DEFAULT_RESPONSE_WINDOW.as_millis() as u64
}
fn default_tick_interval_ms() -> u64 {
    1
}
fn default_status_interval_secs() -> u64 {
    60
}
fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}
fn default_max_partial_writes() -> u32 {
    DEFAULT_MAX_PARTIAL_WRITES
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SerialSection {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_clients: default_max_clients(),
        }
    }
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            silence_threshold_ms: None,
            max_frame_duration_ms: default_max_frame_duration_ms(),
            response_window_ms: default_response_window_ms(),
            tick_interval_ms: default_tick_interval_ms(),
            status_interval_secs: default_status_interval_secs(),
        }
    }
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_frame_size: default_max_frame_size(),
            max_partial_writes: default_max_partial_writes(),
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Overrides ─────────────────────────────────────────────────────────────────

/// Values supplied on the command line; `None` keeps the file's value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub serial_port: Option<String>,
    pub baud_rate: Option<u32>,
    pub port: Option<u16>,
    pub bind_address: Option<IpAddr>,
    pub max_clients: Option<usize>,
    pub response_window_ms: Option<u64>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Reads and parses a TOML configuration file.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if
/// it is not valid TOML for this schema.
pub fn load(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&text)
}

/// Parses configuration from TOML text.
pub fn parse(text: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(text)?)
}

impl FileConfig {
    /// Applies command-line overrides on top of the file values.
    pub fn apply(&mut self, overrides: &ConfigOverrides) {
        if let Some(port) = &overrides.serial_port {
            self.serial.port = port.clone();
        }
        if let Some(baud) = overrides.baud_rate {
            self.serial.baud_rate = baud;
        }
        if let Some(port) = overrides.port {
            self.network.port = port;
        }
        if let Some(addr) = overrides.bind_address {
            self.network.bind_address = addr.to_string();
        }
        if let Some(max) = overrides.max_clients {
            self.network.max_clients = max;
        }
        if let Some(window) = overrides.response_window_ms {
            self.timing.response_window_ms = window;
        }
    }

    /// Validates the merged values and builds the runtime configuration.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for zero limits, zero durations, unsupported
    /// line settings, an unparseable bind address, or a tick interval that is
    /// not shorter than the silence threshold.
    pub fn into_bridge_config(self) -> Result<BridgeConfig, ConfigError> {
        let serial = SerialSettings {
            data_bits: match self.serial.data_bits {
                7 => DataBits::Seven,
                8 => DataBits::Eight,
                other => return Err(invalid(format!("data_bits must be 7 or 8, got {other}"))),
            },
            stop_bits: match self.serial.stop_bits {
                1 => StopBits::One,
                2 => StopBits::Two,
                other => return Err(invalid(format!("stop_bits must be 1 or 2, got {other}"))),
            },
            parity: self.serial.parity,
            baud_rate: non_zero("serial.baud_rate", self.serial.baud_rate)?,
            port: self.serial.port,
        };
        if serial.port.trim().is_empty() {
            return Err(invalid("serial.port must not be empty".to_string()));
        }

        let ip: IpAddr = self.network.bind_address.parse().map_err(|_| {
            invalid(format!(
                "network.bind_address is not an IP address: {}",
                self.network.bind_address
            ))
        })?;

        let silence_threshold = match self.timing.silence_threshold_ms {
            Some(ms) => Duration::from_millis(non_zero("timing.silence_threshold_ms", ms)?),
            None => inter_frame_silence(serial.baud_rate)?,
        };

        let tick_interval = Duration::from_millis(non_zero(
            "timing.tick_interval_ms",
            self.timing.tick_interval_ms,
        )?);
        if tick_interval >= silence_threshold {
            return Err(invalid(format!(
                "timing.tick_interval_ms ({} ms) must be shorter than the silence threshold ({} ms)",
                tick_interval.as_millis(),
                silence_threshold.as_millis()
            )));
        }

        let bridge = BridgeSettings {
            max_clients: non_zero("network.max_clients", self.network.max_clients)?,
            assembler: AssemblerConfig {
                silence_threshold,
                max_frame_duration: Duration::from_millis(non_zero(
                    "timing.max_frame_duration_ms",
                    self.timing.max_frame_duration_ms,
                )?),
                max_frame_size: non_zero("limits.max_frame_size", self.limits.max_frame_size)?,
            },
            response_window: Duration::from_millis(non_zero(
                "timing.response_window_ms",
                self.timing.response_window_ms,
            )?),
            max_partial_writes: non_zero("limits.max_partial_writes", self.limits.max_partial_writes)?,
        };

        Ok(BridgeConfig {
            listen_addr: SocketAddr::new(ip, self.network.port),
            serial,
            bridge,
            tick_interval,
            status_interval: match self.timing.status_interval_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            log_level: self.logging.level,
        })
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Invalid(message)
}

fn non_zero<T: PartialEq + Default>(name: &str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        Err(invalid(format!("{name} must be greater than zero")))
    } else {
        Ok(value)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

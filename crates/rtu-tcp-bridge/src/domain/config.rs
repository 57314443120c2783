//! Runtime configuration types.
//!
//! [`BridgeConfig`] is the single source of truth for all runtime settings.
//! It is assembled once at startup (TOML file, then CLI overrides, see
//! `infrastructure::config_file`) and never changes afterwards.
//!
//! # Design rationale
//!
//! Keeping configuration as plain structs (no global state, no environment
//! reads inside the domain) lets tests build a bridge with exactly the limits
//! they need, e.g. a registry of capacity 2 or a 50ms response window.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use rtu_core::timing::{DEFAULT_RESPONSE_WINDOW, FIXED_GAP_BAUD_RATE};
use rtu_core::AssemblerConfig;
use serde::{Deserialize, Serialize};

/// Default Modbus TCP port.
pub const DEFAULT_TCP_PORT: u16 = 502;

/// Default number of simultaneously connected TCP clients.
pub const DEFAULT_MAX_CLIENTS: usize = 4;

/// Consecutive partial writes after which a client is treated as gone.
pub const DEFAULT_MAX_PARTIAL_WRITES: u32 = 3;

/// Serial parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Even,
    Odd,
}

/// Number of stop bits on the serial line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopBits {
    One,
    Two,
}

/// Number of data bits per character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBits {
    Seven,
    Eight,
}

/// How to open the RS-485 adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Must match the field device's Modbus RTU setting.
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for SerialSettings {
    /// 19200 bps, 8 data bits, no parity, one stop bit on `/dev/ttyUSB0`.
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: FIXED_GAP_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

impl fmt::Display for SerialSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = match self.data_bits {
            DataBits::Seven => '7',
            DataBits::Eight => '8',
        };
        let parity = match self.parity {
            Parity::None => 'N',
            Parity::Even => 'E',
            Parity::Odd => 'O',
        };
        let stop = match self.stop_bits {
            StopBits::One => '1',
            StopBits::Two => '2',
        };
        write!(f, "{} @ {} bps {data}{parity}{stop}", self.port, self.baud_rate)
    }
}

/// Limits consumed by the bridge controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    /// Capacity of the client registry.
    pub max_clients: usize,
    /// Silence threshold, duration ceiling and buffer size for framing.
    pub assembler: AssemblerConfig,
    /// How long after a forwarded request a frame still counts as its reply.
    pub response_window: Duration,
    /// Consecutive partial writes tolerated before a client is pruned.
    pub max_partial_writes: u32,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            max_clients: DEFAULT_MAX_CLIENTS,
            assembler: AssemblerConfig::default(),
            response_window: DEFAULT_RESPONSE_WINDOW,
            max_partial_writes: DEFAULT_MAX_PARTIAL_WRITES,
        }
    }
}

/// All runtime configuration for the bridge process.
///
/// # Example
///
/// ```rust
/// use rtu_tcp_bridge::domain::BridgeConfig;
///
/// let cfg = BridgeConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 502);
/// assert_eq!(cfg.bridge.max_clients, 4);
/// ```
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Address the Modbus TCP listener binds to.
    pub listen_addr: SocketAddr,
    pub serial: SerialSettings,
    pub bridge: BridgeSettings,
    /// Period of the polling loop.  Must stay below the silence threshold.
    pub tick_interval: Duration,
    /// How often a status summary is logged; `None` disables it.
    pub status_interval: Option<Duration>,
    /// Fallback `tracing` filter when `RUST_LOG` is not set.
    pub log_level: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_TCP_PORT)),
            serial: SerialSettings::default(),
            bridge: BridgeSettings::default(),
            tick_interval: Duration::from_millis(1),
            status_interval: Some(Duration::from_secs(60)),
            log_level: "info".to_string(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

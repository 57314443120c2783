//! rtu-tcp-bridge entry point.
//!
//! Shares one Modbus RTU field device on an RS-485 adapter with up to
//! `max_clients` Modbus TCP clients.
//!
//! # Usage
//!
//! ```text
//! rtu-tcp-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>              TOML configuration file
//!   --serial-port <PATH>         Serial device [default: /dev/ttyUSB0]
//!   --baud-rate <BPS>            Line speed [default: 19200]
//!   --port <PORT>                Modbus TCP port [default: 502]
//!   --bind <IP>                  Listen address [default: 0.0.0.0]
//!   --max-clients <N>            Simultaneous TCP clients [default: 4]
//!   --response-window-ms <MS>    Response window [default: 5000]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable                         | Flag                    |
//! |----------------------------------|-------------------------|
//! | `RTU_BRIDGE_CONFIG`              | `--config`              |
//! | `RTU_BRIDGE_SERIAL_PORT`         | `--serial-port`         |
//! | `RTU_BRIDGE_BAUD_RATE`           | `--baud-rate`           |
//! | `RTU_BRIDGE_PORT`                | `--port`                |
//! | `RTU_BRIDGE_BIND`                | `--bind`                |
//! | `RTU_BRIDGE_MAX_CLIENTS`         | `--max-clients`         |
//! | `RTU_BRIDGE_RESPONSE_WINDOW_MS`  | `--response-window-ms`  |
//!
//! Flags override the configuration file, which overrides built-in defaults.
//! `RUST_LOG` overrides the file's `[logging] level`.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rtu_tcp_bridge::domain::BridgeConfig;
use rtu_tcp_bridge::infrastructure::config_file::{self, ConfigOverrides, FileConfig};
use rtu_tcp_bridge::infrastructure::server::run_bridge;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Modbus RTU serial to TCP bridge.
///
/// Forwards raw RTU frames between one serial field device and every
/// connected TCP client.
#[derive(Debug, Parser)]
#[command(name = "rtu-tcp-bridge", version, about)]
struct Cli {
    /// TOML configuration file.  Built-in defaults are used when omitted.
    #[arg(long, env = "RTU_BRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device path, e.g. `/dev/ttyUSB0` or `COM3`.
    #[arg(long, env = "RTU_BRIDGE_SERIAL_PORT")]
    serial_port: Option<String>,

    #[arg(long, env = "RTU_BRIDGE_BAUD_RATE")]
    baud_rate: Option<u32>,

    /// Modbus TCP listening port.
    #[arg(long, env = "RTU_BRIDGE_PORT")]
    port: Option<u16>,

    /// IP address to listen on.
    #[arg(long, env = "RTU_BRIDGE_BIND")]
    bind: Option<IpAddr>,

    #[arg(long, env = "RTU_BRIDGE_MAX_CLIENTS")]
    max_clients: Option<usize>,

    /// How long after a request a frame still counts as its response.
    #[arg(long, env = "RTU_BRIDGE_RESPONSE_WINDOW_MS")]
    response_window_ms: Option<u64>,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            serial_port: self.serial_port.clone(),
            baud_rate: self.baud_rate,
            port: self.port,
            bind_address: self.bind,
            max_clients: self.max_clients,
            response_window_ms: self.response_window_ms,
        }
    }

    /// Loads the file (if any), applies flag overrides and validates.
    fn into_bridge_config(self) -> anyhow::Result<BridgeConfig> {
        let mut file = match &self.config {
            Some(path) => config_file::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => FileConfig::default(),
        };
        file.apply(&self.overrides());
        file.into_bridge_config()
            .context("invalid bridge configuration")
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.into_bridge_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "rtu-tcp-bridge starting: serial={}, tcp={}, max_clients={}",
        config.serial, config.listen_addr, config.bridge.max_clients
    );
    info!(
        silence_ms = config.bridge.assembler.silence_threshold.as_secs_f64() * 1000.0,
        response_window_ms = config.bridge.response_window.as_millis() as u64,
        "timing"
    );

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_bridge(config, running).await?;

    info!("rtu-tcp-bridge stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! The bridge's run loop.
//!
//! One task on a current-thread runtime does everything:
//!
//! ```text
//! loop {
//!     select! {
//!         accept()   => register the client (or refuse it when full)
//!         tick       => bridge.tick(now); log drained events
//!     }
//!     every status_interval => log a status summary
//! }
//! ```
//!
//! The tick period (1 ms by default) is shorter than the inter-frame silence
//! at every supported baud rate, so a frame is flushed at most one tick after
//! the line goes quiet.  Missed ticks are skipped rather than replayed; the
//! controller works from `Instant::now()` so a late tick still sees the real
//! elapsed time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::event_log::{log_event, log_status};
use super::serial::SerialPortLink;
use super::tcp::{bind_listener, TcpClient};
use crate::application::{BridgeController, SerialLink};
use crate::domain::BridgeConfig;

/// Opens the serial port, binds the listener and runs until `running` is
/// cleared.
///
/// # Errors
///
/// Fails only at startup: the serial port cannot be opened or the TCP port
/// cannot be bound.  Faults while running are logged and survived.
pub async fn run_bridge(config: BridgeConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let serial = SerialPortLink::open(&config.serial)
        .with_context(|| format!("opening serial port {}", config.serial.port))?;
    info!(serial = %config.serial, "serial port ready");

    let listener = bind_listener(config.listen_addr)
        .await
        .context("starting Modbus TCP listener")?;
    let local = listener.local_addr().unwrap_or(config.listen_addr);
    info!(
        addr = %local,
        max_clients = config.bridge.max_clients,
        "listening for Modbus TCP clients"
    );

    serve(listener, serial, &config, running).await;
    Ok(())
}

/// Runs the accept/tick loop over an already-open serial link.
///
/// Split from [`run_bridge`] so tests can drive the loop with a mock serial
/// link and a loopback listener.
pub async fn serve<S: SerialLink>(
    listener: tokio::net::TcpListener,
    serial: S,
    config: &BridgeConfig,
    running: Arc<AtomicBool>,
) {
    let started = Instant::now();
    let mut bridge: BridgeController<S, TcpClient> =
        BridgeController::new(serial, config.bridge, started);

    let mut ticker = interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_status = started;

    while running.load(Ordering::Relaxed) {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => match TcpClient::from_tokio(stream, peer) {
                    Ok(client) => {
                        // Refusal is reported as an event; dropping the client closes it.
                        let _ = bridge.register_client(client, Instant::now());
                    }
                    Err(e) => warn!("{e}"),
                },
                Err(e) => warn!("accept failed: {e}"),
            },
            _ = ticker.tick() => {
                bridge.tick(Instant::now());
            }
        }

        for event in bridge.drain_events() {
            log_event(&event);
        }

        if let Some(every) = config.status_interval {
            let now = Instant::now();
            if now.duration_since(last_status) >= every {
                log_status(&bridge.status(now));
                last_status = now;
            }
        }
    }

    info!(
        clients = bridge.registry().len(),
        "shutting down; {}",
        bridge.status(Instant::now())
    );
    let peers: Vec<_> = bridge
        .registry()
        .iter()
        .map(|(_, slot)| slot.peer())
        .collect();
    for peer in peers {
        info!(%peer, "closing client connection");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    use super::*;
    use crate::infrastructure::mock::MockSerial;

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            status_interval: None,
            ..BridgeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_serve_forwards_request_and_returns_reply_over_tcp() {
        // Arrange
        let listener = bind_listener(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let serial = MockSerial::new();
        let running = Arc::new(AtomicBool::new(true));
        let config = test_config();

        let device = serial.clone();
        let stop = Arc::clone(&running);
        let client = tokio::task::spawn_blocking(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            std::thread::sleep(Duration::from_millis(50));
            stream.write_all(&[0x01, 0x04, 0x00, 0x00, 0x00, 0x01, 0x31, 0xCA]).unwrap();

            // Wait for the request to reach the bus, then answer it.
            let deadline = Instant::now() + Duration::from_secs(5);
            while device.written().is_empty() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(5));
            }
            device.push_inbound(&[0x01, 0x04, 0x02, 0x00, 0x2A, 0x39, 0x0F]);

            let mut reply = [0u8; 7];
            stream.read_exact(&mut reply).unwrap();
            stop.store(false, Ordering::Relaxed);
            reply
        });

        // Act
        serve(listener, serial.clone(), &config, running).await;
        let reply = client.await.unwrap();

        // Assert
        assert_eq!(
            serial.written(),
            vec![vec![0x01, 0x04, 0x00, 0x00, 0x00, 0x01, 0x31, 0xCA]]
        );
        assert_eq!(reply, [0x01, 0x04, 0x02, 0x00, 0x2A, 0x39, 0x0F]);
    }

    #[tokio::test]
    async fn test_serve_returns_when_running_flag_is_cleared() {
        let listener = bind_listener(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap();
        let running = Arc::new(AtomicBool::new(false));

        tokio::time::timeout(
            Duration::from_secs(1),
            serve(listener, MockSerial::new(), &test_config(), running),
        )
        .await
        .expect("serve must return promptly once stopped");
    }
}

//! BridgeController: the request path and the response path of the bridge.
//!
//! # Data flow
//!
//! ```text
//!  TCP clients ──poll_requests──► serial.write_all ──► tracker.arm(now)
//!
//!  serial bytes ──► FrameAssembler ──► Frame ──► tracker.classify
//!                                                    │
//!                          RESPONSE / UNSOLICITED ◄──┘
//!                                   │
//!                                   ▼
//!                        registry.broadcast (every live client)
//! ```
//!
//! # Scheduling
//!
//! There are no threads and no awaits in here.  An external driver calls
//! [`BridgeController::tick`] every millisecond or so with the current time.
//! Tests call it with logical time instead, which makes every timing path
//! (silence gaps, duration ceiling, response window) deterministic.
//!
//! Within one tick the serial port is drained completely before any client
//! request is forwarded, and every client is drained completely as well, so
//! bytes that were already available are never left for the next tick.
//!
//! # Routing
//!
//! Modbus RTU carries no transaction identifier, so a reply cannot be routed
//! back to the client that asked.  Every frame, response or unsolicited, goes
//! to every connected client.  A second request arriving while one is pending
//! is forwarded immediately and re-arms the tracker; requests are not queued.

use std::time::Instant;

use rtu_core::frame::hex_dump;
use rtu_core::{Classification, CorrelationTracker, Frame, FrameAssembler};

use super::client_registry::{BroadcastReport, ClientRegistry, Departure, RegistryError};
use super::ports::{ClientConnection, SerialLink};
use crate::domain::{BridgeEvent, BridgeSettings, BridgeStats, BridgeStatus, SlotIndex};

/// Owns every piece of bridge state; one instance per serial bus.
pub struct BridgeController<S, C> {
    serial: S,
    assembler: FrameAssembler,
    tracker: CorrelationTracker,
    registry: ClientRegistry<C>,
    settings: BridgeSettings,
    stats: BridgeStats,
    events: Vec<BridgeEvent>,
    started_at: Instant,
    serial_buf: Vec<u8>,
}

impl<S: SerialLink, C: ClientConnection> BridgeController<S, C> {
    /// Creates a bridge over `serial` with no clients connected.
    pub fn new(serial: S, settings: BridgeSettings, now: Instant) -> Self {
        Self {
            serial,
            assembler: FrameAssembler::new(settings.assembler),
            tracker: CorrelationTracker::new(settings.response_window),
            registry: ClientRegistry::new(settings.max_clients, settings.max_partial_writes),
            serial_buf: vec![0u8; settings.assembler.max_frame_size.max(1)],
            settings,
            stats: BridgeStats::default(),
            events: Vec::new(),
            started_at: now,
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn registry(&self) -> &ClientRegistry<C> {
        &self.registry
    }

    pub fn tracker(&self) -> &CorrelationTracker {
        &self.tracker
    }

    pub fn assembler(&self) -> &FrameAssembler {
        &self.assembler
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    /// Registers a freshly accepted connection.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CapacityExceeded`] when the registry is full.
    /// The connection is dropped and a `ClientRejected` event is recorded.
    pub fn register_client(&mut self, connection: C, now: Instant) -> Result<SlotIndex, RegistryError> {
        let peer = connection.peer_addr();
        match self.registry.register(connection, now) {
            Ok(slot) => {
                self.stats.clients_accepted += 1;
                self.events.push(BridgeEvent::ClientRegistered { slot, peer });
                Ok(slot)
            }
            Err(err) => {
                let RegistryError::CapacityExceeded { capacity } = err;
                self.stats.clients_rejected += 1;
                self.events.push(BridgeEvent::ClientRejected { peer, capacity });
                Err(err)
            }
        }
    }

    /// Advances the bridge by one polling step at time `now`.
    ///
    /// 1. Drain the serial port into the assembler, dispatching every frame
    ///    that completes along the way.
    /// 2. Poll the assembler so a frame that went silent is flushed even if
    ///    no new byte arrived.
    /// 3. Expire the outstanding request if its window elapsed with no frame.
    /// 4. Forward every client's pending bytes to the serial bus.
    pub fn tick(&mut self, now: Instant) {
        self.drain_serial(now);

        if let Some(frame) = self.assembler.poll(now) {
            self.dispatch(frame);
        }

        // A frame still being received will be classified when it completes.
        if !self.assembler.is_in_progress() {
            if let Some(missed) = self.tracker.check_timeout(now) {
                self.stats.missed_responses += 1;
                self.events.push(BridgeEvent::MissedResponse {
                    waited: missed.waited,
                });
            }
        }

        self.forward_requests(now);
    }

    /// Takes every event recorded since the last call.
    pub fn drain_events(&mut self) -> Vec<BridgeEvent> {
        std::mem::take(&mut self.events)
    }

    /// Builds a status snapshot.
    pub fn status(&self, now: Instant) -> BridgeStatus {
        BridgeStatus {
            uptime: now.saturating_duration_since(self.started_at),
            active_clients: self.registry.len(),
            capacity: self.registry.capacity(),
            awaiting_response: self.tracker.is_awaiting(),
            stats: self.stats,
        }
    }

    // ── Response path ─────────────────────────────────────────────────────────

    fn drain_serial(&mut self, now: Instant) {
        loop {
            let n = match self.serial.read_available(&mut self.serial_buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    self.stats.serial_errors += 1;
                    self.events.push(BridgeEvent::SerialReadFailed {
                        error: e.to_string(),
                    });
                    break;
                }
            };
            for i in 0..n {
                if let Some(frame) = self.assembler.feed(self.serial_buf[i], now) {
                    self.dispatch(frame);
                }
            }
        }
    }

    fn dispatch(&mut self, frame: Frame) {
        let sequence = frame.sequence();
        self.stats.frames_received += 1;
        self.stats.frame_bytes += frame.len() as u64;
        self.events.push(BridgeEvent::FrameReceived {
            sequence,
            len: frame.len(),
            truncated: frame.is_truncated(),
            hex: frame.to_hex(),
        });
        if frame.is_truncated() {
            self.stats.truncated_frames += 1;
            self.events.push(BridgeEvent::BufferOverflow {
                sequence,
                capacity: self.settings.assembler.max_frame_size,
                dropped: frame.dropped_bytes(),
            });
        }

        let classification = self.tracker.classify(frame.started_at(), frame.completed_at());
        match classification {
            Classification::Response { .. } => self.stats.responses += 1,
            Classification::Unsolicited => self.stats.unsolicited += 1,
        }
        self.events.push(BridgeEvent::FrameClassified {
            sequence,
            classification,
        });

        let report = self.registry.broadcast(frame.bytes(), |_, _| true);
        self.record_broadcast(sequence, report);
    }

    fn record_broadcast(&mut self, sequence: u64, report: BroadcastReport) {
        self.stats.partial_writes += report.partial.len() as u64;
        for partial in &report.partial {
            self.events.push(BridgeEvent::PartialWrite {
                slot: partial.slot,
                written: partial.written,
                expected: partial.expected,
            });
        }
        self.events.push(BridgeEvent::FrameBroadcast {
            sequence,
            attempted: report.attempted,
            delivered: report.delivered.len(),
        });
        self.record_departures(report.departures);
    }

    // ── Request path ──────────────────────────────────────────────────────────

    fn forward_requests(&mut self, now: Instant) {
        let outcome = self
            .registry
            .poll_requests(self.settings.assembler.max_frame_size);

        for request in outcome.requests {
            if let Err(e) = self.serial.write_all(&request.bytes) {
                self.stats.serial_errors += 1;
                self.events.push(BridgeEvent::SerialWriteFailed {
                    slot: request.slot,
                    error: e.to_string(),
                });
                continue;
            }

            let superseded_pending = self.tracker.is_awaiting();
            self.tracker.arm(now);
            self.stats.requests_forwarded += 1;
            self.stats.request_bytes += request.bytes.len() as u64;
            self.events.push(BridgeEvent::RequestForwarded {
                slot: request.slot,
                peer: request.peer,
                len: request.bytes.len(),
                hex: hex_dump(&request.bytes),
                superseded_pending,
            });
        }

        self.record_departures(outcome.departures);
    }

    fn record_departures(&mut self, departures: Vec<Departure>) {
        for departure in departures {
            self.events.push(BridgeEvent::ClientUnregistered {
                slot: departure.slot,
                peer: departure.peer,
                reason: departure.reason,
            });
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io;
    use std::net::SocketAddr;
    use std::time::Duration;

    use mockall::predicate::eq;
    use rtu_core::AssemblerConfig;

    use super::*;
    use crate::application::ports::MockSerialLink;
    use crate::domain::DisconnectReason;
    use crate::infrastructure::mock::{MockClient, MockSerial};

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn settings() -> BridgeSettings {
        BridgeSettings {
            max_clients: 4,
            assembler: AssemblerConfig {
                silence_threshold: ms(2),
                max_frame_duration: ms(500),
                max_frame_size: 256,
            },
            response_window: ms(5_000),
            max_partial_writes: 3,
        }
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 20], port))
    }

    #[test]
    fn test_request_is_written_verbatim_and_arms_tracker() {
        // Arrange: expect exactly one serial write with the client's bytes
        let request = vec![0x01, 0x04, 0x00, 0x00, 0x00, 0x01, 0x31, 0xCA];
        let mut serial = MockSerialLink::new();
        serial.expect_read_available().returning(|_| Ok(0));
        serial
            .expect_write_all()
            .with(eq(request.clone()))
            .times(1)
            .returning(|_| Ok(()));
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(serial, settings(), t0);
        let client = MockClient::new(peer(5000));
        client.push_inbound(&request);
        bridge.register_client(client, t0).unwrap();

        // Act
        bridge.tick(t0 + ms(1));

        // Assert
        assert!(bridge.tracker().is_awaiting());
        assert_eq!(bridge.stats().requests_forwarded, 1);
    }

    #[test]
    fn test_serial_write_failure_does_not_arm_tracker() {
        let mut serial = MockSerialLink::new();
        serial.expect_read_available().returning(|_| Ok(0));
        serial
            .expect_write_all()
            .returning(|_| Err(io::Error::new(io::ErrorKind::BrokenPipe, "adapter unplugged")));
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(serial, settings(), t0);
        let client = MockClient::new(peer(5000));
        client.push_inbound(&[0x01, 0x03]);
        bridge.register_client(client, t0).unwrap();

        bridge.tick(t0);

        assert!(!bridge.tracker().is_awaiting());
        assert!(bridge
            .drain_events()
            .iter()
            .any(|e| matches!(e, BridgeEvent::SerialWriteFailed { .. })));
        assert_eq!(bridge.registry().len(), 1, "client must stay connected");
    }

    #[test]
    fn test_serial_read_error_is_reported_and_bridge_keeps_running() {
        let mut serial = MockSerialLink::new();
        serial
            .expect_read_available()
            .returning(|_| Err(io::Error::new(io::ErrorKind::Other, "framing error")));
        let t0 = Instant::now();
        let mut bridge: BridgeController<_, MockClient> = BridgeController::new(serial, settings(), t0);

        bridge.tick(t0);
        bridge.tick(t0 + ms(1));

        assert_eq!(bridge.stats().serial_errors, 2);
    }

    #[test]
    fn test_response_frame_is_broadcast_and_classified() {
        // Arrange
        let serial = MockSerial::new();
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(serial.clone(), settings(), t0);
        let asker = MockClient::new(peer(1));
        let listener = MockClient::new(peer(2));
        bridge.register_client(asker.clone(), t0).unwrap();
        bridge.register_client(listener.clone(), t0).unwrap();
        asker.push_inbound(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]);
        bridge.tick(t0);

        // Act: device answers 20ms later, then the line goes quiet
        serial.push_inbound(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x0B, 0x7A, 0x30]);
        bridge.tick(t0 + ms(20));
        bridge.tick(t0 + ms(23));

        // Assert
        let reply = vec![0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x0B, 0x7A, 0x30];
        assert_eq!(asker.written(), reply);
        assert_eq!(listener.written(), reply, "responses go to every client");
        assert!(!bridge.tracker().is_awaiting());
        let classified: Vec<_> = bridge
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                BridgeEvent::FrameClassified { classification, .. } => Some(classification),
                _ => None,
            })
            .collect();
        assert_eq!(
            classified,
            vec![Classification::Response { elapsed: ms(23) }]
        );
    }

    #[test]
    fn test_unsolicited_frame_leaves_tracker_idle() {
        let serial = MockSerial::new();
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(serial.clone(), settings(), t0);
        let client = MockClient::new(peer(1));
        bridge.register_client(client.clone(), t0).unwrap();

        serial.push_inbound(&[0x01, 0x10, 0x00]);
        bridge.tick(t0);
        bridge.tick(t0 + ms(5));

        assert_eq!(client.written(), vec![0x01, 0x10, 0x00]);
        assert_eq!(bridge.stats().unsolicited, 1);
        assert!(!bridge.tracker().is_awaiting());
    }

    #[test]
    fn test_missed_response_waits_for_frame_in_progress() {
        // Arrange: short window so the reply is still arriving when it ends
        let mut cfg = settings();
        cfg.response_window = ms(10);
        let serial = MockSerial::new();
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(serial.clone(), cfg, t0);
        let client = MockClient::new(peer(1));
        bridge.register_client(client.clone(), t0).unwrap();
        client.push_inbound(&[0x01, 0x04]);
        bridge.tick(t0);

        // Act: bytes trickle in across the end of the window
        for i in 9..=12u64 {
            serial.push_inbound(&[0x55]);
            bridge.tick(t0 + ms(i));
        }
        bridge.tick(t0 + ms(15));

        // Assert: late frame is unsolicited, but no missed-response event
        let events = bridge.drain_events();
        assert!(!events.iter().any(|e| matches!(e, BridgeEvent::MissedResponse { .. })));
        assert_eq!(bridge.stats().unsolicited, 1);
    }

    #[test]
    fn test_second_request_rearms_and_is_flagged() {
        let serial = MockSerial::new();
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(serial.clone(), settings(), t0);
        let a = MockClient::new(peer(1));
        let b = MockClient::new(peer(2));
        bridge.register_client(a.clone(), t0).unwrap();
        bridge.register_client(b.clone(), t0).unwrap();

        a.push_inbound(&[0x01]);
        bridge.tick(t0);
        b.push_inbound(&[0x02]);
        bridge.tick(t0 + ms(3));

        assert_eq!(serial.written(), vec![vec![0x01], vec![0x02]]);
        let superseded: Vec<bool> = bridge
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                BridgeEvent::RequestForwarded { superseded_pending, .. } => Some(superseded_pending),
                _ => None,
            })
            .collect();
        assert_eq!(superseded, vec![false, true]);
    }

    #[test]
    fn test_frame_already_on_the_bus_is_not_taken_as_the_reply() {
        // Arrange: heartbeat bytes t0..t0+5ms, request forwarded at t0+3ms
        let serial = MockSerial::new();
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(serial.clone(), settings(), t0);
        let client = MockClient::new(peer(1));
        bridge.register_client(client.clone(), t0).unwrap();
        for i in 0..=5u64 {
            serial.push_inbound(&[0xA5]);
            if i == 3 {
                client.push_inbound(&[0x01, 0x04, 0x00, 0x00, 0x00, 0x01, 0x31, 0xCA]);
            }
            bridge.tick(t0 + ms(i));
        }
        bridge.tick(t0 + ms(8));

        // Act: the real reply starts at t0+20ms
        for i in 20..=22u64 {
            serial.push_inbound(&[0x01]);
            bridge.tick(t0 + ms(i));
        }
        bridge.tick(t0 + ms(25));

        // Assert
        let classified: Vec<_> = bridge
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                BridgeEvent::FrameClassified { classification, .. } => Some(classification),
                _ => None,
            })
            .collect();
        assert_eq!(
            classified,
            vec![
                Classification::Unsolicited,
                Classification::Response { elapsed: ms(22) },
            ]
        );
        assert_eq!(bridge.stats().responses, 1);
        assert!(!bridge.tracker().is_awaiting());
    }

    #[test]
    fn test_overflow_is_reported_once_per_frame() {
        let serial = MockSerial::new();
        let t0 = Instant::now();
        let mut bridge: BridgeController<_, MockClient> =
            BridgeController::new(serial.clone(), settings(), t0);

        serial.push_inbound(&[0x7E; 300]);
        bridge.tick(t0);
        serial.push_inbound(&[0x7E; 10]);
        bridge.tick(t0 + ms(1));
        bridge.tick(t0 + ms(4));

        let overflows: Vec<_> = bridge
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, BridgeEvent::BufferOverflow { .. }))
            .collect();
        assert_eq!(
            overflows,
            vec![BridgeEvent::BufferOverflow {
                sequence: 1,
                capacity: 256,
                dropped: 54,
            }]
        );
    }

    #[test]
    fn test_partial_writes_are_reported_and_persistent_ones_drop_the_client() {
        // Arrange: one healthy client, one whose socket takes 2 bytes at a time
        let serial = MockSerial::new();
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(serial.clone(), settings(), t0);
        let healthy = MockClient::new(peer(1));
        let slow = MockClient::new(peer(2));
        slow.limit_writes(2);
        bridge.register_client(healthy.clone(), t0).unwrap();
        bridge.register_client(slow.clone(), t0).unwrap();
        bridge.drain_events();

        // Act: three unsolicited frames, each 4 bytes long
        let mut now = t0;
        for _ in 0..3 {
            serial.push_inbound(&[0x01, 0x41, 0x00, 0x01]);
            bridge.tick(now);
            now += ms(3);
            bridge.tick(now);
            now += ms(1);
        }

        // Assert
        let events = bridge.drain_events();
        let partials = events
            .iter()
            .filter(|e| {
                matches!(
                    e,
                    BridgeEvent::PartialWrite {
                        slot: SlotIndex(1),
                        written: 2,
                        expected: 4,
                    }
                )
            })
            .count();
        assert_eq!(partials, 3);
        assert_eq!(bridge.stats().partial_writes, 3);
        assert!(events.contains(&BridgeEvent::ClientUnregistered {
            slot: SlotIndex(1),
            peer: peer(2),
            reason: DisconnectReason::PersistentPartialWrites,
        }));
        assert!(events.contains(&BridgeEvent::FrameBroadcast {
            sequence: 1,
            attempted: 2,
            delivered: 1,
        }));
        assert_eq!(bridge.registry().len(), 1);
        assert_eq!(healthy.written().len(), 12);
        assert_eq!(slow.written(), vec![0x01, 0x41, 0x01, 0x41, 0x01, 0x41]);
    }

    #[test]
    fn test_rejected_client_is_counted() {
        let mut cfg = settings();
        cfg.max_clients = 1;
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(MockSerial::new(), cfg, t0);

        bridge.register_client(MockClient::new(peer(1)), t0).unwrap();
        let err = bridge.register_client(MockClient::new(peer(2)), t0).unwrap_err();

        assert_eq!(err, RegistryError::CapacityExceeded { capacity: 1 });
        assert_eq!(bridge.stats().clients_rejected, 1);
        assert!(bridge.drain_events().contains(&BridgeEvent::ClientRejected {
            peer: peer(2),
            capacity: 1,
        }));
    }

    #[test]
    fn test_status_reports_clients_and_uptime() {
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(MockSerial::new(), settings(), t0);
        bridge.register_client(MockClient::new(peer(1)), t0).unwrap();

        let status = bridge.status(t0 + Duration::from_secs(42));

        assert_eq!(status.uptime, Duration::from_secs(42));
        assert_eq!(status.active_clients, 1);
        assert_eq!(status.capacity, 4);
        assert!(!status.awaiting_response);
    }

    #[test]
    fn test_drain_events_empties_the_queue() {
        let t0 = Instant::now();
        let mut bridge = BridgeController::new(MockSerial::new(), settings(), t0);
        bridge.register_client(MockClient::new(peer(1)), t0).unwrap();

        assert_eq!(bridge.drain_events().len(), 1);
        assert!(bridge.drain_events().is_empty());
    }
}

//! ClientRegistry: fixed-capacity table of connected TCP clients.
//!
//! # Slot lifecycle (for beginners)
//!
//! ```text
//!   accept ──► register() ──► occupied ──► read EOF / read error   ──► freed
//!                  │                    └─► write error             ──► freed
//!                  │                    └─► N partial writes in a row ► freed
//!                  └─► registry full: connection dropped (refused)
//! ```
//!
//! Liveness is checked lazily.  There is no heartbeat: a dead peer is only
//! noticed when a read reports end-of-stream or a write fails, and its slot is
//! freed on the spot so the next `register` can reuse it.
//!
//! The registry is the only code that mutates slot state.  The bridge
//! controller asks it to poll for requests and to broadcast frames, and gets
//! back plain reports describing what happened.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Instant;

use thiserror::Error;

use super::ports::ClientConnection;
use crate::domain::{DisconnectReason, SlotIndex};

/// Errors from registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Every slot is occupied; the new connection was refused.
    #[error("client registry full: all {capacity} slots in use")]
    CapacityExceeded { capacity: usize },
}

/// An occupied registry slot.
#[derive(Debug)]
pub struct ClientSlot<C> {
    connection: C,
    peer: SocketAddr,
    connected_at: Instant,
    consecutive_partial_writes: u32,
}

impl<C> ClientSlot<C> {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    pub fn consecutive_partial_writes(&self) -> u32 {
        self.consecutive_partial_writes
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn into_connection(self) -> C {
        self.connection
    }
}

/// A slot freed during polling or broadcasting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Departure {
    pub slot: SlotIndex,
    pub peer: SocketAddr,
    pub reason: DisconnectReason,
}

/// All bytes one client had pending, read as a single unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    pub slot: SlotIndex,
    pub peer: SocketAddr,
    pub bytes: Vec<u8>,
}

/// Result of [`ClientRegistry::poll_requests`].
#[derive(Debug, Default)]
pub struct PollOutcome {
    pub requests: Vec<InboundRequest>,
    pub departures: Vec<Departure>,
}

/// A write that the socket only partly accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialDelivery {
    pub slot: SlotIndex,
    pub written: usize,
    pub expected: usize,
}

/// Result of [`ClientRegistry::broadcast`].
#[derive(Debug, Default)]
pub struct BroadcastReport {
    /// Slots that matched the predicate and were written to.
    pub attempted: usize,
    /// Slots that accepted every byte.
    pub delivered: Vec<SlotIndex>,
    pub partial: Vec<PartialDelivery>,
    pub departures: Vec<Departure>,
}

/// Fixed-capacity client table.
pub struct ClientRegistry<C> {
    slots: Vec<Option<ClientSlot<C>>>,
    max_partial_writes: u32,
}

impl<C: ClientConnection> ClientRegistry<C> {
    /// Creates an empty registry with `capacity` slots.
    pub fn new(capacity: usize, max_partial_writes: u32) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            max_partial_writes,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Places `connection` in the lowest free slot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CapacityExceeded`] when every slot is taken.
    /// The connection is dropped (closed) in that case; existing slots are
    /// left untouched.
    pub fn register(&mut self, connection: C, now: Instant) -> Result<SlotIndex, RegistryError> {
        let Some(index) = self.slots.iter().position(Option::is_none) else {
            return Err(RegistryError::CapacityExceeded {
                capacity: self.capacity(),
            });
        };
        let peer = connection.peer_addr();
        self.slots[index] = Some(ClientSlot {
            connection,
            peer,
            connected_at: now,
            consecutive_partial_writes: 0,
        });
        Ok(SlotIndex(index))
    }

    /// Frees a slot and returns its occupant.
    pub fn unregister(&mut self, index: SlotIndex) -> Option<ClientSlot<C>> {
        self.slots.get_mut(index.0).and_then(Option::take)
    }

    pub fn get(&self, index: SlotIndex) -> Option<&ClientSlot<C>> {
        self.slots.get(index.0).and_then(Option::as_ref)
    }

    /// Iterates over occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &ClientSlot<C>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|s| (SlotIndex(i), s)))
    }

    /// Drains every client's pending bytes.
    ///
    /// Each client's bytes are read until the socket reports `WouldBlock`, so
    /// nothing that was already available is left behind for the next tick.
    /// Clients whose read hits end-of-stream or an error are freed; bytes they
    /// sent before closing are still returned as a request.
    pub fn poll_requests(&mut self, read_chunk: usize) -> PollOutcome {
        let mut outcome = PollOutcome::default();
        let mut buf = vec![0u8; read_chunk.max(1)];

        for (i, entry) in self.slots.iter_mut().enumerate() {
            let Some(slot) = entry.as_mut() else { continue };
            let mut bytes = Vec::new();
            let mut closed = None;

            loop {
                match slot.connection.try_read(&mut buf) {
                    Ok(0) => {
                        closed = Some(DisconnectReason::PeerClosed);
                        break;
                    }
                    Ok(n) => bytes.extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(_) => {
                        closed = Some(DisconnectReason::ReadFailed);
                        break;
                    }
                }
            }

            if !bytes.is_empty() {
                outcome.requests.push(InboundRequest {
                    slot: SlotIndex(i),
                    peer: slot.peer,
                    bytes,
                });
            }
            if let Some(reason) = closed {
                outcome.departures.push(Departure {
                    slot: SlotIndex(i),
                    peer: slot.peer,
                    reason,
                });
                *entry = None;
            }
        }

        outcome
    }

    /// Writes `bytes` once to every occupied slot matching `predicate`.
    ///
    /// Delivery is best effort: one write per client, no retry.  A short write
    /// keeps the connection but counts against it; after
    /// `max_partial_writes` short writes in a row the slot is freed.  A write
    /// error frees the slot immediately.
    pub fn broadcast<F>(&mut self, bytes: &[u8], mut predicate: F) -> BroadcastReport
    where
        F: FnMut(SlotIndex, &ClientSlot<C>) -> bool,
    {
        let mut report = BroadcastReport::default();

        for (i, entry) in self.slots.iter_mut().enumerate() {
            let index = SlotIndex(i);
            let Some(slot) = entry.as_mut() else { continue };
            if !predicate(index, &*slot) {
                continue;
            }
            report.attempted += 1;

            let written = match slot.connection.try_write(bytes) {
                Ok(n) => n,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => 0,
                Err(_) => {
                    report.departures.push(Departure {
                        slot: index,
                        peer: slot.peer,
                        reason: DisconnectReason::WriteFailed,
                    });
                    *entry = None;
                    continue;
                }
            };

            if written == bytes.len() {
                slot.consecutive_partial_writes = 0;
                report.delivered.push(index);
                continue;
            }

            slot.consecutive_partial_writes += 1;
            report.partial.push(PartialDelivery {
                slot: index,
                written,
                expected: bytes.len(),
            });
            if slot.consecutive_partial_writes >= self.max_partial_writes {
                report.departures.push(Departure {
                    slot: index,
                    peer: slot.peer,
                    reason: DisconnectReason::PersistentPartialWrites,
                });
                *entry = None;
            }
        }

        report
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockClient;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 9], port))
    }

    fn registry(capacity: usize) -> ClientRegistry<MockClient> {
        ClientRegistry::new(capacity, 3)
    }

    #[test]
    fn test_registry_starts_empty() {
        let reg = registry(4);
        assert!(reg.is_empty());
        assert!(!reg.is_full());
        assert_eq!(reg.capacity(), 4);
    }

    #[test]
    fn test_register_fills_lowest_free_slot() {
        // Arrange
        let mut reg = registry(4);
        let now = Instant::now();

        // Act
        let a = reg.register(MockClient::new(peer(1)), now).unwrap();
        let b = reg.register(MockClient::new(peer(2)), now).unwrap();
        reg.unregister(a);
        let c = reg.register(MockClient::new(peer(3)), now).unwrap();

        // Assert
        assert_eq!(b, SlotIndex(1));
        assert_eq!(c, SlotIndex(0), "freed slot 0 must be reused first");
        assert_eq!(reg.get(c).unwrap().peer(), peer(3));
    }

    #[test]
    fn test_register_beyond_capacity_is_rejected_without_disturbing_slots() {
        // Arrange
        let mut reg = registry(4);
        let now = Instant::now();
        for port in 1..=4 {
            reg.register(MockClient::new(peer(port)), now).unwrap();
        }

        // Act
        let result = reg.register(MockClient::new(peer(5)), now);

        // Assert
        assert_eq!(result, Err(RegistryError::CapacityExceeded { capacity: 4 }));
        assert!(reg.is_full());
        let peers: Vec<_> = reg.iter().map(|(_, slot)| slot.peer()).collect();
        assert_eq!(peers, vec![peer(1), peer(2), peer(3), peer(4)]);
    }

    #[test]
    fn test_unregister_unknown_slot_returns_none() {
        let mut reg = registry(2);
        assert!(reg.unregister(SlotIndex(0)).is_none());
        assert!(reg.unregister(SlotIndex(9)).is_none());
    }

    #[test]
    fn test_poll_requests_reads_all_pending_bytes_as_one_unit() {
        // Arrange: bytes arrive in two separate socket chunks
        let mut reg = registry(2);
        let client = MockClient::new(peer(1));
        client.push_inbound(&[0x01, 0x04, 0x00]);
        client.push_inbound(&[0x00, 0x00, 0x01, 0x31, 0xCA]);
        reg.register(client, Instant::now()).unwrap();

        // Act
        let outcome = reg.poll_requests(4);

        // Assert
        assert_eq!(outcome.requests.len(), 1);
        assert_eq!(
            outcome.requests[0].bytes,
            vec![0x01, 0x04, 0x00, 0x00, 0x00, 0x01, 0x31, 0xCA]
        );
        assert!(outcome.departures.is_empty());
    }

    #[test]
    fn test_poll_requests_without_data_returns_nothing() {
        let mut reg = registry(2);
        reg.register(MockClient::new(peer(1)), Instant::now()).unwrap();

        let outcome = reg.poll_requests(256);

        assert!(outcome.requests.is_empty());
        assert!(outcome.departures.is_empty());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_poll_requests_prunes_closed_peer_but_keeps_its_last_bytes() {
        // Arrange
        let mut reg = registry(2);
        let client = MockClient::new(peer(1));
        client.push_inbound(&[0xAA, 0xBB]);
        client.close();
        reg.register(client, Instant::now()).unwrap();

        // Act
        let outcome = reg.poll_requests(256);

        // Assert
        assert_eq!(outcome.requests[0].bytes, vec![0xAA, 0xBB]);
        assert_eq!(
            outcome.departures,
            vec![Departure {
                slot: SlotIndex(0),
                peer: peer(1),
                reason: DisconnectReason::PeerClosed,
            }]
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn test_poll_requests_prunes_on_read_error() {
        let mut reg = registry(1);
        let client = MockClient::new(peer(1));
        client.fail_reads();
        reg.register(client, Instant::now()).unwrap();

        let outcome = reg.poll_requests(16);

        assert_eq!(outcome.departures[0].reason, DisconnectReason::ReadFailed);
        assert!(reg.is_empty());
    }

    #[test]
    fn test_broadcast_reaches_every_live_slot() {
        // Arrange
        let mut reg = registry(4);
        let a = MockClient::new(peer(1));
        let b = MockClient::new(peer(2));
        reg.register(a.clone(), Instant::now()).unwrap();
        reg.register(b.clone(), Instant::now()).unwrap();

        // Act
        let report = reg.broadcast(&[1, 2, 3], |_, _| true);

        // Assert
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, vec![SlotIndex(0), SlotIndex(1)]);
        assert_eq!(a.written(), vec![1, 2, 3]);
        assert_eq!(b.written(), vec![1, 2, 3]);
    }

    #[test]
    fn test_broadcast_respects_predicate() {
        let mut reg = registry(4);
        let a = MockClient::new(peer(1));
        let b = MockClient::new(peer(2));
        reg.register(a.clone(), Instant::now()).unwrap();
        reg.register(b.clone(), Instant::now()).unwrap();

        let report = reg.broadcast(&[9], |slot, _| slot == SlotIndex(1));

        assert_eq!(report.attempted, 1);
        assert!(a.written().is_empty());
        assert_eq!(b.written(), vec![9]);
    }

    #[test]
    fn test_broadcast_prunes_disconnected_peer_without_writing() {
        // Arrange
        let mut reg = registry(4);
        let alive = MockClient::new(peer(1));
        let gone = MockClient::new(peer(2));
        reg.register(alive.clone(), Instant::now()).unwrap();
        reg.register(gone.clone(), Instant::now()).unwrap();
        gone.close();

        // Act
        let report = reg.broadcast(&[0x01, 0x83, 0x02], |_, _| true);

        // Assert
        assert_eq!(report.delivered, vec![SlotIndex(0)]);
        assert_eq!(report.departures[0].reason, DisconnectReason::WriteFailed);
        assert!(gone.written().is_empty());
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_partial_write_keeps_connection_and_is_reported() {
        let mut reg = registry(1);
        let client = MockClient::new(peer(1));
        client.limit_writes(2);
        reg.register(client.clone(), Instant::now()).unwrap();

        let report = reg.broadcast(&[1, 2, 3, 4], |_, _| true);

        assert_eq!(
            report.partial,
            vec![PartialDelivery {
                slot: SlotIndex(0),
                written: 2,
                expected: 4,
            }]
        );
        assert!(report.departures.is_empty());
        assert_eq!(reg.get(SlotIndex(0)).unwrap().consecutive_partial_writes(), 1);
        assert_eq!(client.written(), vec![1, 2]);
    }

    #[test]
    fn test_persistent_partial_writes_free_the_slot() {
        // Arrange
        let mut reg = registry(1);
        let client = MockClient::new(peer(1));
        client.limit_writes(1);
        reg.register(client, Instant::now()).unwrap();

        // Act
        let first = reg.broadcast(&[1, 2], |_, _| true);
        let second = reg.broadcast(&[1, 2], |_, _| true);
        let third = reg.broadcast(&[1, 2], |_, _| true);

        // Assert
        assert!(first.departures.is_empty());
        assert!(second.departures.is_empty());
        assert_eq!(
            third.departures[0].reason,
            DisconnectReason::PersistentPartialWrites
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn test_full_write_resets_partial_counter() {
        let mut reg = registry(1);
        let client = MockClient::new(peer(1));
        client.limit_writes(1);
        reg.register(client.clone(), Instant::now()).unwrap();

        reg.broadcast(&[1, 2], |_, _| true);
        reg.broadcast(&[1, 2], |_, _| true);
        reg.broadcast(&[7], |_, _| true);

        assert_eq!(reg.get(SlotIndex(0)).unwrap().consecutive_partial_writes(), 0);
    }

    #[test]
    fn test_would_block_counts_as_partial_write_of_zero() {
        let mut reg = registry(1);
        let client = MockClient::new(peer(1));
        client.limit_writes(0);
        reg.register(client, Instant::now()).unwrap();

        let report = reg.broadcast(&[5, 6], |_, _| true);

        assert_eq!(report.partial[0].written, 0);
        assert_eq!(reg.len(), 1);
    }
}

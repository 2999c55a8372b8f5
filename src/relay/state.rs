//! Relay session state.
//!
//! Each side of a relay moves `Connecting → Open → Closing → Closed`; a
//! side never moves backwards.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use uuid::Uuid;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SocketState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for SocketState {
    fn from(val: u8) -> Self {
        match val {
            0 => SocketState::Connecting,
            1 => SocketState::Open,
            2 => SocketState::Closing,
            _ => SocketState::Closed,
        }
    }
}

/// Monotonic state of one socket.
#[derive(Debug)]
pub struct SideState(AtomicU8);

impl SideState {
    pub fn new() -> Self {
        Self(AtomicU8::new(SocketState::Connecting as u8))
    }

    pub fn get(&self) -> SocketState {
        SocketState::from(self.0.load(Ordering::Acquire))
    }

    /// Move forward to `next`. Returns false if the side was already there
    /// or beyond.
    pub fn advance(&self, next: SocketState) -> bool {
        self.0.fetch_max(next as u8, Ordering::AcqRel) < next as u8
    }
}

impl Default for SideState {
    fn default() -> Self {
        Self::new()
    }
}

/// One client ↔ backend relay.
#[derive(Debug)]
pub struct RelaySession {
    id: Uuid,
    pub client: SideState,
    pub backend: SideState,
    to_backend: AtomicU64,
    to_client: AtomicU64,
    faults: AtomicU64,
    started: Instant,
}

impl RelaySession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            client: SideState::new(),
            backend: SideState::new(),
            to_backend: AtomicU64::new(0),
            to_client: AtomicU64::new(0),
            faults: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Both handshakes completed.
    pub fn open(&self) {
        self.client.advance(SocketState::Open);
        self.backend.advance(SocketState::Open);
    }

    pub fn is_closed(&self) -> bool {
        self.client.get() == SocketState::Closed && self.backend.get() == SocketState::Closed
    }

    pub fn count_to_backend(&self) {
        self.to_backend.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_to_client(&self) {
        self.to_client.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count_fault(&self) {
        self.faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frames_to_backend(&self) -> u64 {
        self.to_backend.load(Ordering::Relaxed)
    }

    pub fn frames_to_client(&self) -> u64 {
        self.to_client.load(Ordering::Relaxed)
    }

    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }

    pub fn duration(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for RelaySession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_only_moves_forward() {
        let side = SideState::new();
        assert_eq!(side.get(), SocketState::Connecting);
        assert!(side.advance(SocketState::Open));
        assert!(side.advance(SocketState::Closed));
        assert!(!side.advance(SocketState::Closing));
        assert_eq!(side.get(), SocketState::Closed);
    }

    #[test]
    fn session_closes_when_both_sides_close() {
        let session = RelaySession::new();
        session.open();
        session.client.advance(SocketState::Closed);
        assert!(!session.is_closed());
        session.backend.advance(SocketState::Closed);
        assert!(session.is_closed());
    }
}

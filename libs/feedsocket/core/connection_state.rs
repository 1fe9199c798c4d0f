//! Lock-free connection state and counters

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

/// Supervisor lifecycle state
///
/// `Disconnected → Connecting → Live → Reconnecting → Connecting → ...`
/// ending in `Stopped` (caller) or `Halted` (restart storm / strategy exhausted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Live = 2,
    Reconnecting = 3,
    Stopped = 4,
    Halted = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Live,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Stopped,
            5 => ConnectionState::Halted,
            _ => ConnectionState::Disconnected,
        }
    }

    /// No further automatic activity will happen
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Stopped | ConnectionState::Halted)
    }
}

/// Atomic wrapper around [`ConnectionState`]
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move to `next` unless the current state is terminal. Returns false when refused.
    pub fn advance(&self, next: ConnectionState) -> bool {
        self.0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if ConnectionState::from_u8(current).is_terminal() {
                    None
                } else {
                    Some(next as u8)
                }
            })
            .is_ok()
    }

    #[inline]
    pub fn is_live(&self) -> bool {
        self.get() == ConnectionState::Live
    }
}

/// Counters exposed through [`Metrics`]
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    reconnects: AtomicU64,
    sessions: AtomicU64,
}

impl AtomicMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn increment_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Allocate the next session id (1-based)
    #[inline]
    pub fn next_session(&self) -> u64 {
        self.sessions.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn snapshot(&self, state: ConnectionState) -> Metrics {
        Metrics {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            reconnect_count: self.reconnects.load(Ordering::Relaxed),
            sessions: self.sessions.load(Ordering::Acquire),
            connection_state: state,
        }
    }
}

/// Point-in-time supervisor metrics
#[derive(Debug, Clone)]
pub struct Metrics {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub reconnect_count: u64,
    pub sessions: u64,
    pub connection_state: ConnectionState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_state_is_sticky() {
        let state = AtomicConnectionState::new(ConnectionState::Live);
        assert!(state.advance(ConnectionState::Reconnecting));
        state.set(ConnectionState::Halted);
        assert!(!state.advance(ConnectionState::Connecting));
        assert_eq!(state.get(), ConnectionState::Halted);
    }

    #[test]
    fn test_session_ids_are_sequential() {
        let metrics = AtomicMetrics::new();
        assert_eq!(metrics.next_session(), 1);
        assert_eq!(metrics.next_session(), 2);
        assert_eq!(metrics.snapshot(ConnectionState::Live).sessions, 2);
    }
}

//! Last-seen tracking for the liveness watchdog
//!
//! Every inbound frame (payload, protocol heartbeat, ping/pong) refreshes the
//! timestamp. The watchdog compares it against the idle window; a session
//! that stays silent longer than the window is torn down and reconnected.

use crate::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lock-free last-seen timestamp
///
/// Stored as milliseconds since an epoch taken from the clock at creation so
/// it fits in an atomic u64.
pub struct LivenessTracker {
    clock: Arc<dyn Clock>,
    epoch: Instant,
    last_seen_ms: AtomicU64,
}

impl LivenessTracker {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        let epoch = clock.now();
        Self {
            clock,
            epoch,
            last_seen_ms: AtomicU64::new(0),
        }
    }

    fn now_ms(&self) -> u64 {
        self.clock.now().saturating_duration_since(self.epoch).as_millis() as u64
    }

    /// Something arrived on the wire
    #[inline]
    pub fn record(&self) {
        self.last_seen_ms.store(self.now_ms(), Ordering::Release);
    }

    /// Time since the last recorded frame
    pub fn idle_for(&self) -> Duration {
        let last = self.last_seen_ms.load(Ordering::Acquire);
        Duration::from_millis(self.now_ms().saturating_sub(last))
    }

    /// True once nothing has been seen for at least `window`
    pub fn is_stale(&self, window: Duration) -> bool {
        self.idle_for() >= window
    }
}

//! Restart-storm circuit breaker
//!
//! Each reconnect records a timestamp. When more than `limit` restarts fall
//! inside the trailing `window`, the guard trips and the supervisor halts for
//! good instead of flapping against a broken endpoint.

use crate::{Clock, FeedError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct RestartGuard {
    clock: Arc<dyn Clock>,
    window: Duration,
    limit: usize,
    history: VecDeque<Instant>,
}

impl RestartGuard {
    pub fn new(clock: Arc<dyn Clock>, window: Duration, limit: usize) -> Self {
        Self {
            clock,
            window,
            limit,
            history: VecDeque::with_capacity(limit + 1),
        }
    }

    /// Record a restart and decide whether another connection attempt may happen
    pub fn record_restart(&mut self) -> Result<()> {
        let now = self.clock.now();
        self.history.push_back(now);
        self.expire(now);

        let restarts = self.history.len();
        if restarts > self.limit {
            return Err(FeedError::RestartStorm {
                restarts,
                window: self.window,
            });
        }
        Ok(())
    }

    /// Restarts currently inside the window
    pub fn recent(&mut self) -> usize {
        let now = self.clock.now();
        self.expire(now);
        self.history.len()
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&oldest) = self.history.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }
        // history never needs more than limit + 1 entries to decide
        while self.history.len() > self.limit + 1 {
            self.history.pop_front();
        }
    }
}

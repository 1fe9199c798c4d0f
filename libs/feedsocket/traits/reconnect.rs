use std::time::Duration;

/// Backoff policy applied between a dropped session and the next connect
///
/// The supervisor asks for a delay before every reconnection attempt.
/// Returning `None` ends the supervisor loop the same way a restart storm does,
/// except that it is reported as a transport failure rather than a storm.
pub trait ReconnectionStrategy: Send + Sync {
    /// Delay before reconnection attempt `attempt` (1-based, reset after a session goes live)
    fn next_delay(&self, attempt: u32) -> Option<Duration>;
}

impl<S: ReconnectionStrategy + ?Sized> ReconnectionStrategy for Box<S> {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        (**self).next_delay(attempt)
    }
}

/// Fixed pause between attempts. This is the default policy.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl FixedDelay {
    /// `max_attempts = None` retries until the restart-storm guard trips
    pub fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self { delay, max_attempts }
    }
}

impl ReconnectionStrategy for FixedDelay {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }
        Some(self.delay)
    }
}

/// Doubling backoff: `initial * 2^(attempt-1)`, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<u32>,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if self.max_attempts.is_some_and(|max| attempt > max) {
            return None;
        }

        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay);
        Some(delay.min(self.max_delay))
    }
}

/// Never reconnect; the first dropped session ends the supervisor
#[derive(Debug, Clone)]
pub struct NeverReconnect;

impl ReconnectionStrategy for NeverReconnect {
    fn next_delay(&self, _attempt: u32) -> Option<Duration> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_respects_max() {
        let strategy = FixedDelay::new(Duration::from_secs(2), Some(2));
        assert_eq!(strategy.next_delay(1), Some(Duration::from_secs(2)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_secs(2)));
        assert_eq!(strategy.next_delay(3), None);
    }

    #[test]
    fn test_exponential_doubles_from_first_attempt() {
        let strategy =
            ExponentialBackoff::new(Duration::from_millis(250), Duration::from_secs(60), None);
        assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(250)));
        assert_eq!(strategy.next_delay(2), Some(Duration::from_millis(500)));
        assert_eq!(strategy.next_delay(4), Some(Duration::from_millis(2000)));
    }
}

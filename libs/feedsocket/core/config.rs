use crate::{FeedError, Result};
use std::time::Duration;

/// Tunables for one supervised connection
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Tear the session down when nothing arrives for this long
    pub idle_timeout: Duration,

    /// How often the watchdog looks at the last-seen timestamp
    pub liveness_check_interval: Duration,

    /// Pause between a dropped session and the next connect (default fixed strategy)
    pub reconnect_delay: Duration,

    /// Trailing window used by the restart-storm guard
    pub storm_window: Duration,

    /// Restarts tolerated inside `storm_window`; one more halts the supervisor
    pub storm_limit: usize,

    /// Upper bound on dial + handshake
    pub connect_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(100),
            liveness_check_interval: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(5),
            storm_window: Duration::from_secs(300),
            storm_limit: 10,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.idle_timeout.is_zero() {
            return Err(FeedError::Configuration("idle_timeout must be > 0".into()));
        }
        if self.liveness_check_interval.is_zero() {
            return Err(FeedError::Configuration(
                "liveness_check_interval must be > 0".into(),
            ));
        }
        if self.liveness_check_interval > self.idle_timeout {
            return Err(FeedError::Configuration(
                "liveness_check_interval must not exceed idle_timeout".into(),
            ));
        }
        if self.storm_window.is_zero() {
            return Err(FeedError::Configuration("storm_window must be > 0".into()));
        }
        if self.connect_timeout.is_zero() {
            return Err(FeedError::Configuration("connect_timeout must be > 0".into()));
        }
        Ok(())
    }
}

//! Session timers: client heartbeat, liveness watchdog and stop-aware sleeps
//!
//! ```text
//! ┌─────────────────────┐
//! │  Heartbeat Task     │   every interval: build ping, lock writer, send
//! │  (tokio spawn)      │ ──────────────────────────────────────────────> WebSocket
//! └─────────────────────┘
//! ┌─────────────────────┐
//! │  Liveness Task      │   every check interval: last-seen older than idle window?
//! │  (tokio spawn)      │ ──> idle duration published, reader ends the session
//! └─────────────────────┘
//! ```
//!
//! Both tasks exit on the session's stop signal and are awaited, never aborted.
//! A failed heartbeat write is reported but never ends the session; silence on
//! the inbound side is what the watchdog acts on.

use crate::core::liveness::LivenessTracker;
use crate::{ErrorCallback, FrameWriter, WsMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::debug;

/// Writer slot shared by the control path, the heartbeat task and ping replies
pub(crate) type WriterSlot = Arc<Mutex<Option<Box<dyn FrameWriter>>>>;

fn skipping_interval(period: Duration) -> Interval {
    let mut ticker = tokio::time::interval(period);
    // If we miss ticks due to slow processing, skip them rather than bursting
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Send a freshly built heartbeat through the shared writer every `interval`
/// until `stop` fires
///
/// The first beat goes out one full interval after the session opens.
pub(crate) async fn heartbeat_task<F>(
    interval: Duration,
    frame: F,
    writer: WriterSlot,
    on_error: ErrorCallback,
    mut stop: watch::Receiver<bool>,
) where
    F: Fn() -> Option<WsMessage> + Send + 'static,
{
    let mut ticker = skipping_interval(interval);
    ticker.tick().await;

    debug!("[Heartbeat] Started with interval {:?}", interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        if *stop.borrow() {
            break;
        }
        let Some(frame) = frame() else {
            continue;
        };

        let mut slot = writer.lock().await;
        let Some(writer) = slot.as_mut() else {
            debug!("[Heartbeat] Writer gone, exiting");
            break;
        };
        if let Err(e) = writer.send(frame).await {
            on_error(e);
        }
    }
    debug!("[Heartbeat] Stopped");
}

/// Periodic idle check against a [`LivenessTracker`]
pub(crate) struct LivenessWatchdog {
    liveness: Arc<LivenessTracker>,
    idle_timeout: Duration,
    ticker: Interval,
}

impl LivenessWatchdog {
    pub(crate) fn new(
        liveness: Arc<LivenessTracker>,
        idle_timeout: Duration,
        check_interval: Duration,
    ) -> Self {
        Self {
            liveness,
            idle_timeout,
            ticker: skipping_interval(check_interval),
        }
    }

    /// Resolves with the idle duration once the session has been silent for
    /// at least the idle window. Cancel-safe.
    pub(crate) async fn expired(&mut self) -> Duration {
        loop {
            self.ticker.tick().await;
            if self.liveness.is_stale(self.idle_timeout) {
                return self.liveness.idle_for();
            }
        }
    }
}

/// Run a watchdog until the session goes stale or `stop` fires
///
/// On expiry the idle duration is published on `expired`.
pub(crate) async fn liveness_task(
    mut watchdog: LivenessWatchdog,
    mut stop: watch::Receiver<bool>,
    expired: watch::Sender<Option<Duration>>,
) {
    tokio::select! {
        idle = watchdog.expired() => {
            let _ = expired.send(Some(idle));
        }
        _ = stop.changed() => debug!("[Liveness] Stopped"),
    }
}

/// Sleep for `delay` unless the stop signal fires first
///
/// Returns true when stopped.
pub async fn sleep_or_stop(stop: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => *stop.borrow(),
        _ = stop.changed() => true,
    }
}

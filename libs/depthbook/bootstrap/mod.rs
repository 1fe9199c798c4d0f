//! # Snapshot bootstrapper
//!
//! Fetches a full snapshot for one instrument, installs it and replays the
//! deltas buffered meanwhile. The fetch runs on the blocking pool with no lock
//! held; only the install step takes the instrument's lock.
//!
//! Attempts are bounded. When they run out the instrument is halted and a
//! fatal [`DepthError::BootstrapExhausted`] is reported; other instruments keep
//! running.

pub mod source;

pub use source::SnapshotSource;

use crate::domain::{BookSnapshot, InstrumentKey, PriceScale};
use crate::error::{DepthError, DepthErrorCallback};
use crate::sequencer::Sequencer;
use crate::store::{BookStore, SyncState};
use feedsocket::sleep_or_stop;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const DEFAULT_BOOTSTRAP_ATTEMPTS: u32 = 5;
pub const DEFAULT_BOOTSTRAP_RETRY_DELAY: Duration = Duration::from_secs(1);

/// How a bootstrap run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Snapshot installed and the buffer replayed; book readable at `sequence`
    ///
    /// `applied` counts replayed deltas; `event_time_ms` is the last one's.
    Installed {
        sequence: u64,
        applied: usize,
        event_time_ms: i64,
    },
    /// Attempts exhausted; the instrument is halted
    Halted,
    /// Stopped, or the instrument was unsubscribed while fetching
    Cancelled,
}

enum Fetched {
    Snapshot(BookSnapshot),
    Exhausted,
    Cancelled,
}

/// Bounded-retry snapshot fetcher
pub struct Bootstrapper {
    source: Arc<dyn SnapshotSource>,
    scale: PriceScale,
    attempts: u32,
    retry_delay: Duration,
    on_error: DepthErrorCallback,
}

impl Bootstrapper {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        scale: PriceScale,
        attempts: u32,
        retry_delay: Duration,
        on_error: DepthErrorCallback,
    ) -> Self {
        Self {
            source,
            scale,
            attempts: attempts.max(1),
            retry_delay,
            on_error,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Bootstrap `instrument` until its book is readable, halted or cancelled
    ///
    /// A gap found while replaying the buffer starts another fetch in the
    /// same run.
    pub async fn run(
        &self,
        store: &BookStore,
        sequencer: &Sequencer,
        instrument: &InstrumentKey,
        wire_symbol: &str,
        limit: usize,
        mut stop: watch::Receiver<bool>,
    ) -> BootstrapOutcome {
        let Some(shared) = store.get(instrument) else {
            return BootstrapOutcome::Cancelled;
        };

        loop {
            let snapshot = match self.fetch(instrument, wire_symbol, limit, &mut stop).await {
                Fetched::Snapshot(snapshot) => snapshot,
                Fetched::Cancelled => return BootstrapOutcome::Cancelled,
                Fetched::Exhausted => {
                    if !store.is_current(instrument, &shared) {
                        return BootstrapOutcome::Cancelled;
                    }
                    {
                        let mut state = shared.lock();
                        state.sync = SyncState::Halted;
                        state.pending.clear();
                        state.bootstrap_in_flight = false;
                        state.book.clear();
                        state.touch();
                    }
                    error!(
                        "[Bootstrap {}] Giving up after {} attempts, instrument halted",
                        instrument, self.attempts
                    );
                    (self.on_error)(DepthError::BootstrapExhausted {
                        instrument: instrument.clone(),
                        attempts: self.attempts,
                    });
                    return BootstrapOutcome::Halted;
                }
            };

            // late result after stop or unsubscribe
            if *stop.borrow() || !store.is_current(instrument, &shared) {
                debug!("[Bootstrap {}] Discarding snapshot {}", instrument, snapshot.sequence);
                return BootstrapOutcome::Cancelled;
            }

            let (report, sync, event_time_ms) = {
                let mut state = shared.lock();
                let report = sequencer.install_snapshot(&mut state, &snapshot);
                (report, state.sync, state.event_time_ms)
            };

            if let Some(gap) = report.gap {
                (self.on_error)(gap.into_error(instrument.clone()));
            }
            if report.trigger_bootstrap {
                continue;
            }

            return match sync.cursor() {
                Some(sequence) => BootstrapOutcome::Installed {
                    sequence,
                    applied: report.applied,
                    event_time_ms,
                },
                // another run owns the resync
                None => BootstrapOutcome::Cancelled,
            };
        }
    }

    async fn fetch(
        &self,
        instrument: &InstrumentKey,
        wire_symbol: &str,
        limit: usize,
        stop: &mut watch::Receiver<bool>,
    ) -> Fetched {
        for attempt in 1..=self.attempts {
            if *stop.borrow() {
                return Fetched::Cancelled;
            }

            let source = self.source.clone();
            let symbol = wire_symbol.to_string();
            let scale = self.scale;
            let result = tokio::task::spawn_blocking(move || source.fetch(&symbol, limit))
                .await
                .map_err(|e| DepthError::Snapshot(format!("snapshot task failed: {}", e)))
                .and_then(|fetched| fetched)
                .and_then(|snapshot| snapshot.into_book(scale));

            match result {
                Ok(snapshot) => {
                    info!(
                        "[Bootstrap {}] Snapshot {} fetched ({} bids, {} asks)",
                        instrument,
                        snapshot.sequence,
                        snapshot.bids.len(),
                        snapshot.asks.len()
                    );
                    return Fetched::Snapshot(snapshot);
                }
                Err(e) => {
                    warn!(
                        "[Bootstrap {}] Attempt {}/{} failed: {}",
                        instrument, attempt, self.attempts, e
                    );
                    (self.on_error)(DepthError::BootstrapFailed {
                        instrument: instrument.clone(),
                        attempt,
                        reason: e.to_string(),
                    });
                }
            }

            if attempt < self.attempts && sleep_or_stop(stop, self.retry_delay).await {
                return Fetched::Cancelled;
            }
        }
        Fetched::Exhausted
    }
}

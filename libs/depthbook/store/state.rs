//! Per-instrument owned state

use super::book::OrderBook;
use crate::domain::{BookSnapshot, Depth, DepthDelta, InstrumentKey, PriceScale};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Where an instrument is in the bootstrap/apply cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No baseline: deltas are buffered until a snapshot lands
    Unsynced,
    /// Snapshot installed; the next newer delta must bridge it
    Bridging { snapshot_seq: u64 },
    /// Cursor established; deltas must continue it
    Synced { cursor: u64 },
    /// Bootstrap exhausted; deltas are dropped
    Halted,
}

impl SyncState {
    /// Last sequence incorporated into the book, if any
    pub fn cursor(self) -> Option<u64> {
        match self {
            SyncState::Bridging { snapshot_seq } => Some(snapshot_seq),
            SyncState::Synced { cursor } => Some(cursor),
            SyncState::Unsynced | SyncState::Halted => None,
        }
    }

    /// Book holds a bootstrapped baseline and may be read
    pub fn is_readable(self) -> bool {
        self.cursor().is_some()
    }
}

/// Externally visible instrument status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentStatus {
    /// Subscribed, never bootstrapped
    Pending,
    /// Bootstrapped before, currently waiting on a new snapshot
    Resyncing,
    /// Readable at the given sequence
    Live { sequence: u64 },
    /// Bootstrap exhausted
    Halted,
}

/// Counters kept per instrument
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstrumentStats {
    pub deltas_applied: u64,
    pub deltas_skipped: u64,
    pub deltas_dropped: u64,
    pub gaps: u64,
    pub bootstraps: u64,
    pub buffer_overflows: u64,
}

/// Everything owned by one subscribed instrument
///
/// Always accessed under the instrument's own lock.
#[derive(Debug)]
pub struct InstrumentState {
    pub instrument: InstrumentKey,
    pub book: OrderBook,
    pub sync: SyncState,
    /// Deltas waiting for a baseline, in arrival order
    pub pending: VecDeque<DepthDelta>,
    /// A bootstrap task is running (or about to be spawned)
    pub bootstrap_in_flight: bool,
    /// Set once the first snapshot lands; distinguishes Pending from Resyncing
    pub bootstrapped_once: bool,
    pub event_time_ms: i64,
    pub updated_at: DateTime<Utc>,
    pub stats: InstrumentStats,
}

impl InstrumentState {
    pub fn new(instrument: InstrumentKey, prune_threshold: f64) -> Self {
        Self {
            instrument,
            book: OrderBook::new(prune_threshold),
            sync: SyncState::Unsynced,
            pending: VecDeque::new(),
            bootstrap_in_flight: false,
            bootstrapped_once: false,
            event_time_ms: 0,
            updated_at: Utc::now(),
            stats: InstrumentStats::default(),
        }
    }

    pub fn status(&self) -> InstrumentStatus {
        match self.sync {
            SyncState::Halted => InstrumentStatus::Halted,
            SyncState::Bridging { snapshot_seq: sequence } | SyncState::Synced { cursor: sequence } => {
                InstrumentStatus::Live { sequence }
            }
            SyncState::Unsynced if self.bootstrapped_once => InstrumentStatus::Resyncing,
            SyncState::Unsynced => InstrumentStatus::Pending,
        }
    }

    /// Replace the book wholesale with a snapshot and wait for the bridging delta
    ///
    /// Pending deltas are left untouched; replaying them is the sequencer's job.
    pub fn install(&mut self, snapshot: &BookSnapshot) {
        self.book.replace(snapshot);
        self.sync = SyncState::Bridging {
            snapshot_seq: snapshot.sequence,
        };
        self.bootstrap_in_flight = false;
        self.bootstrapped_once = true;
        self.event_time_ms = 0;
        self.stats.bootstraps += 1;
        self.touch();
    }

    /// Drop the baseline; the next snapshot rebuilds it
    pub fn invalidate(&mut self) {
        self.book.clear();
        self.sync = SyncState::Unsynced;
        self.event_time_ms = 0;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Build the read model; `None` while no baseline exists
    pub fn depth(&self, scale: PriceScale) -> Option<Depth> {
        let sequence = self.sync.cursor()?;
        Some(Depth {
            instrument: self.instrument.clone(),
            bids: self.book.bid_levels(scale),
            asks: self.book.ask_levels(scale),
            sequence,
            event_time_ms: self.event_time_ms,
            updated_at: self.updated_at,
        })
    }
}

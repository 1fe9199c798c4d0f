//! # Delta sequencer
//!
//! Validates each delta against the instrument's cursor and applies it, or
//! buffers it while no baseline exists. Every decision is made under the
//! instrument's lock, so one instrument's deltas are applied strictly in
//! arrival order.
//!
//! ```text
//!   Unsynced ──snapshot──► Bridging{snap} ──bridging delta──► Synced{cursor}
//!      ▲                        │                                  │
//!      └─────────── gap ────────┴──────────────── gap ─────────────┘
//!   bootstrap exhausted ──► Halted
//! ```
//!
//! The sequencer never does I/O. When an outcome carries
//! `trigger_bootstrap: true` the caller must start exactly one bootstrap.

pub mod continuity;

pub use continuity::{ChecksumRule, ContinuityRule, PrevSeqRule, StartSeqRule};

use crate::domain::{BookSnapshot, DepthDelta, InstrumentKey};
use crate::error::DepthError;
use crate::store::{InstrumentState, SyncState};
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_PENDING_DELTAS: usize = 10_000;

/// Why a delta broke the book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discontinuity {
    Sequence { expected: u64, got: u64 },
    Checksum { sequence: u64 },
}

impl Discontinuity {
    /// Informational error reported for this discontinuity
    pub fn into_error(self, instrument: InstrumentKey) -> DepthError {
        match self {
            Discontinuity::Sequence { expected, got } => DepthError::SequenceGap {
                instrument,
                expected,
                got,
            },
            Discontinuity::Checksum { sequence } => DepthError::ChecksumMismatch {
                instrument,
                sequence,
            },
        }
    }
}

/// What `on_delta` did with a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOutcome {
    /// Applied; the cursor is now `sequence`
    Applied { sequence: u64 },
    /// Already contained in the installed snapshot
    Skipped,
    /// Held until a snapshot lands
    Buffered { trigger_bootstrap: bool },
    /// Baseline discarded; a resync is needed
    Gap {
        discontinuity: Discontinuity,
        trigger_bootstrap: bool,
    },
    /// Instrument is halted
    Dropped,
}

impl DeltaOutcome {
    pub fn triggers_bootstrap(&self) -> bool {
        matches!(
            self,
            DeltaOutcome::Buffered { trigger_bootstrap: true }
                | DeltaOutcome::Gap { trigger_bootstrap: true, .. }
        )
    }
}

/// Result of replaying the pending buffer after a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayReport {
    pub applied: usize,
    pub skipped: usize,
    /// Continuity broke during replay; remaining deltas stay pending
    pub gap: Option<Discontinuity>,
    pub trigger_bootstrap: bool,
}

/// Stateless decision logic; all state lives in [`InstrumentState`]
pub struct Sequencer {
    continuity: Box<dyn ContinuityRule>,
    checksum: Option<Box<dyn ChecksumRule>>,
    max_pending: usize,
}

impl Sequencer {
    pub fn new(continuity: Box<dyn ContinuityRule>, max_pending: usize) -> Self {
        Self {
            continuity,
            checksum: None,
            max_pending: max_pending.max(1),
        }
    }

    pub fn with_checksum(mut self, checksum: Option<Box<dyn ChecksumRule>>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn continuity(&self) -> &dyn ContinuityRule {
        self.continuity.as_ref()
    }

    /// Route one delta through the instrument's sync state
    pub fn on_delta(&self, state: &mut InstrumentState, delta: DepthDelta) -> DeltaOutcome {
        match state.sync {
            SyncState::Halted => {
                state.stats.deltas_dropped += 1;
                DeltaOutcome::Dropped
            }
            SyncState::Unsynced => self.buffer(state, delta),
            SyncState::Bridging { snapshot_seq } => {
                if delta.final_seq <= snapshot_seq {
                    state.stats.deltas_skipped += 1;
                    debug!(
                        "[Sequencer {}] Skipping {}..={} (snapshot {})",
                        state.instrument, delta.first_seq, delta.final_seq, snapshot_seq
                    );
                    return DeltaOutcome::Skipped;
                }
                if self.continuity.bridges(snapshot_seq, &delta) {
                    self.apply(state, delta)
                } else {
                    let discontinuity = Discontinuity::Sequence {
                        expected: self.continuity.expected(snapshot_seq),
                        got: self.continuity.observed(&delta),
                    };
                    self.gap(state, discontinuity)
                }
            }
            SyncState::Synced { cursor } => {
                if self.continuity.follows(cursor, &delta) {
                    self.apply(state, delta)
                } else {
                    let discontinuity = Discontinuity::Sequence {
                        expected: self.continuity.expected(cursor),
                        got: self.continuity.observed(&delta),
                    };
                    self.gap(state, discontinuity)
                }
            }
        }
    }

    /// Install a snapshot and replay the pending buffer through the usual rules
    pub fn install_snapshot(&self, state: &mut InstrumentState, snapshot: &BookSnapshot) -> ReplayReport {
        state.install(snapshot);
        let mut report = ReplayReport::default();

        let mut pending = std::mem::take(&mut state.pending).into_iter();
        while let Some(delta) = pending.next() {
            match self.on_delta(state, delta) {
                DeltaOutcome::Applied { .. } => report.applied += 1,
                DeltaOutcome::Skipped => report.skipped += 1,
                DeltaOutcome::Gap {
                    discontinuity,
                    trigger_bootstrap,
                } => {
                    report.gap = Some(discontinuity);
                    report.trigger_bootstrap = trigger_bootstrap;
                    state.pending.extend(pending.by_ref());
                    break;
                }
                DeltaOutcome::Buffered { .. } | DeltaOutcome::Dropped => {}
            }
        }

        info!(
            "[Sequencer {}] Snapshot {} installed: replayed {}, skipped {}{}",
            state.instrument,
            snapshot.sequence,
            report.applied,
            report.skipped,
            if report.gap.is_some() { ", gap during replay" } else { "" }
        );
        report
    }

    fn buffer(&self, state: &mut InstrumentState, delta: DepthDelta) -> DeltaOutcome {
        if state.pending.len() >= self.max_pending {
            warn!(
                "[Sequencer {}] Pending buffer full ({}), dropping it",
                state.instrument, self.max_pending
            );
            state.pending.clear();
            state.stats.buffer_overflows += 1;
        }
        state.pending.push_back(delta);

        let trigger_bootstrap = !state.bootstrap_in_flight;
        state.bootstrap_in_flight = true;
        DeltaOutcome::Buffered { trigger_bootstrap }
    }

    fn apply(&self, state: &mut InstrumentState, delta: DepthDelta) -> DeltaOutcome {
        state.book.apply_all(&delta.bids, &delta.asks);

        if let (Some(rule), Some(expected)) = (&self.checksum, delta.checksum) {
            if !rule.verify(&state.book, expected) {
                return self.gap(
                    state,
                    Discontinuity::Checksum {
                        sequence: delta.final_seq,
                    },
                );
            }
        }

        state.sync = SyncState::Synced {
            cursor: delta.final_seq,
        };
        state.event_time_ms = delta.event_time_ms;
        state.stats.deltas_applied += 1;
        state.touch();
        DeltaOutcome::Applied {
            sequence: delta.final_seq,
        }
    }

    fn gap(&self, state: &mut InstrumentState, discontinuity: Discontinuity) -> DeltaOutcome {
        info!("[Sequencer {}] Resync needed: {:?}", state.instrument, discontinuity);
        state.invalidate();
        state.stats.gaps += 1;

        let trigger_bootstrap = !state.bootstrap_in_flight;
        state.bootstrap_in_flight = true;
        DeltaOutcome::Gap {
            discontinuity,
            trigger_bootstrap,
        }
    }
}

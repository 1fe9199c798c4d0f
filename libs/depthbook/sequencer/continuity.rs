//! Per-venue continuity rules

use crate::domain::DepthDelta;
use crate::store::OrderBook;

/// Decides whether a delta continues the book it is applied to
pub trait ContinuityRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Delta directly continues an established cursor
    fn follows(&self, cursor: u64, delta: &DepthDelta) -> bool;

    /// First delta newer than a snapshot connects to it
    fn bridges(&self, snapshot_seq: u64, delta: &DepthDelta) -> bool;

    /// Sequence value reported as "got" when continuity breaks
    fn observed(&self, delta: &DepthDelta) -> u64;

    /// Sequence value reported as "expected" after `cursor`
    fn expected(&self, cursor: u64) -> u64 {
        cursor.saturating_add(1)
    }
}

/// A sequence at `u64::MAX` has no successor, so nothing spans or follows it
fn spans(snapshot_seq: u64, delta: &DepthDelta) -> bool {
    snapshot_seq
        .checked_add(1)
        .is_some_and(|next| delta.first_seq <= next && next <= delta.final_seq)
}

/// Consecutive ranges: `first_seq == cursor + 1`
#[derive(Debug, Clone, Copy, Default)]
pub struct StartSeqRule;

impl ContinuityRule for StartSeqRule {
    fn name(&self) -> &'static str {
        "start-seq"
    }

    fn follows(&self, cursor: u64, delta: &DepthDelta) -> bool {
        cursor.checked_add(1) == Some(delta.first_seq)
    }

    fn bridges(&self, snapshot_seq: u64, delta: &DepthDelta) -> bool {
        spans(snapshot_seq, delta)
    }

    fn observed(&self, delta: &DepthDelta) -> u64 {
        delta.first_seq
    }
}

/// Chained deltas: `prev_seq == cursor`
///
/// Venues like Binance USD-M futures batch several engine updates per event,
/// so only the link to the previous event's final id is reliable.
#[derive(Debug, Clone, Copy, Default)]
pub struct PrevSeqRule;

impl ContinuityRule for PrevSeqRule {
    fn name(&self) -> &'static str {
        "prev-seq"
    }

    fn follows(&self, cursor: u64, delta: &DepthDelta) -> bool {
        delta.prev_seq == Some(cursor)
    }

    fn bridges(&self, snapshot_seq: u64, delta: &DepthDelta) -> bool {
        delta.prev_seq == Some(snapshot_seq) || spans(snapshot_seq, delta)
    }

    fn observed(&self, delta: &DepthDelta) -> u64 {
        delta.prev_seq.unwrap_or(delta.first_seq.saturating_sub(1))
    }

    fn expected(&self, cursor: u64) -> u64 {
        cursor
    }
}

/// Optional book checksum carried by a venue's deltas
pub trait ChecksumRule: Send + Sync {
    /// True if `book` (after applying the delta) matches the published checksum
    fn verify(&self, book: &OrderBook, checksum: i64) -> bool;
}

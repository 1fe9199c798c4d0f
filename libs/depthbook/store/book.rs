//! Per-side price level maps

use crate::domain::{BookSnapshot, Level, LevelUpdate, PriceScale, Side};
use std::collections::BTreeMap;

pub const DEFAULT_PRUNE_THRESHOLD: f64 = 0.30;

/// One side of the book: tick -> quantity
///
/// A zero quantity is a tombstone left by a removal. Tombstones are never
/// returned by reads and are swept once they exceed the prune threshold.
#[derive(Debug, Clone, Default)]
pub struct BookSide {
    levels: BTreeMap<i64, f64>,
    zeros: usize,
}

impl BookSide {
    /// Last write wins; zero removes. Returns true if the side changed.
    pub fn apply(&mut self, ticks: i64, quantity: f64) -> bool {
        if quantity > 0.0 {
            if let Some(previous) = self.levels.insert(ticks, quantity) {
                if previous == 0.0 {
                    self.zeros -= 1;
                }
                return previous != quantity;
            }
            return true;
        }

        match self.levels.get_mut(&ticks) {
            Some(q) if *q > 0.0 => {
                *q = 0.0;
                self.zeros += 1;
                true
            }
            // absent or already removed
            _ => false,
        }
    }

    /// Drop tombstones if they make up more than `threshold` of the entries
    pub fn prune(&mut self, threshold: f64) -> bool {
        if self.zeros == 0 || (self.zeros as f64) <= threshold * self.levels.len() as f64 {
            return false;
        }
        self.levels.retain(|_, q| *q > 0.0);
        self.zeros = 0;
        true
    }

    pub fn clear(&mut self) {
        self.levels.clear();
        self.zeros = 0;
    }

    /// Live quantity at a tick
    pub fn get(&self, ticks: i64) -> Option<f64> {
        self.levels.get(&ticks).copied().filter(|q| *q > 0.0)
    }

    /// Number of live levels
    pub fn len(&self) -> usize {
        self.levels.len() - self.zeros
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored entries including tombstones
    pub fn stored(&self) -> usize {
        self.levels.len()
    }

    pub fn tombstones(&self) -> usize {
        self.zeros
    }

    /// Live levels ascending by price
    pub fn ascending(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.levels.iter().filter(|(_, q)| **q > 0.0).map(|(t, q)| (*t, *q))
    }

    /// Live levels descending by price
    pub fn descending(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.levels.iter().rev().filter(|(_, q)| **q > 0.0).map(|(t, q)| (*t, *q))
    }
}

/// Bid and ask sides of one instrument
#[derive(Debug, Clone)]
pub struct OrderBook {
    pub bids: BookSide,
    pub asks: BookSide,
    prune_threshold: f64,
    prunes: u64,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new(DEFAULT_PRUNE_THRESHOLD)
    }
}

impl OrderBook {
    pub fn new(prune_threshold: f64) -> Self {
        Self {
            bids: BookSide::default(),
            asks: BookSide::default(),
            prune_threshold,
            prunes: 0,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BookSide {
        match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        }
    }

    pub fn side(&self, side: Side) -> &BookSide {
        match side {
            Side::Bid => &self.bids,
            Side::Ask => &self.asks,
        }
    }

    /// Apply one level change, pruning the side when tombstones pile up
    pub fn apply_level(&mut self, side: Side, ticks: i64, quantity: f64) -> bool {
        let threshold = self.prune_threshold;
        let book_side = self.side_mut(side);
        let changed = book_side.apply(ticks, quantity);
        if book_side.prune(threshold) {
            self.prunes += 1;
        }
        changed
    }

    pub fn apply_all(&mut self, bids: &[LevelUpdate], asks: &[LevelUpdate]) {
        for level in bids {
            self.apply_level(Side::Bid, level.ticks, level.quantity);
        }
        for level in asks {
            self.apply_level(Side::Ask, level.ticks, level.quantity);
        }
    }

    /// Install a snapshot wholesale; zero-quantity snapshot levels are skipped
    pub fn replace(&mut self, snapshot: &BookSnapshot) {
        self.clear();
        for level in snapshot.bids.iter().filter(|l| l.quantity > 0.0) {
            self.bids.apply(level.ticks, level.quantity);
        }
        for level in snapshot.asks.iter().filter(|l| l.quantity > 0.0) {
            self.asks.apply(level.ticks, level.quantity);
        }
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Number of prune passes run so far
    pub fn prunes(&self) -> u64 {
        self.prunes
    }

    /// Bids best-first (descending)
    pub fn bid_levels(&self, scale: PriceScale) -> Vec<Level> {
        self.bids.descending().map(|(t, q)| level(scale, t, q)).collect()
    }

    /// Asks best-first (ascending)
    pub fn ask_levels(&self, scale: PriceScale) -> Vec<Level> {
        self.asks.ascending().map(|(t, q)| level(scale, t, q)).collect()
    }
}

fn level(scale: PriceScale, ticks: i64, quantity: f64) -> Level {
    Level {
        price: scale.to_price(ticks),
        ticks,
        quantity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_write_wins() {
        let mut side = BookSide::default();
        assert!(side.apply(100, 1.0));
        assert!(side.apply(100, 2.5));
        assert!(!side.apply(100, 2.5));
        assert_eq!(side.get(100), Some(2.5));
        assert_eq!(side.len(), 1);
    }

    #[test]
    fn test_zero_removal_is_idempotent() {
        let mut side = BookSide::default();
        side.apply(100, 1.0);
        side.apply(101, 1.0);
        side.apply(102, 1.0);
        side.apply(103, 1.0);

        assert!(side.apply(100, 0.0));
        let after_once: Vec<_> = side.ascending().collect();
        assert!(!side.apply(100, 0.0));
        let after_twice: Vec<_> = side.ascending().collect();

        assert_eq!(after_once, after_twice);
        assert_eq!(side.get(100), None);
        assert_eq!(side.tombstones(), 1);
    }

    #[test]
    fn test_removing_absent_level_is_noop() {
        let mut side = BookSide::default();
        assert!(!side.apply(42, 0.0));
        assert_eq!(side.stored(), 0);
    }

    #[test]
    fn test_reinserting_tombstone_revives_level() {
        let mut side = BookSide::default();
        side.apply(1, 1.0);
        side.apply(2, 1.0);
        side.apply(3, 1.0);
        side.apply(4, 1.0);
        side.apply(1, 0.0);
        assert_eq!(side.tombstones(), 1);

        side.apply(1, 4.0);
        assert_eq!(side.tombstones(), 0);
        assert_eq!(side.get(1), Some(4.0));
    }

    #[test]
    fn test_prune_runs_above_threshold_only() {
        let mut book = OrderBook::new(0.30);
        for tick in 0..10 {
            book.apply_level(Side::Bid, tick, 1.0);
        }

        // 3 of 10 is not above 0.30
        for tick in 0..3 {
            book.apply_level(Side::Bid, tick, 0.0);
        }
        assert_eq!(book.bids.tombstones(), 3);
        assert_eq!(book.bids.stored(), 10);
        assert_eq!(book.prunes(), 0);

        // 4 of 10 is
        book.apply_level(Side::Bid, 3, 0.0);
        assert_eq!(book.bids.tombstones(), 0);
        assert_eq!(book.bids.stored(), 6);
        assert_eq!(book.prunes(), 1);
        assert_eq!(book.bids.len(), 6);
    }

    #[test]
    fn test_read_order() {
        let mut book = OrderBook::default();
        book.apply_all(
            &[LevelUpdate::new(9_990, 1.0), LevelUpdate::new(10_000, 2.0)],
            &[LevelUpdate::new(10_020, 1.0), LevelUpdate::new(10_010, 3.0)],
        );
        let scale = PriceScale::new(2).unwrap();

        let bids: Vec<i64> = book.bid_levels(scale).iter().map(|l| l.ticks).collect();
        let asks: Vec<i64> = book.ask_levels(scale).iter().map(|l| l.ticks).collect();
        assert_eq!(bids, vec![10_000, 9_990]);
        assert_eq!(asks, vec![10_010, 10_020]);
        assert_eq!(book.bid_levels(scale)[0].price.to_string(), "100");
    }

    #[test]
    fn test_replace_discards_previous_levels() {
        let mut book = OrderBook::default();
        book.apply_level(Side::Bid, 5, 1.0);
        book.replace(&BookSnapshot {
            sequence: 10,
            bids: vec![LevelUpdate::new(7, 1.0), LevelUpdate::new(8, 0.0)],
            asks: vec![LevelUpdate::new(9, 2.0)],
        });
        assert_eq!(book.bids.get(5), None);
        assert_eq!(book.bids.get(7), Some(1.0));
        assert_eq!(book.bids.stored(), 1);
        assert_eq!(book.asks.get(9), Some(2.0));
    }
}

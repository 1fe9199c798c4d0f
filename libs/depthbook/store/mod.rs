//! # Price-level store
//!
//! One [`InstrumentState`] per subscribed instrument, each behind its own
//! `parking_lot::Mutex`, held in a `DashMap` so unrelated instruments never
//! contend. Reads copy the book out under the lock, so a [`Depth`] is always a
//! consistent point-in-time view.

pub mod book;
pub mod state;

pub use book::{BookSide, OrderBook, DEFAULT_PRUNE_THRESHOLD};
pub use state::{InstrumentState, InstrumentStats, InstrumentStatus, SyncState};

use crate::domain::{BookSnapshot, Depth, InstrumentKey, PriceScale, Side};
use crate::error::{DepthError, Result};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared handle to one instrument's state
pub type SharedState = Arc<Mutex<InstrumentState>>;

/// Concurrent map of per-instrument books
pub struct BookStore {
    books: DashMap<InstrumentKey, SharedState>,
    scale: PriceScale,
    prune_threshold: f64,
}

impl BookStore {
    pub fn new(scale: PriceScale, prune_threshold: f64) -> Self {
        Self {
            books: DashMap::new(),
            scale,
            prune_threshold,
        }
    }

    pub fn scale(&self) -> PriceScale {
        self.scale
    }

    /// Create an empty book, or return the existing one
    ///
    /// The flag is true when the book was created by this call.
    pub fn insert(&self, instrument: &InstrumentKey) -> (SharedState, bool) {
        let mut created = false;
        let state = self
            .books
            .entry(instrument.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(InstrumentState::new(
                    instrument.clone(),
                    self.prune_threshold,
                )))
            })
            .clone();
        (state, created)
    }

    pub fn get(&self, instrument: &InstrumentKey) -> Option<SharedState> {
        self.books.get(instrument).map(|entry| entry.value().clone())
    }

    /// Discard an instrument's book
    pub fn remove(&self, instrument: &InstrumentKey) -> Option<SharedState> {
        self.books.remove(instrument).map(|(_, state)| state)
    }

    /// True if `state` is still the live book for `instrument`
    ///
    /// Lets late bootstrap results detect an unsubscribe (or re-subscribe) that
    /// happened while they were in flight.
    pub fn is_current(&self, instrument: &InstrumentKey, state: &SharedState) -> bool {
        self.books
            .get(instrument)
            .map(|entry| Arc::ptr_eq(entry.value(), state))
            .unwrap_or(false)
    }

    fn require(&self, instrument: &InstrumentKey) -> Result<SharedState> {
        self.get(instrument)
            .ok_or_else(|| DepthError::UnknownInstrument(instrument.to_string()))
    }

    /// Consistent copy of the book
    pub fn snapshot(&self, instrument: &InstrumentKey) -> Result<Depth> {
        let shared = self.require(instrument)?;
        let state = shared.lock();
        if state.sync == SyncState::Halted {
            return Err(DepthError::Halted(instrument.clone()));
        }
        state
            .depth(self.scale)
            .ok_or_else(|| DepthError::NotReady(instrument.clone()))
    }

    pub fn status(&self, instrument: &InstrumentKey) -> Result<InstrumentStatus> {
        Ok(self.require(instrument)?.lock().status())
    }

    pub fn stats(&self, instrument: &InstrumentKey) -> Result<InstrumentStats> {
        Ok(self.require(instrument)?.lock().stats)
    }

    /// Apply a single level change outside of the sequencer
    pub fn apply_level(
        &self,
        instrument: &InstrumentKey,
        side: Side,
        ticks: i64,
        quantity: f64,
    ) -> Result<bool> {
        let shared = self.require(instrument)?;
        let mut state = shared.lock();
        let changed = state.book.apply_level(side, ticks, quantity);
        if changed {
            state.touch();
        }
        Ok(changed)
    }

    /// Install a snapshot wholesale; buffered deltas are not replayed
    pub fn replace(&self, instrument: &InstrumentKey, snapshot: &BookSnapshot) -> Result<()> {
        self.require(instrument)?.lock().install(snapshot);
        Ok(())
    }

    /// Subscribed instruments, sorted
    pub fn keys(&self) -> Vec<InstrumentKey> {
        let mut keys: Vec<_> = self.books.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }

    /// Discard every book
    pub fn clear(&self) {
        self.books.clear();
    }
}

//! Wire-neutral depth updates and snapshots

use super::ticks::{parse_quantity, PriceScale};
use crate::error::DepthError;
use serde::{Deserialize, Serialize};

/// Book side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
}

/// One level change: quantity zero removes the level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelUpdate {
    pub ticks: i64,
    pub quantity: f64,
}

impl LevelUpdate {
    pub fn new(ticks: i64, quantity: f64) -> Self {
        Self { ticks, quantity }
    }

    /// Parse a `[price, quantity]` string pair
    pub fn parse(scale: PriceScale, price: &str, quantity: &str) -> Result<Self, DepthError> {
        Ok(Self {
            ticks: scale.to_ticks(price)?,
            quantity: parse_quantity(quantity)?,
        })
    }
}

/// Parse a list of `[price, quantity]` pairs as sent by every shipped venue
pub fn parse_levels(scale: PriceScale, levels: &[[String; 2]]) -> Result<Vec<LevelUpdate>, DepthError> {
    levels
        .iter()
        .map(|[price, quantity]| LevelUpdate::parse(scale, price, quantity))
        .collect()
}

/// Incremental depth update decoded from a venue frame
///
/// `first_seq..=final_seq` is the range of venue update ids folded into this
/// delta. `prev_seq` is set by venues that chain deltas by the previous
/// delta's final id instead of consecutive ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthDelta {
    /// Venue wire symbol the delta was published for
    pub symbol: String,
    pub first_seq: u64,
    pub final_seq: u64,
    pub prev_seq: Option<u64>,
    pub bids: Vec<LevelUpdate>,
    pub asks: Vec<LevelUpdate>,
    pub event_time_ms: i64,
    /// Book checksum after applying this delta, for venues that publish one
    pub checksum: Option<i64>,
}

/// Price level as returned by a snapshot endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: String,
    pub quantity: String,
}

impl PriceLevel {
    pub fn new(price: impl Into<String>, quantity: impl Into<String>) -> Self {
        Self {
            price: price.into(),
            quantity: quantity.into(),
        }
    }
}

impl From<[String; 2]> for PriceLevel {
    fn from([price, quantity]: [String; 2]) -> Self {
        Self { price, quantity }
    }
}

/// Full depth snapshot as returned by the snapshot collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSnapshot {
    /// Venue update id the snapshot is consistent with
    pub sequence: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

impl DepthSnapshot {
    /// Convert price strings to ticks; any malformed level rejects the snapshot
    pub fn into_book(self, scale: PriceScale) -> Result<BookSnapshot, DepthError> {
        let convert = |levels: Vec<PriceLevel>| -> Result<Vec<LevelUpdate>, DepthError> {
            levels
                .iter()
                .map(|l| LevelUpdate::parse(scale, &l.price, &l.quantity))
                .collect()
        };
        Ok(BookSnapshot {
            sequence: self.sequence,
            bids: convert(self.bids)?,
            asks: convert(self.asks)?,
        })
    }
}

/// Snapshot with prices already converted to ticks
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    pub sequence: u64,
    pub bids: Vec<LevelUpdate>,
    pub asks: Vec<LevelUpdate>,
}

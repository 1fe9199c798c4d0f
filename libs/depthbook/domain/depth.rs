//! Point-in-time book read model

use super::instrument::InstrumentKey;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

// =============================================================================
// Level - Basic unit of the read model
// =============================================================================

/// One live price level
#[derive(Debug, Clone, PartialEq)]
pub struct Level {
    pub price: Decimal,
    pub ticks: i64,
    pub quantity: f64,
}

// =============================================================================
// Depth - Consistent snapshot of one instrument's book
// =============================================================================

/// Consistent copy of one instrument's book
///
/// Bids are sorted descending (best first), asks ascending (best first).
/// Never contains zero-quantity levels.
#[derive(Debug, Clone, PartialEq)]
pub struct Depth {
    pub instrument: InstrumentKey,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
    /// Last applied venue update id
    pub sequence: u64,
    /// Venue event time of the last applied delta (snapshot: 0 until a delta lands)
    pub event_time_ms: i64,
    /// Local time of the last mutation
    pub updated_at: DateTime<Utc>,
}

impl Depth {
    /// Best bid (highest buy price)
    #[inline]
    pub fn best_bid(&self) -> Option<&Level> {
        self.bids.first()
    }

    /// Best ask (lowest sell price)
    #[inline]
    pub fn best_ask(&self) -> Option<&Level> {
        self.asks.first()
    }

    /// best_ask - best_bid
    pub fn spread(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask.price - bid.price),
            _ => None,
        }
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::TWO),
            _ => None,
        }
    }

    /// Keep only the best `levels` on each side
    pub fn truncated(mut self, levels: usize) -> Self {
        self.bids.truncate(levels);
        self.asks.truncate(levels);
        self
    }

    /// One-line top of book for logging
    pub fn format_summary(&self) -> String {
        let side = |level: Option<&Level>| {
            level
                .map(|l| format!("{} ({})", l.price, l.quantity))
                .unwrap_or_else(|| "N/A".to_string())
        };

        let spread_str = self
            .spread()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            "Bid: {} | Ask: {} | Spread: {} | Seq: {}",
            side(self.best_bid()),
            side(self.best_ask()),
            spread_str,
            self.sequence
        )
    }

    /// Top N levels per side for logging
    pub fn format_depth(&self, max_levels: usize) -> String {
        let render = |levels: &[Level]| {
            levels
                .iter()
                .take(max_levels)
                .map(|l| format!("{}({})", l.price, l.quantity))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("  Bids: {}\n  Asks: {}", render(&self.bids), render(&self.asks))
    }
}

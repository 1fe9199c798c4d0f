//! Venue-neutral market data types

pub mod delta;
pub mod depth;
pub mod instrument;
pub mod ticks;

pub use delta::{parse_levels, BookSnapshot, DepthDelta, DepthSnapshot, LevelUpdate, PriceLevel, Side};
pub use depth::{Depth, Level};
pub use instrument::InstrumentKey;
pub use ticks::{parse_quantity, PriceScale, DEFAULT_PRICE_SCALE};

//! # DepthBook
//!
//! Real-time local order books rebuilt from venue diff-depth streams.
//!
//! ## Components
//!
//! - **store**: per-instrument price level maps behind per-instrument locks
//! - **bootstrap**: bounded-retry snapshot fetch, install and buffer replay
//! - **sequencer**: cursor validation, gap detection, resync triggering
//! - **venues**: Binance spot/futures and Gate.io spot adapters
//! - **feed**: the [`DepthFeed`] facade tying them to a `feedsocket` supervisor
//!
//! ## Guarantees
//!
//! - A book is readable only after a snapshot has been installed and is never
//!   readable while a resync is pending
//! - Deltas for one instrument are applied in arrival order, exactly once
//! - One failing instrument (bootstrap exhausted) never halts the others

pub mod bootstrap;
pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod logging;
pub mod sequencer;
pub mod store;
pub mod venues;

pub use bootstrap::{BootstrapOutcome, Bootstrapper, SnapshotSource};
pub use config::{BackoffKind, BookConfig, BootstrapConfig, ConfigError, ConnectionConfig, DepthConfig, WatchConfig};
pub use domain::{
    BookSnapshot, Depth, DepthDelta, DepthSnapshot, InstrumentKey, Level, LevelUpdate, PriceLevel,
    PriceScale, Side,
};
pub use error::{log_depth_errors, DepthError, DepthErrorCallback, Result};
pub use feed::{DepthFeed, DepthFeedBuilder};
pub use logging::init_tracing;
pub use sequencer::{
    ChecksumRule, ContinuityRule, DeltaOutcome, Discontinuity, PrevSeqRule, Sequencer, StartSeqRule,
};
pub use store::{BookStore, InstrumentStats, InstrumentStatus, SyncState};
pub use venues::{
    Binance, BinanceMarket, BinanceRestSnapshot, BinanceStream, GateChannel, GateRestSnapshot,
    GateSpot, SharedVenue, Venue, VenueKind,
};

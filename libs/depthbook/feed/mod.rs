//! # Depth feed
//!
//! The public facade: one supervised connection to one venue, any number of
//! instruments, each with its own book.
//!
//! ```rust,ignore
//! use depthbook::{Binance, BinanceMarket, BinanceRestSnapshot, DepthFeed, InstrumentKey};
//!
//! let feed = DepthFeed::builder(Binance::spot())
//!     .snapshot_source(BinanceRestSnapshot::new(BinanceMarket::Spot))
//!     .build()?;
//!
//! feed.start().await?;
//! let btc = InstrumentKey::parse("BTC-USDT")?;
//! feed.subscribe(&btc).await?;
//!
//! // NotReady until the first snapshot has been installed
//! if let Ok(depth) = feed.snapshot(&btc) {
//!     println!("{}", depth.format_summary());
//! }
//! feed.stop().await;
//! ```

pub mod builder;

pub use builder::DepthFeedBuilder;

use crate::bootstrap::{BootstrapOutcome, Bootstrapper};
use crate::domain::{Depth, InstrumentKey};
use crate::error::{DepthError, DepthErrorCallback, Result};
use crate::sequencer::{DeltaOutcome, Sequencer};
use crate::store::{BookStore, InstrumentStats, InstrumentStatus};
use crate::venues::{SharedVenue, Venue};
use crossbeam_channel::{Receiver, Sender};
use dashmap::DashMap;
use feedsocket::{ConnectionState, FeedError, FrameHandler, Metrics, Supervisor, SupervisorEvent, WsMessage};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// State shared by the facade, the frame handler and bootstrap tasks
pub(crate) struct FeedCore<V: Venue> {
    venue: Arc<V>,
    store: BookStore,
    /// Wire symbol -> instrument, for routing decoded deltas
    symbols: DashMap<String, InstrumentKey>,
    sequencer: Sequencer,
    bootstrapper: Bootstrapper,
    depth_limit: usize,
    on_error: DepthErrorCallback,
    updates: Option<Sender<String>>,
    stop_tx: watch::Sender<bool>,
}

impl<V: Venue> FeedCore<V> {
    fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// `"BTC-USDT:1672515782136"`
    fn emit_update(&self, instrument: &InstrumentKey, event_time_ms: i64) {
        if let Some(updates) = &self.updates {
            let _ = updates.send(format!("{}:{}", instrument, event_time_ms));
        }
    }

    fn spawn_bootstrap(self: &Arc<Self>, instrument: InstrumentKey) {
        if self.is_stopped() {
            return;
        }
        let core = Arc::clone(self);
        tokio::spawn(async move {
            let wire_symbol = core.venue.wire_symbol(&instrument);
            let outcome = core
                .bootstrapper
                .run(
                    &core.store,
                    &core.sequencer,
                    &instrument,
                    &wire_symbol,
                    core.depth_limit,
                    core.stop_tx.subscribe(),
                )
                .await;

            match outcome {
                BootstrapOutcome::Installed {
                    sequence,
                    applied,
                    event_time_ms,
                } => {
                    info!("[DepthFeed] {} live at sequence {}", instrument, sequence);
                    if applied > 0 {
                        core.emit_update(&instrument, event_time_ms);
                    }
                }
                BootstrapOutcome::Halted => {}
                BootstrapOutcome::Cancelled => {
                    debug!("[DepthFeed] Bootstrap for {} cancelled", instrument);
                }
            }
        });
    }

    fn handle_frame(self: &Arc<Self>, message: WsMessage) {
        let delta = match self.venue.decode(&message, self.store.scale()) {
            Ok(Some(delta)) => delta,
            Ok(None) => return,
            Err(e) => {
                warn!("[DepthFeed] Dropping frame from {}: {}", self.venue.name(), e);
                return;
            }
        };

        let Some(instrument) = self.symbols.get(&delta.symbol).map(|e| e.value().clone()) else {
            debug!("[DepthFeed] Delta for unsubscribed symbol {}", delta.symbol);
            return;
        };
        let Some(shared) = self.store.get(&instrument) else {
            return;
        };

        let (outcome, event_time_ms) = {
            let mut state = shared.lock();
            let outcome = self.sequencer.on_delta(&mut state, delta);
            (outcome, state.event_time_ms)
        };

        match outcome {
            DeltaOutcome::Applied { .. } => self.emit_update(&instrument, event_time_ms),
            DeltaOutcome::Gap { discontinuity, .. } => {
                (self.on_error)(discontinuity.into_error(instrument.clone()));
            }
            DeltaOutcome::Skipped | DeltaOutcome::Buffered { .. } | DeltaOutcome::Dropped => {}
        }
        if outcome.triggers_bootstrap() {
            self.spawn_bootstrap(instrument);
        }
    }
}

/// Routes supervisor payload frames into the sequencer
struct FeedHandler<V: Venue> {
    core: Arc<FeedCore<V>>,
}

impl<V: Venue> FrameHandler for FeedHandler<V> {
    fn on_frame(&self, _session: u64, message: WsMessage) {
        self.core.handle_frame(message);
    }

    fn on_session_start(&self, session: u64) {
        info!(
            "[DepthFeed] {} session {} live ({} instruments)",
            self.core.venue.name(),
            session,
            self.core.store.len()
        );
    }
}

/// Real-time local order books for one venue
pub struct DepthFeed<V: Venue> {
    core: Arc<FeedCore<V>>,
    supervisor: Supervisor<SharedVenue<V>>,
}

impl<V: Venue> DepthFeed<V> {
    /// Connect to the venue; fails if the first connection attempt fails
    pub async fn start(&self) -> Result<()> {
        if self.core.is_stopped() {
            return Err(DepthError::Connection(FeedError::Stopped));
        }
        info!("[DepthFeed] Starting {}", self.core.venue.name());
        self.supervisor.start().await?;
        Ok(())
    }

    /// Start tracking an instrument. Subscribing twice is a no-op.
    ///
    /// Works before `start()`; the subscription is sent once a session is live.
    pub async fn subscribe(&self, instrument: &InstrumentKey) -> Result<()> {
        if self.core.is_stopped() {
            return Err(DepthError::Connection(FeedError::Stopped));
        }

        let (_, created) = self.core.store.insert(instrument);
        if !created {
            return Ok(());
        }
        let wire_symbol = self.core.venue.wire_symbol(instrument);
        self.core.symbols.insert(wire_symbol.clone(), instrument.clone());

        let subscription = self.core.venue.subscription_for(instrument);
        if let Err(e) = self.supervisor.subscribe(&[subscription]).await {
            self.core.symbols.remove(&wire_symbol);
            self.core.store.remove(instrument);
            return Err(e.into());
        }
        info!("[DepthFeed] Subscribed {} ({})", instrument, wire_symbol);
        Ok(())
    }

    /// Stop tracking an instrument and discard its book
    pub async fn unsubscribe(&self, instrument: &InstrumentKey) -> Result<()> {
        if self.core.store.remove(instrument).is_none() {
            return Err(DepthError::UnknownInstrument(instrument.to_string()));
        }
        self.core.symbols.remove(&self.core.venue.wire_symbol(instrument));

        let subscription = self.core.venue.subscription_for(instrument);
        self.supervisor.unsubscribe(&[subscription]).await?;
        info!("[DepthFeed] Unsubscribed {}", instrument);
        Ok(())
    }

    /// Consistent copy of an instrument's book
    ///
    /// `NotReady` until a bootstrap has succeeded (and again while resyncing).
    pub fn snapshot(&self, instrument: &InstrumentKey) -> Result<Depth> {
        self.core.store.snapshot(instrument)
    }

    pub fn status(&self, instrument: &InstrumentKey) -> Result<InstrumentStatus> {
        self.core.store.status(instrument)
    }

    pub fn stats(&self, instrument: &InstrumentKey) -> Result<InstrumentStats> {
        self.core.store.stats(instrument)
    }

    /// Subscribed instruments, sorted
    pub fn instruments(&self) -> Vec<InstrumentKey> {
        self.core.store.keys()
    }

    /// Stop the connection and every bootstrap; all books are discarded. Idempotent.
    pub async fn stop(&self) {
        self.core.stop_tx.send_replace(true);
        self.supervisor.stop().await;
        self.core.store.clear();
        self.core.symbols.clear();
        info!("[DepthFeed] Stopped");
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    pub fn metrics(&self) -> Metrics {
        self.supervisor.metrics()
    }

    /// Connection lifecycle events
    pub fn events(&self) -> Receiver<SupervisorEvent> {
        self.supervisor.events()
    }

    pub fn venue(&self) -> &V {
        &self.core.venue
    }
}

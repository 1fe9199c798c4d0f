//! Depth watcher
//!
//! Keeps local order books for the configured instruments in sync with a
//! venue and logs top-of-book summaries at a fixed interval.
//!
//! Usage:
//!   cargo run --bin depth-watch
//!   cargo run --bin depth-watch -- --config config/depthsync.yaml
//!
//! Environment:
//!   DEPTHSYNC_CONFIG_PATH  config file (default: config/depthsync.yaml)
//!   DEPTHSYNC_WS_URL       WebSocket endpoint override
//!   DEPTHSYNC_REST_URL     snapshot REST base URL override
//!   RUST_LOG               log filter (overrides log_level)

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, Receiver};
use depthsync::bin_common::{
    config_type_from_args, load_config_from_env, parse_args, BinaryRunner, ConfigType, RunConfig,
    ShutdownManager,
};
use depthsync::depthbook::{
    init_tracing, Binance, BinanceMarket, BinanceRestSnapshot, DepthConfig, DepthFeed,
    GateRestSnapshot, GateSpot, InstrumentStatus, Venue, VenueKind,
};
use depthsync::feedsocket::SupervisorEvent;
use std::collections::HashMap;
use tracing::{debug, info, warn};

struct DepthWatch<V: Venue> {
    feed: DepthFeed<V>,
    config: DepthConfig,
    run_config: RunConfig,
    updates: Receiver<String>,
    shutdown: ShutdownManager,
    /// Update tokens seen per instrument
    update_counts: HashMap<String, u64>,
}

impl<V: Venue> DepthWatch<V> {
    fn new(feed: DepthFeed<V>, config: DepthConfig, updates: Receiver<String>) -> Self {
        let run_config = RunConfig::new(format!("depth-watch ({})", config.venue))
            .with_report_interval(config.watch.report_interval_secs)
            .with_levels(config.watch.levels);
        Self {
            feed,
            config,
            run_config,
            updates,
            shutdown: ShutdownManager::new(),
            update_counts: HashMap::new(),
        }
    }

    fn drain_updates(&mut self) {
        for token in self.updates.try_iter() {
            // "BTC-USDT:1672515782136"
            let instrument = token.split(':').next().unwrap_or_default().to_string();
            *self.update_counts.entry(instrument).or_insert(0) += 1;
        }
    }

    fn drain_events(&self) {
        for event in self.feed.events().try_iter() {
            match event {
                SupervisorEvent::Connected { session } => info!("Session {} live", session),
                SupervisorEvent::Disconnected { session } => warn!("Session {} dropped", session),
                SupervisorEvent::Reconnecting { attempt } => info!("Reconnecting (attempt {})", attempt),
                SupervisorEvent::Halted => warn!("Connection halted, no further reconnects"),
                SupervisorEvent::Stopped => debug!("Connection stopped"),
            }
        }
    }

    fn report(&self) {
        let metrics = self.feed.metrics();
        info!(
            "[{}] {:?} | sessions {} | reconnects {} | frames {}",
            self.config.venue,
            metrics.connection_state,
            metrics.sessions,
            metrics.reconnect_count,
            metrics.frames_received
        );

        for instrument in self.feed.instruments() {
            let updates = self.update_counts.get(&instrument.to_string()).copied().unwrap_or(0);
            match self.feed.status(&instrument) {
                Ok(InstrumentStatus::Live { .. }) => {
                    if let Ok(depth) = self.feed.snapshot(&instrument) {
                        info!("  {} | {} | {} updates", instrument, depth.format_summary(), updates);
                        debug!("\n{}", depth.format_depth(self.run_config.levels));
                    }
                }
                Ok(status) => info!("  {} | {:?}", instrument, status),
                Err(e) => warn!("  {} | {}", instrument, e),
            }
        }
    }
}

impl<V: Venue> BinaryRunner for DepthWatch<V> {
    async fn run(&mut self) -> Result<()> {
        self.shutdown.spawn_signal_handler();

        self.feed.start().await.context("failed to connect")?;
        for instrument in self.config.instruments.clone() {
            self.feed
                .subscribe(&instrument)
                .await
                .with_context(|| format!("failed to subscribe {}", instrument))?;
        }

        let interval = self.run_config.report_interval();
        while self.shutdown.is_running() {
            self.shutdown.interruptible_sleep(interval).await;
            self.drain_events();
            self.drain_updates();
            if self.shutdown.is_running() {
                self.report();
            }
        }

        self.feed.stop().await;
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }

    fn summary(&self) -> Option<String> {
        let total: u64 = self.update_counts.values().sum();
        Some(format!(
            "{} book updates across {} instruments",
            total,
            self.config.instruments.len()
        ))
    }
}

async fn watch<V: Venue>(
    venue: V,
    source: impl depthsync::depthbook::SnapshotSource,
    config: DepthConfig,
) -> Result<()> {
    let (updates_tx, updates) = unbounded();
    let feed = DepthFeed::builder(venue)
        .snapshot_source(source)
        .config(&config)
        .updates(updates_tx)
        .build()?;

    DepthWatch::new(feed, config, updates).execute().await
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = parse_args();
    let config_path = load_config_from_env(config_type_from_args(&args, ConfigType::Depth));
    let config = DepthConfig::load(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;

    init_tracing(&config.log_level);
    config.log();

    match config.venue {
        VenueKind::BinanceSpot | VenueKind::BinanceFutures => {
            let market = match config.venue {
                VenueKind::BinanceFutures => BinanceMarket::UsdmFutures,
                _ => BinanceMarket::Spot,
            };
            let mut venue = Binance::new(market);
            if let Some(url) = &config.ws_url {
                venue = venue.with_endpoint(url.clone());
            }
            let mut source = BinanceRestSnapshot::new(market);
            if let Some(url) = &config.rest_url {
                source = source.with_base_url(url.clone());
            }
            watch(venue, source, config).await
        }
        VenueKind::GateioSpot => {
            let mut venue = GateSpot::new();
            if let Some(url) = &config.ws_url {
                venue = venue.with_endpoint(url.clone());
            }
            let mut source = GateRestSnapshot::new();
            if let Some(url) = &config.rest_url {
                source = source.with_base_url(url.clone());
            }
            watch(venue, source, config).await
        }
    }
}

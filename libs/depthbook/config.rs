use crate::bootstrap::{DEFAULT_BOOTSTRAP_ATTEMPTS, DEFAULT_BOOTSTRAP_RETRY_DELAY};
use crate::domain::{InstrumentKey, PriceScale, DEFAULT_PRICE_SCALE};
use crate::sequencer::DEFAULT_MAX_PENDING_DELTAS;
use crate::store::DEFAULT_PRUNE_THRESHOLD;
use crate::venues::VenueKind;
use feedsocket::{ExponentialBackoff, FixedDelay, ReconnectionStrategy, SupervisorConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

/// Overrides `ws_url` when set
pub const WS_URL_ENV: &str = "DEPTHSYNC_WS_URL";
/// Overrides `rest_url` when set
pub const REST_URL_ENV: &str = "DEPTHSYNC_REST_URL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Depth sync configuration (`config/depthsync.yaml`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthConfig {
    pub venue: VenueKind,
    pub instruments: Vec<InstrumentKey>,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// WebSocket endpoint override
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Snapshot REST base URL override
    #[serde(default)]
    pub rest_url: Option<String>,
    #[serde(default)]
    pub book: BookConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookConfig {
    /// Decimal places kept when converting prices to ticks
    #[serde(default = "default_price_scale")]
    pub price_scale: u32,
    /// Fraction of removed levels that triggers a prune pass
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: f64,
    /// Deltas held per instrument while waiting for a snapshot
    #[serde(default = "default_max_pending_deltas")]
    pub max_pending_deltas: usize,
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            price_scale: default_price_scale(),
            prune_threshold: default_prune_threshold(),
            max_pending_deltas: default_max_pending_deltas(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_bootstrap_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Snapshot depth; the venue's default when unset
    #[serde(default)]
    pub depth_limit: Option<usize>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            attempts: default_bootstrap_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            depth_limit: None,
        }
    }
}

impl BootstrapConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_liveness_check_interval_secs")]
    pub liveness_check_interval_secs: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: BackoffKind,
    /// Cap for exponential backoff
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    #[serde(default = "default_storm_window_secs")]
    pub storm_window_secs: u64,
    #[serde(default = "default_storm_limit")]
    pub storm_limit: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            liveness_check_interval_secs: default_liveness_check_interval_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            backoff: default_backoff(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            storm_window_secs: default_storm_window_secs(),
            storm_limit: default_storm_limit(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl ConnectionConfig {
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            liveness_check_interval: Duration::from_secs(self.liveness_check_interval_secs),
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            storm_window: Duration::from_secs(self.storm_window_secs),
            storm_limit: self.storm_limit,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        }
    }

    /// Unbounded attempts: the storm guard is what eventually gives up
    pub fn reconnect_strategy(&self) -> Box<dyn ReconnectionStrategy> {
        let delay = Duration::from_millis(self.reconnect_delay_ms);
        match self.backoff {
            BackoffKind::Fixed => Box::new(FixedDelay::new(delay, None)),
            BackoffKind::Exponential => Box::new(ExponentialBackoff::new(
                delay,
                Duration::from_millis(self.max_reconnect_delay_ms),
                None,
            )),
        }
    }
}

/// depth-watch reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    /// Levels per side printed in each report
    #[serde(default = "default_watch_levels")]
    pub levels: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: default_report_interval_secs(),
            levels: default_watch_levels(),
        }
    }
}

impl DepthConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: DepthConfig = serde_yaml::from_str(&yaml_content)?;

        if let Ok(url) = std::env::var(WS_URL_ENV) {
            info!("Overriding WebSocket URL from environment variable");
            config.ws_url = Some(url);
        }
        if let Ok(url) = std::env::var(REST_URL_ENV) {
            info!("Overriding REST URL from environment variable");
            config.rest_url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one instrument is required".to_string(),
            ));
        }

        PriceScale::new(self.book.price_scale)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if !(self.book.prune_threshold > 0.0 && self.book.prune_threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "book.prune_threshold must be in (0, 1]".to_string(),
            ));
        }

        if self.book.max_pending_deltas == 0 {
            return Err(ConfigError::ValidationError(
                "book.max_pending_deltas must be greater than 0".to_string(),
            ));
        }

        if self.bootstrap.attempts == 0 {
            return Err(ConfigError::ValidationError(
                "bootstrap.attempts must be greater than 0".to_string(),
            ));
        }

        if self.bootstrap.depth_limit == Some(0) {
            return Err(ConfigError::ValidationError(
                "bootstrap.depth_limit must be greater than 0".to_string(),
            ));
        }

        if self.connection.backoff == BackoffKind::Exponential
            && self.connection.max_reconnect_delay_ms < self.connection.reconnect_delay_ms
        {
            return Err(ConfigError::ValidationError(
                "connection.max_reconnect_delay_ms must be >= reconnect_delay_ms".to_string(),
            ));
        }

        self.connection
            .supervisor_config()
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.watch.report_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "watch.report_interval_secs must be greater than 0".to_string(),
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    pub fn price_scale(&self) -> PriceScale {
        PriceScale::new(self.book.price_scale).unwrap_or_default()
    }

    /// Log configuration summary
    pub fn log(&self) {
        let instruments: Vec<String> = self.instruments.iter().map(|i| i.to_string()).collect();
        info!("Configuration loaded:");
        info!("  Venue: {}", self.venue);
        info!("  Instruments: {}", instruments.join(", "));
        if let Some(url) = &self.ws_url {
            info!("  WebSocket URL: {}", url);
        }
        if let Some(url) = &self.rest_url {
            info!("  REST URL: {}", url);
        }
        info!(
            "  Book: scale {}, prune threshold {}, max pending {}",
            self.book.price_scale, self.book.prune_threshold, self.book.max_pending_deltas
        );
        info!(
            "  Bootstrap: {} attempts, {}ms retry delay",
            self.bootstrap.attempts, self.bootstrap.retry_delay_ms
        );
        info!(
            "  Connection: idle {}s, {:?} backoff from {}ms, storm limit {} per {}s",
            self.connection.idle_timeout_secs,
            self.connection.backoff,
            self.connection.reconnect_delay_ms,
            self.connection.storm_limit,
            self.connection.storm_window_secs
        );
        info!("  Log level: {}", self.log_level);
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_price_scale() -> u32 {
    DEFAULT_PRICE_SCALE
}

fn default_prune_threshold() -> f64 {
    DEFAULT_PRUNE_THRESHOLD
}

fn default_max_pending_deltas() -> usize {
    DEFAULT_MAX_PENDING_DELTAS
}

fn default_bootstrap_attempts() -> u32 {
    DEFAULT_BOOTSTRAP_ATTEMPTS
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_BOOTSTRAP_RETRY_DELAY.as_millis() as u64
}

fn default_idle_timeout_secs() -> u64 {
    100
}

fn default_liveness_check_interval_secs() -> u64 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

fn default_backoff() -> BackoffKind {
    BackoffKind::Fixed
}

fn default_max_reconnect_delay_ms() -> u64 {
    60_000
}

fn default_storm_window_secs() -> u64 {
    300
}

fn default_storm_limit() -> usize {
    10
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_report_interval_secs() -> u64 {
    5
}

fn default_watch_levels() -> usize {
    5
}

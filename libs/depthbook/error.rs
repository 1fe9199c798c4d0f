use crate::domain::InstrumentKey;
use feedsocket::FeedError;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the depth engine
#[derive(Error, Debug, Clone)]
pub enum DepthError {
    /// No successful bootstrap yet (or a resync is in progress)
    #[error("Book for {0} is not ready")]
    NotReady(InstrumentKey),

    /// Instrument is not subscribed
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    /// Bootstrap gave up for this instrument; its deltas are dropped
    #[error("Book for {0} is halted")]
    Halted(InstrumentKey),

    /// Delta did not continue the cursor; a resync follows
    #[error("Sequence gap on {instrument}: expected {expected}, got {got}")]
    SequenceGap {
        instrument: InstrumentKey,
        expected: u64,
        got: u64,
    },

    /// Book did not match the checksum published with a delta; a resync follows
    #[error("Checksum mismatch on {instrument} at sequence {sequence}")]
    ChecksumMismatch { instrument: InstrumentKey, sequence: u64 },

    /// One snapshot fetch attempt failed; more attempts may follow
    #[error("Bootstrap attempt {attempt} for {instrument} failed: {reason}")]
    BootstrapFailed {
        instrument: InstrumentKey,
        attempt: u32,
        reason: String,
    },

    /// Every snapshot fetch attempt failed; the instrument is halted
    #[error("Bootstrap for {instrument} exhausted after {attempts} attempts")]
    BootstrapExhausted {
        instrument: InstrumentKey,
        attempts: u32,
    },

    /// Frame, level or snapshot payload could not be understood
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// Snapshot collaborator failed (network, HTTP status, body)
    #[error("Snapshot fetch failed: {0}")]
    Snapshot(String),

    /// Connection supervisor failure
    #[error("Connection error: {0}")]
    Connection(#[from] FeedError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DepthError {
    /// True for errors after which no automatic recovery happens
    pub fn is_fatal(&self) -> bool {
        match self {
            DepthError::BootstrapExhausted { .. } => true,
            DepthError::Connection(e) => e.is_fatal(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DepthError>;

/// Callback invoked on every reportable failure
pub type DepthErrorCallback = Arc<dyn Fn(DepthError) + Send + Sync>;

/// Error callback that only logs
pub fn log_depth_errors() -> DepthErrorCallback {
    Arc::new(|err| {
        if err.is_fatal() {
            tracing::error!("[DepthFeed] {}", err);
        } else {
            tracing::warn!("[DepthFeed] {}", err);
        }
    })
}

use std::time::Duration;
use thiserror::Error;

/// Main error type for the feed supervisor
#[derive(Error, Debug, Clone)]
pub enum FeedError {
    /// Dial, read or write failure on the duplex connection
    #[error("Transport error: {0}")]
    Transport(String),

    /// Connection closed by the remote side
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Venue handshake (authentication) failed
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Outbound control frame could not be written
    #[error("Send failed: {0}")]
    Send(String),

    /// Frame encoding error for an outbound control message
    #[error("Encode error: {0}")]
    Encode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No frame seen within the liveness window
    #[error("No inbound frame for {0:?}")]
    Idle(Duration),

    /// Too many restarts inside the trailing window; the supervisor is halted
    #[error("Restart storm: {restarts} restarts within {window:?}")]
    RestartStorm { restarts: usize, window: Duration },

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Invalid state transition
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Supervisor was stopped by the caller
    #[error("Supervisor stopped")]
    Stopped,
}

impl FeedError {
    /// Terminal errors end the supervisor; everything else is retried internally.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FeedError::RestartStorm { .. })
    }
}

/// Result type for feed operations
pub type Result<T> = std::result::Result<T, FeedError>;

use super::{DepthFeed, FeedCore, FeedHandler};
use crate::bootstrap::{Bootstrapper, SnapshotSource};
use crate::config::{BookConfig, BootstrapConfig, ConnectionConfig, DepthConfig};
use crate::domain::PriceScale;
use crate::error::{log_depth_errors, DepthError, DepthErrorCallback, Result};
use crate::sequencer::Sequencer;
use crate::store::BookStore;
use crate::venues::{SharedVenue, Venue};
use crossbeam_channel::Sender;
use dashmap::DashMap;
use feedsocket::states::NoHandler;
use feedsocket::{Clock, ErrorCallback, FeedError, Supervisor, SupervisorBuilder, Transport};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;

/// Type-state markers for [`DepthFeedBuilder`]
pub mod states {
    pub trait SourceState {}

    /// No snapshot source yet
    pub struct NoSource;
    impl SourceState for NoSource {}

    /// Snapshot source set; `build()` is available
    pub struct HasSource;
    impl SourceState for HasSource {}
}

use states::*;

/// Type-state builder for [`DepthFeed`]
///
/// The venue is given up front; the snapshot source is required before
/// `build()` becomes available.
///
/// | Setting      | Default                                 |
/// |--------------|-----------------------------------------|
/// | on_error     | [`log_depth_errors`]                    |
/// | updates      | none                                    |
/// | transport    | tokio-tungstenite WebSocket             |
/// | clock        | system monotonic clock                  |
/// | book         | scale 8, prune 0.30, 10 000 pending     |
/// | bootstrap    | 5 attempts, 1 s apart, venue depth      |
/// | connection   | idle 100 s, storm 10 per 300 s, fixed 5 s |
pub struct DepthFeedBuilder<V: Venue, S: SourceState> {
    _state: PhantomData<S>,
    venue: Arc<V>,
    supervisor: SupervisorBuilder<SharedVenue<V>, NoHandler>,
    source: Option<Arc<dyn SnapshotSource>>,
    on_error: Option<DepthErrorCallback>,
    updates: Option<Sender<String>>,
    book: BookConfig,
    bootstrap: BootstrapConfig,
    connection: ConnectionConfig,
}

impl<V: Venue> DepthFeed<V> {
    pub fn builder(venue: V) -> DepthFeedBuilder<V, NoSource> {
        let venue = Arc::new(venue);
        DepthFeedBuilder {
            _state: PhantomData,
            supervisor: Supervisor::builder(SharedVenue(Arc::clone(&venue))),
            venue,
            source: None,
            on_error: None,
            updates: None,
            book: BookConfig::default(),
            bootstrap: BootstrapConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

// Snapshot source setting
impl<V: Venue> DepthFeedBuilder<V, NoSource> {
    pub fn snapshot_source(self, source: impl SnapshotSource) -> DepthFeedBuilder<V, HasSource> {
        self.shared_snapshot_source(Arc::new(source))
    }

    pub fn shared_snapshot_source(self, source: Arc<dyn SnapshotSource>) -> DepthFeedBuilder<V, HasSource> {
        DepthFeedBuilder {
            _state: PhantomData,
            venue: self.venue,
            supervisor: self.supervisor,
            source: Some(source),
            on_error: self.on_error,
            updates: self.updates,
            book: self.book,
            bootstrap: self.bootstrap,
            connection: self.connection,
        }
    }
}

// Optional configuration methods
impl<V: Venue, S: SourceState> DepthFeedBuilder<V, S> {
    /// Called for every reportable failure; fatal ones carry `is_fatal() == true`
    pub fn on_error(mut self, callback: DepthErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    /// Receives an `"instrument:eventTimeMs"` token after every applied delta
    pub fn updates(mut self, sender: Sender<String>) -> Self {
        self.updates = Some(sender);
        self
    }

    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.supervisor = self.supervisor.transport(transport);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.supervisor = self.supervisor.clock(clock);
        self
    }

    pub fn book(mut self, book: BookConfig) -> Self {
        self.book = book;
        self
    }

    pub fn bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Book, bootstrap and connection sections of a loaded config
    pub fn config(self, config: &DepthConfig) -> Self {
        self.book(config.book.clone())
            .bootstrap(config.bootstrap.clone())
            .connection(config.connection.clone())
    }
}

// Build method - only available once the snapshot source is set
impl<V: Venue> DepthFeedBuilder<V, HasSource> {
    pub fn build(self) -> Result<DepthFeed<V>> {
        let source = self
            .source
            .ok_or_else(|| DepthError::Config("snapshot source must be set".into()))?;
        let scale = PriceScale::new(self.book.price_scale)?;
        if !(self.book.prune_threshold > 0.0 && self.book.prune_threshold <= 1.0) {
            return Err(DepthError::Config("prune_threshold must be in (0, 1]".into()));
        }
        let on_error = self.on_error.unwrap_or_else(log_depth_errors);

        let sequencer = Sequencer::new(self.venue.continuity(), self.book.max_pending_deltas)
            .with_checksum(self.venue.checksum());
        let bootstrapper = Bootstrapper::new(
            source,
            scale,
            self.bootstrap.attempts,
            self.bootstrap.retry_delay(),
            on_error.clone(),
        );
        let (stop_tx, _) = watch::channel(false);

        let core = Arc::new(FeedCore {
            depth_limit: self
                .bootstrap
                .depth_limit
                .unwrap_or_else(|| self.venue.snapshot_limit()),
            venue: self.venue,
            store: BookStore::new(scale, self.book.prune_threshold),
            symbols: DashMap::new(),
            sequencer,
            bootstrapper,
            on_error: on_error.clone(),
            updates: self.updates,
            stop_tx,
        });

        let connection_errors: ErrorCallback =
            Arc::new(move |e: FeedError| on_error(DepthError::Connection(e)));
        let supervisor = self
            .supervisor
            .config(self.connection.supervisor_config())
            .reconnect_strategy(self.connection.reconnect_strategy())
            .on_error(connection_errors)
            .shared_handler(Arc::new(FeedHandler {
                core: Arc::clone(&core),
            }))
            .build()?;

        Ok(DepthFeed { core, supervisor })
    }
}

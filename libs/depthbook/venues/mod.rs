//! # Venue adapters
//!
//! A [`Venue`] is a [`FeedProtocol`] that also knows how to name instruments on
//! the wire, decode its depth frames into [`DepthDelta`]s and which
//! continuity rule its sequence ids follow.
//!
//! Shipped venues:
//!
//! | Venue                  | Type                 | Continuity  |
//! |------------------------|----------------------|-------------|
//! | Binance spot           | [`Binance::spot`]    | start-seq   |
//! | Binance USD-M futures  | [`Binance::usdm_futures`] | prev-seq |
//! | Gate.io spot           | [`GateSpot`]         | start-seq   |

pub mod binance;
pub mod gateio;

pub use binance::{Binance, BinanceMarket, BinanceRestSnapshot, BinanceStream};
pub use gateio::{GateChannel, GateRestSnapshot, GateSpot};

use crate::domain::{DepthDelta, InstrumentKey, PriceScale};
use crate::error::Result;
use crate::sequencer::{ChecksumRule, ContinuityRule};
use async_trait::async_trait;
use feedsocket::{FeedProtocol, FrameKind, WsMessage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Timeout applied to REST snapshot requests
pub const SNAPSHOT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Venue protocol plus depth-specific decoding
pub trait Venue: FeedProtocol {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Typed subscribe parameter for an instrument's diff-depth stream
    fn subscription_for(&self, instrument: &InstrumentKey) -> Self::Subscription;

    /// Symbol as it appears in delta frames and snapshot requests
    fn wire_symbol(&self, instrument: &InstrumentKey) -> String;

    /// Decode a payload frame; `Ok(None)` for frames that carry no delta
    fn decode(&self, message: &WsMessage, scale: PriceScale) -> Result<Option<DepthDelta>>;

    fn continuity(&self) -> Box<dyn ContinuityRule>;

    /// Checksum verification, for venues that publish one with their deltas
    fn checksum(&self) -> Option<Box<dyn ChecksumRule>> {
        None
    }

    /// Depth requested from the snapshot endpoint
    fn snapshot_limit(&self) -> usize;
}

/// Venue selector used by configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    BinanceSpot,
    BinanceFutures,
    GateioSpot,
}

impl fmt::Display for VenueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VenueKind::BinanceSpot => "binance_spot",
            VenueKind::BinanceFutures => "binance_futures",
            VenueKind::GateioSpot => "gateio_spot",
        };
        write!(f, "{}", name)
    }
}

/// One venue instance shared between the supervisor and the frame handler
pub struct SharedVenue<V>(pub Arc<V>);

impl<V> Clone for SharedVenue<V> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

#[async_trait]
impl<V: Venue> FeedProtocol for SharedVenue<V> {
    type Subscription = V::Subscription;

    fn endpoint(&self) -> String {
        self.0.endpoint()
    }

    async fn handshake(&self) -> feedsocket::Result<Option<WsMessage>> {
        self.0.handshake().await
    }

    fn subscribe_frames(&self, subs: &[Self::Subscription]) -> feedsocket::Result<Vec<WsMessage>> {
        self.0.subscribe_frames(subs)
    }

    fn unsubscribe_frames(&self, subs: &[Self::Subscription]) -> feedsocket::Result<Vec<WsMessage>> {
        self.0.unsubscribe_frames(subs)
    }

    fn heartbeat_interval(&self) -> Option<Duration> {
        self.0.heartbeat_interval()
    }

    fn heartbeat_frame(&self) -> Option<WsMessage> {
        self.0.heartbeat_frame()
    }

    fn classify(&self, message: &WsMessage) -> FrameKind {
        self.0.classify(message)
    }
}

/// GET a JSON document with the shared snapshot timeout
pub(crate) fn get_json<T: serde::de::DeserializeOwned>(url: &str, timeout: Duration) -> Result<T> {
    use crate::error::DepthError;

    let response = ureq::get(url).timeout(timeout).call().map_err(|e| match e {
        ureq::Error::Status(code, _) => DepthError::Snapshot(format!("{} returned HTTP {}", url, code)),
        other => DepthError::Snapshot(format!("{}: {}", url, other)),
    })?;

    response
        .into_json()
        .map_err(|e| DepthError::Snapshot(format!("failed to parse snapshot body: {}", e)))
}

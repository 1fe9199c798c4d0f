//! Binance spot and USD-M futures diff-depth streams
//!
//! Both markets publish the same `depthUpdate` event; futures adds `pu`, the
//! final id of the previous event, which is the only reliable link between
//! events there.

use super::{get_json, Venue, SNAPSHOT_REQUEST_TIMEOUT};
use crate::bootstrap::SnapshotSource;
use crate::domain::{parse_levels, DepthDelta, DepthSnapshot, InstrumentKey, PriceLevel, PriceScale};
use crate::error::{DepthError, Result};
use crate::sequencer::{ContinuityRule, PrevSeqRule, StartSeqRule};
use async_trait::async_trait;
use feedsocket::{FeedError, FeedProtocol, FrameKind, WsMessage};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const SPOT_WS_URL: &str = "wss://stream.binance.com:9443/ws";
const FUTURES_WS_URL: &str = "wss://fstream.binance.com/ws";
const SPOT_REST_URL: &str = "https://api.binance.com";
const FUTURES_REST_URL: &str = "https://fapi.binance.com";
const SNAPSHOT_LIMIT: usize = 1000;

// =============================================================================
// Market and subscription types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinanceMarket {
    Spot,
    UsdmFutures,
}

impl BinanceMarket {
    fn ws_url(self) -> &'static str {
        match self {
            BinanceMarket::Spot => SPOT_WS_URL,
            BinanceMarket::UsdmFutures => FUTURES_WS_URL,
        }
    }

    fn rest_url(self) -> &'static str {
        match self {
            BinanceMarket::Spot => SPOT_REST_URL,
            BinanceMarket::UsdmFutures => FUTURES_REST_URL,
        }
    }

    fn depth_path(self) -> &'static str {
        match self {
            BinanceMarket::Spot => "/api/v3/depth",
            BinanceMarket::UsdmFutures => "/fapi/v1/depth",
        }
    }
}

/// Streams this adapter can subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BinanceStream {
    /// `<symbol>@depth@100ms`
    DiffDepth { symbol: String },
}

impl BinanceStream {
    /// Stream name as used in SUBSCRIBE params (e.g. "btcusdt@depth@100ms")
    pub fn stream_name(&self) -> String {
        match self {
            BinanceStream::DiffDepth { symbol } => format!("{}@depth@100ms", symbol),
        }
    }
}

// =============================================================================
// Wire messages
// =============================================================================

/// Diff-depth event
///
/// Example JSON:
/// ```json
/// {
///     "e": "depthUpdate",
///     "E": 1672515782136,
///     "s": "BNBBTC",
///     "U": 157,
///     "u": 160,
///     "b": [["0.0024", "10"]],
///     "a": [["0.0026", "100"]]
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
struct DepthUpdate {
    #[serde(rename = "e")]
    event_type: String,

    #[serde(rename = "E")]
    event_time: i64,

    #[serde(rename = "s")]
    symbol: String,

    #[serde(rename = "U")]
    first_update_id: u64,

    #[serde(rename = "u")]
    final_update_id: u64,

    /// Futures only
    #[serde(rename = "pu", default)]
    prev_final_update_id: Option<u64>,

    #[serde(rename = "b")]
    bids: Vec<[String; 2]>,

    #[serde(rename = "a")]
    asks: Vec<[String; 2]>,
}

#[derive(Debug, Serialize)]
struct ControlRequest<'a> {
    method: &'a str,
    params: Vec<String>,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct ControlResponse {
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// `GET /api/v3/depth` and `GET /fapi/v1/depth`
#[derive(Debug, Deserialize)]
struct DepthResponse {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

// =============================================================================
// Venue
// =============================================================================

/// Binance diff-depth venue (spot or USD-M futures)
pub struct Binance {
    market: BinanceMarket,
    ws_url: String,
    next_id: AtomicU64,
}

impl Binance {
    pub fn new(market: BinanceMarket) -> Self {
        Self {
            market,
            ws_url: market.ws_url().to_string(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn spot() -> Self {
        Self::new(BinanceMarket::Spot)
    }

    pub fn usdm_futures() -> Self {
        Self::new(BinanceMarket::UsdmFutures)
    }

    /// Override the WebSocket endpoint (testnets, local mocks)
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn market(&self) -> BinanceMarket {
        self.market
    }

    fn control(&self, method: &str, subs: &[BinanceStream]) -> feedsocket::Result<Vec<WsMessage>> {
        if subs.is_empty() {
            return Ok(Vec::new());
        }
        let request = ControlRequest {
            method,
            params: subs.iter().map(BinanceStream::stream_name).collect(),
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        let text = serde_json::to_string(&request).map_err(|e| FeedError::Encode(e.to_string()))?;
        Ok(vec![WsMessage::Text(text)])
    }
}

#[async_trait]
impl FeedProtocol for Binance {
    type Subscription = BinanceStream;

    fn endpoint(&self) -> String {
        self.ws_url.clone()
    }

    fn subscribe_frames(&self, subs: &[BinanceStream]) -> feedsocket::Result<Vec<WsMessage>> {
        self.control("SUBSCRIBE", subs)
    }

    fn unsubscribe_frames(&self, subs: &[BinanceStream]) -> feedsocket::Result<Vec<WsMessage>> {
        self.control("UNSUBSCRIBE", subs)
    }

    /// Events carry `"e"`; everything else is a response to a control request
    fn classify(&self, message: &WsMessage) -> FrameKind {
        let Some(text) = message.as_text() else {
            return FrameKind::Payload;
        };
        if text.contains("\"e\":") {
            return FrameKind::Payload;
        }
        match serde_json::from_str::<ControlResponse>(text) {
            Ok(ControlResponse { id, error: Some(error) }) => {
                warn!("[Binance WS] Request {:?} rejected: {}", id, error);
            }
            Ok(ControlResponse { id, .. }) => debug!("[Binance WS] Request {:?} acknowledged", id),
            Err(_) => debug!("[Binance WS] Unrecognized control frame: {}", text),
        }
        FrameKind::Control
    }
}

impl Venue for Binance {
    fn name(&self) -> &'static str {
        match self.market {
            BinanceMarket::Spot => "Binance Spot",
            BinanceMarket::UsdmFutures => "Binance USD-M",
        }
    }

    fn subscription_for(&self, instrument: &InstrumentKey) -> BinanceStream {
        BinanceStream::DiffDepth {
            symbol: instrument.concat_lower(),
        }
    }

    fn wire_symbol(&self, instrument: &InstrumentKey) -> String {
        instrument.concat_upper()
    }

    fn decode(&self, message: &WsMessage, scale: PriceScale) -> Result<Option<DepthDelta>> {
        let text = message
            .as_text()
            .ok_or_else(|| DepthError::Malformed("binary frame".into()))?;
        let update: DepthUpdate = serde_json::from_str(text)
            .map_err(|e| DepthError::Malformed(format!("depthUpdate: {}", e)))?;
        if update.event_type != "depthUpdate" {
            debug!("[Binance WS] Ignoring {} event", update.event_type);
            return Ok(None);
        }
        if update.first_update_id > update.final_update_id {
            return Err(DepthError::Malformed(format!(
                "update range {}..={} is inverted",
                update.first_update_id, update.final_update_id
            )));
        }

        Ok(Some(DepthDelta {
            symbol: update.symbol,
            first_seq: update.first_update_id,
            final_seq: update.final_update_id,
            prev_seq: update.prev_final_update_id,
            bids: parse_levels(scale, &update.bids)?,
            asks: parse_levels(scale, &update.asks)?,
            event_time_ms: update.event_time,
            checksum: None,
        }))
    }

    fn continuity(&self) -> Box<dyn ContinuityRule> {
        match self.market {
            BinanceMarket::Spot => Box::new(StartSeqRule),
            BinanceMarket::UsdmFutures => Box::new(PrevSeqRule),
        }
    }

    fn snapshot_limit(&self) -> usize {
        SNAPSHOT_LIMIT
    }
}

// =============================================================================
// REST snapshot
// =============================================================================

/// Blocking depth snapshot over Binance REST
#[derive(Debug, Clone)]
pub struct BinanceRestSnapshot {
    base_url: String,
    path: &'static str,
    timeout: Duration,
}

impl BinanceRestSnapshot {
    pub fn new(market: BinanceMarket) -> Self {
        Self {
            base_url: market.rest_url().to_string(),
            path: market.depth_path(),
            timeout: SNAPSHOT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self, wire_symbol: &str, limit: usize) -> String {
        format!(
            "{}{}?symbol={}&limit={}",
            self.base_url, self.path, wire_symbol, limit
        )
    }
}

impl SnapshotSource for BinanceRestSnapshot {
    fn fetch(&self, wire_symbol: &str, limit: usize) -> Result<DepthSnapshot> {
        let url = self.url(wire_symbol, limit);
        debug!("[Binance REST] Fetching depth snapshot: {}", url);
        let response: DepthResponse = get_json(&url, self.timeout)?;
        Ok(DepthSnapshot {
            sequence: response.last_update_id,
            bids: response.bids.into_iter().map(PriceLevel::from).collect(),
            asks: response.asks.into_iter().map(PriceLevel::from).collect(),
        })
    }
}

//! Gate.io spot `spot.order_book_update` channel
//!
//! Gate expects an application-level `spot.ping` from the client and answers
//! with `spot.pong`. Subscribe acknowledgements and pongs are control frames.

use super::{get_json, Venue, SNAPSHOT_REQUEST_TIMEOUT};
use crate::bootstrap::SnapshotSource;
use crate::domain::{parse_levels, DepthDelta, DepthSnapshot, InstrumentKey, PriceLevel, PriceScale};
use crate::error::{DepthError, Result};
use crate::sequencer::{ContinuityRule, StartSeqRule};
use async_trait::async_trait;
use feedsocket::{FeedError, FeedProtocol, FrameKind, WsMessage};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const WS_URL: &str = "wss://api.gateio.ws/ws/v4/";
const REST_URL: &str = "https://api.gateio.ws";
const ORDER_BOOK_UPDATE: &str = "spot.order_book_update";
const PING_CHANNEL: &str = "spot.ping";
const PING_INTERVAL: Duration = Duration::from_secs(10);
const SNAPSHOT_LIMIT: usize = 100;

/// Channels this adapter can subscribe to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GateChannel {
    /// `spot.order_book_update` at 100ms for a currency pair (`BTC_USDT`)
    OrderBookUpdate { currency_pair: String },
}

impl GateChannel {
    fn channel(&self) -> &'static str {
        match self {
            GateChannel::OrderBookUpdate { .. } => ORDER_BOOK_UPDATE,
        }
    }

    fn payload(&self) -> Vec<String> {
        match self {
            GateChannel::OrderBookUpdate { currency_pair } => {
                vec![currency_pair.clone(), "100ms".to_string()]
            }
        }
    }
}

// =============================================================================
// Wire messages
// =============================================================================

#[derive(Debug, Serialize)]
struct Request<'a> {
    time: i64,
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    event: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<Vec<String>>,
}

/// Channel envelope
///
/// Example JSON:
/// ```json
/// {
///     "time": 1606294781,
///     "time_ms": 1606294781236,
///     "channel": "spot.order_book_update",
///     "event": "update",
///     "result": {
///         "t": 1606294781123,
///         "e": "depthUpdate",
///         "E": 1606294781,
///         "s": "BTC_USDT",
///         "U": 48776301,
///         "u": 48776306,
///         "b": [["19137.74", "0.0001"]],
///         "a": [["19137.75", "0.6135"]]
///     }
/// }
/// ```
#[derive(Debug, Deserialize)]
struct Envelope {
    channel: String,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct UpdateEnvelope {
    channel: String,
    event: String,
    result: OrderBookUpdate,
}

#[derive(Debug, Deserialize)]
struct OrderBookUpdate {
    /// Update time in ms
    t: i64,
    s: String,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    final_update_id: u64,
    #[serde(rename = "b", default)]
    bids: Vec<[String; 2]>,
    #[serde(rename = "a", default)]
    asks: Vec<[String; 2]>,
}

/// `GET /api/v4/spot/order_book?with_id=true`
#[derive(Debug, Deserialize)]
struct OrderBookResponse {
    id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

// =============================================================================
// Venue
// =============================================================================

/// Gate.io spot order book updates
pub struct GateSpot {
    ws_url: String,
}

impl Default for GateSpot {
    fn default() -> Self {
        Self::new()
    }
}

impl GateSpot {
    pub fn new() -> Self {
        Self {
            ws_url: WS_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    fn control(&self, event: &str, subs: &[GateChannel]) -> feedsocket::Result<Vec<WsMessage>> {
        let time = chrono::Utc::now().timestamp();
        subs.iter()
            .map(|sub| {
                let request = Request {
                    time,
                    channel: sub.channel(),
                    event: Some(event),
                    payload: Some(sub.payload()),
                };
                serde_json::to_string(&request)
                    .map(WsMessage::Text)
                    .map_err(|e| FeedError::Encode(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl FeedProtocol for GateSpot {
    type Subscription = GateChannel;

    fn endpoint(&self) -> String {
        self.ws_url.clone()
    }

    fn subscribe_frames(&self, subs: &[GateChannel]) -> feedsocket::Result<Vec<WsMessage>> {
        self.control("subscribe", subs)
    }

    fn unsubscribe_frames(&self, subs: &[GateChannel]) -> feedsocket::Result<Vec<WsMessage>> {
        self.control("unsubscribe", subs)
    }

    fn heartbeat_interval(&self) -> Option<Duration> {
        Some(PING_INTERVAL)
    }

    fn heartbeat_frame(&self) -> Option<WsMessage> {
        let request = Request {
            time: chrono::Utc::now().timestamp(),
            channel: PING_CHANNEL,
            event: None,
            payload: None,
        };
        serde_json::to_string(&request).ok().map(WsMessage::Text)
    }

    fn classify(&self, message: &WsMessage) -> FrameKind {
        let Some(text) = message.as_text() else {
            return FrameKind::Payload;
        };
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            // let the decoder log it
            Err(_) => return FrameKind::Payload,
        };
        if envelope.channel == ORDER_BOOK_UPDATE && envelope.event.as_deref() == Some("update") {
            return FrameKind::Payload;
        }
        if let Some(error) = envelope.error.filter(|e| !e.is_null()) {
            warn!("[Gate WS] {} {:?} failed: {}", envelope.channel, envelope.event, error);
        } else {
            debug!("[Gate WS] Control: {} {:?}", envelope.channel, envelope.event);
        }
        FrameKind::Control
    }
}

impl Venue for GateSpot {
    fn name(&self) -> &'static str {
        "Gate Spot"
    }

    fn subscription_for(&self, instrument: &InstrumentKey) -> GateChannel {
        GateChannel::OrderBookUpdate {
            currency_pair: self.wire_symbol(instrument),
        }
    }

    fn wire_symbol(&self, instrument: &InstrumentKey) -> String {
        instrument.joined('_')
    }

    fn decode(&self, message: &WsMessage, scale: PriceScale) -> Result<Option<DepthDelta>> {
        let text = message
            .as_text()
            .ok_or_else(|| DepthError::Malformed("binary frame".into()))?;
        let envelope: UpdateEnvelope = serde_json::from_str(text)
            .map_err(|e| DepthError::Malformed(format!("order_book_update: {}", e)))?;
        if envelope.channel != ORDER_BOOK_UPDATE || envelope.event != "update" {
            return Ok(None);
        }

        let update = envelope.result;
        if update.first_update_id > update.final_update_id {
            return Err(DepthError::Malformed(format!(
                "update range {}..={} is inverted",
                update.first_update_id, update.final_update_id
            )));
        }
        Ok(Some(DepthDelta {
            symbol: update.s,
            first_seq: update.first_update_id,
            final_seq: update.final_update_id,
            prev_seq: None,
            bids: parse_levels(scale, &update.bids)?,
            asks: parse_levels(scale, &update.asks)?,
            event_time_ms: update.t,
            checksum: None,
        }))
    }

    fn continuity(&self) -> Box<dyn ContinuityRule> {
        Box::new(StartSeqRule)
    }

    fn snapshot_limit(&self) -> usize {
        SNAPSHOT_LIMIT
    }
}

// =============================================================================
// REST snapshot
// =============================================================================

/// Blocking order book snapshot over Gate.io REST
#[derive(Debug, Clone)]
pub struct GateRestSnapshot {
    base_url: String,
    timeout: Duration,
}

impl Default for GateRestSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl GateRestSnapshot {
    pub fn new() -> Self {
        Self {
            base_url: REST_URL.to_string(),
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
            "{}/api/v4/spot/order_book?currency_pair={}&limit={}&with_id=true",
            self.base_url, wire_symbol, limit
        )
    }
}

impl SnapshotSource for GateRestSnapshot {
    fn fetch(&self, wire_symbol: &str, limit: usize) -> Result<DepthSnapshot> {
        let url = self.url(wire_symbol, limit);
        debug!("[Gate REST] Fetching order book snapshot: {}", url);
        let response: OrderBookResponse = get_json(&url, self.timeout)?;
        Ok(DepthSnapshot {
            sequence: response.id,
            bids: response.bids.into_iter().map(PriceLevel::from).collect(),
            asks: response.asks.into_iter().map(PriceLevel::from).collect(),
        })
    }
}

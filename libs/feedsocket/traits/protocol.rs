//! Venue protocol seam
//!
//! One supervisor serves every venue. What differs between venues (endpoint,
//! authentication handshake, subscribe frame encoding, heartbeat payload and
//! how control frames look) is supplied by a [`FeedProtocol`] implementation.

use crate::{FrameKind, Result, WsMessage};
use async_trait::async_trait;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

/// Venue-specific connect/handshake/heartbeat encoding
///
/// # Example
///
/// ```ignore
/// struct EchoProtocol;
///
/// #[async_trait]
/// impl FeedProtocol for EchoProtocol {
///     type Subscription = String;
///
///     fn endpoint(&self) -> String {
///         "wss://echo.example.com".into()
///     }
///
///     fn subscribe_frames(&self, subs: &[String]) -> Result<Vec<WsMessage>> {
///         Ok(subs.iter().map(|s| WsMessage::text(format!("sub {s}"))).collect())
///     }
///
///     fn unsubscribe_frames(&self, subs: &[String]) -> Result<Vec<WsMessage>> {
///         Ok(subs.iter().map(|s| WsMessage::text(format!("unsub {s}"))).collect())
///     }
/// }
/// ```
#[async_trait]
pub trait FeedProtocol: Send + Sync + 'static {
    /// Typed subscribe parameter for this venue
    type Subscription: Clone + Eq + Hash + Debug + Send + Sync + 'static;

    /// WebSocket URL to dial for every session
    fn endpoint(&self) -> String;

    /// Message sent right after the connection opens, before any subscription.
    ///
    /// Called on every (re)connect so signatures and nonces can be fresh.
    async fn handshake(&self) -> Result<Option<WsMessage>> {
        Ok(None)
    }

    /// Encode subscribe control frames for the given subscriptions
    fn subscribe_frames(&self, subs: &[Self::Subscription]) -> Result<Vec<WsMessage>>;

    /// Encode unsubscribe control frames for the given subscriptions
    fn unsubscribe_frames(&self, subs: &[Self::Subscription]) -> Result<Vec<WsMessage>>;

    /// Application heartbeat sent by the client: interval and payload builder
    fn heartbeat_interval(&self) -> Option<Duration> {
        None
    }

    /// Heartbeat payload; only called when `heartbeat_interval` is set
    fn heartbeat_frame(&self) -> Option<WsMessage> {
        None
    }

    /// Classify an inbound application message
    fn classify(&self, _message: &WsMessage) -> FrameKind {
        FrameKind::Payload
    }
}

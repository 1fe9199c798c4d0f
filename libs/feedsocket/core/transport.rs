//! Transport implementations
//!
//! - [`TungsteniteTransport`]: real WebSocket connections (tokio-tungstenite)
//! - [`ChannelTransport`]: in-process duplex pipes for simulations and tests

use crate::{Connection, FeedError, FrameReader, FrameWriter, InboundFrame, Result, Transport, WsMessage};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// tokio-tungstenite
// =============================================================================

/// WebSocket transport over tokio-tungstenite
///
/// Protocol ping frames are answered by tungstenite itself; they still surface
/// as [`InboundFrame::Ping`] so the watchdog counts them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteTransport;

#[async_trait]
impl Transport for TungsteniteTransport {
    async fn connect(&self, url: &str) -> Result<Connection> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| FeedError::Transport(format!("connect {}: {}", url, e)))?;
        debug!("[Transport] Connected to {} (status {})", url, response.status());

        let (write, read) = stream.split();
        Ok(Connection::new(
            Box::new(TungsteniteWriter(write)),
            Box::new(TungsteniteReader(read)),
        ))
    }
}

struct TungsteniteWriter(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameWriter for TungsteniteWriter {
    async fn send(&mut self, message: WsMessage) -> Result<()> {
        let frame = match message {
            WsMessage::Text(text) => Message::Text(text),
            WsMessage::Binary(data) => Message::Binary(data),
        };
        self.0
            .send(frame)
            .await
            .map_err(|e| FeedError::Send(e.to_string()))
    }

    async fn close(&mut self) -> Result<()> {
        self.0
            .close()
            .await
            .map_err(|e| FeedError::Transport(e.to_string()))
    }
}

struct TungsteniteReader(SplitStream<WsStream>);

#[async_trait]
impl FrameReader for TungsteniteReader {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        loop {
            let frame = match self.0.next().await? {
                Ok(Message::Text(text)) => InboundFrame::Message(WsMessage::Text(text)),
                Ok(Message::Binary(data)) => InboundFrame::Message(WsMessage::Binary(data)),
                Ok(Message::Ping(data)) => InboundFrame::Ping(data),
                Ok(Message::Pong(data)) => InboundFrame::Pong(data),
                Ok(Message::Close(frame)) => {
                    InboundFrame::Close(frame.map(|f| f.reason.to_string()))
                }
                // raw frames only show up when reading with frame-level access
                Ok(Message::Frame(_)) => continue,
                Err(e) => return Some(Err(FeedError::Transport(e.to_string()))),
            };
            return Some(Ok(frame));
        }
    }
}

// =============================================================================
// In-process channels
// =============================================================================

/// Transport whose connections are in-memory pipes
///
/// Every successful `connect` hands the far end of the pipe to the paired
/// [`ChannelAcceptor`], which plays the venue.
#[derive(Clone)]
pub struct ChannelTransport {
    accept_tx: UnboundedSender<ChannelPeer>,
    refuse_next: Arc<AtomicUsize>,
    refuse_all: Arc<std::sync::atomic::AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

/// Server side of a [`ChannelTransport`]
pub struct ChannelAcceptor {
    accept_rx: UnboundedReceiver<ChannelPeer>,
}

impl ChannelTransport {
    pub fn new() -> (Self, ChannelAcceptor) {
        let (accept_tx, accept_rx) = unbounded_channel();
        (
            Self {
                accept_tx,
                refuse_next: Arc::new(AtomicUsize::new(0)),
                refuse_all: Arc::new(std::sync::atomic::AtomicBool::new(false)),
                attempts: Arc::new(AtomicUsize::new(0)),
            },
            ChannelAcceptor { accept_rx },
        )
    }

    /// Refuse the next `n` connection attempts
    pub fn refuse_next(&self, n: usize) {
        self.refuse_next.store(n, Ordering::Release);
    }

    /// Refuse (or stop refusing) every connection attempt
    pub fn refuse_all(&self, refuse: bool) {
        self.refuse_all.store(refuse, Ordering::Release);
    }

    /// Connection attempts so far, refused ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self, url: &str) -> Result<Connection> {
        self.attempts.fetch_add(1, Ordering::AcqRel);

        if self.refuse_all.load(Ordering::Acquire) {
            return Err(FeedError::Transport(format!("connect {}: refused", url)));
        }
        let refused = self
            .refuse_next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(FeedError::Transport(format!("connect {}: refused", url)));
        }

        let (client_tx, server_rx) = unbounded_channel();
        let (server_tx, client_rx) = unbounded_channel();
        let peer = ChannelPeer {
            url: url.to_string(),
            sent: server_rx,
            push: server_tx,
        };
        self.accept_tx
            .send(peer)
            .map_err(|_| FeedError::Transport(format!("connect {}: no acceptor", url)))?;

        Ok(Connection::new(
            Box::new(ChannelWriter(Some(client_tx))),
            Box::new(ChannelReader(client_rx)),
        ))
    }
}

impl ChannelAcceptor {
    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Option<ChannelPeer> {
        self.accept_rx.recv().await
    }
}

/// One accepted in-memory connection, seen from the venue side
pub struct ChannelPeer {
    pub url: String,
    sent: UnboundedReceiver<ClientFrame>,
    push: UnboundedSender<InboundFrame>,
}

/// What the client wrote on an in-memory connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Message(WsMessage),
    Close,
}

impl ChannelPeer {
    /// Deliver a frame to the client; false once the client hung up
    pub fn push(&self, frame: InboundFrame) -> bool {
        self.push.send(frame).is_ok()
    }

    pub fn push_text(&self, text: impl Into<String>) -> bool {
        self.push(InboundFrame::Message(WsMessage::Text(text.into())))
    }

    /// Next thing the client wrote; `None` once the client side is gone
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        self.sent.recv().await
    }

    /// Next text message the client wrote, skipping close markers
    pub async fn recv_text(&mut self) -> Option<String> {
        while let Some(frame) = self.sent.recv().await {
            if let ClientFrame::Message(WsMessage::Text(text)) = frame {
                return Some(text);
            }
        }
        None
    }

    /// Stop accepting client writes while still able to push frames
    pub fn stop_reading(&mut self) {
        self.sent.close();
    }

    /// Drop the connection from the venue side
    pub fn hang_up(self) {}
}

struct ChannelWriter(Option<UnboundedSender<ClientFrame>>);

#[async_trait]
impl FrameWriter for ChannelWriter {
    async fn send(&mut self, message: WsMessage) -> Result<()> {
        let tx = self
            .0
            .as_ref()
            .ok_or_else(|| FeedError::Send("connection closed".into()))?;
        tx.send(ClientFrame::Message(message))
            .map_err(|_| FeedError::Send("peer hung up".into()))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(ClientFrame::Close);
        }
        Ok(())
    }
}

struct ChannelReader(UnboundedReceiver<InboundFrame>);

#[async_trait]
impl FrameReader for ChannelReader {
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>> {
        self.0.recv().await.map(Ok)
    }
}

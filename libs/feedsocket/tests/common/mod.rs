//! Common test utilities for FeedSocket integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use feedsocket::{FeedError, FeedProtocol, FrameHandler, FrameKind, Result, WsMessage};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Notify};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Mock WebSocket venue
///
/// Records every text frame clients send, answers protocol pings, and can
/// push text to or drop every open connection.
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    kick: broadcast::Sender<()>,
    push: broadcast::Sender<String>,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicUsize>,
}

impl MockWsServer {
    /// Create and start a new mock WebSocket server
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let (kick, _) = broadcast::channel(16);
        let (push, _) = broadcast::channel(1024);
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let server = Self {
            addr,
            shutdown: shutdown.clone(),
            kick: kick.clone(),
            push: push.clone(),
            received: received.clone(),
            connections: connections.clone(),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                connections.fetch_add(1, Ordering::AcqRel);
                                let kick_rx = kick.subscribe();
                                let push_rx = push.subscribe();
                                let received = received.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, kick_rx, push_rx, received).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown.notified() => {
                        break;
                    }
                }
            }
        });

        server
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        mut kick: broadcast::Receiver<()>,
        mut push: broadcast::Receiver<String>,
        received: Arc<Mutex<Vec<String>>>,
    ) {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => received.lock().push(text),
                        Some(Ok(Message::Ping(data))) => {
                            if write.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => {}
                    }
                }
                text = push.recv() => {
                    match text {
                        Ok(text) => {
                            if write.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = kick.recv() => {
                    // drop without a close handshake
                    break;
                }
            }
        }
    }

    /// Get the WebSocket URL for this server
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Send a text frame to every open connection
    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.push.send(text.into());
    }

    /// Drop every open connection
    pub fn drop_connections(&self) {
        let _ = self.kick.send(());
    }

    /// Text frames received from clients so far
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Connections accepted so far
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }

    /// Shutdown the server
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
        self.drop_connections();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Line-based test protocol: `sub <topic>`, `unsub <topic>`, `ping`/`pong`
pub struct LineProtocol {
    pub url: String,
    pub heartbeat: Option<Duration>,
}

impl LineProtocol {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            heartbeat: None,
        }
    }

    pub fn with_heartbeat(mut self, every: Duration) -> Self {
        self.heartbeat = Some(every);
        self
    }
}

#[async_trait]
impl FeedProtocol for LineProtocol {
    type Subscription = String;

    fn endpoint(&self) -> String {
        self.url.clone()
    }

    fn subscribe_frames(&self, subs: &[String]) -> Result<Vec<WsMessage>> {
        if subs.iter().any(|s| s.is_empty()) {
            return Err(FeedError::Encode("empty topic".into()));
        }
        Ok(subs.iter().map(|s| WsMessage::text(format!("sub {s}"))).collect())
    }

    fn unsubscribe_frames(&self, subs: &[String]) -> Result<Vec<WsMessage>> {
        Ok(subs.iter().map(|s| WsMessage::text(format!("unsub {s}"))).collect())
    }

    fn heartbeat_interval(&self) -> Option<Duration> {
        self.heartbeat
    }

    fn heartbeat_frame(&self) -> Option<WsMessage> {
        self.heartbeat.map(|_| WsMessage::text("ping"))
    }

    fn classify(&self, message: &WsMessage) -> FrameKind {
        match message.as_text() {
            Some("pong") => FrameKind::Control,
            Some("server-ping") => FrameKind::Ping(WsMessage::text("server-pong")),
            _ => FrameKind::Payload,
        }
    }
}

/// Frame handler that records everything it sees
#[derive(Clone, Default)]
pub struct Recorder {
    pub frames: Arc<Mutex<Vec<(u64, String)>>>,
    pub sessions_started: Arc<Mutex<Vec<u64>>>,
    pub sessions_ended: Arc<Mutex<Vec<u64>>>,
}

impl Recorder {
    pub fn texts(&self) -> Vec<String> {
        self.frames.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

impl FrameHandler for Recorder {
    fn on_frame(&self, session: u64, message: WsMessage) {
        let text = message.as_text().unwrap_or_default().to_string();
        self.frames.lock().push((session, text));
    }

    fn on_session_start(&self, session: u64) {
        self.sessions_started.lock().push(session);
    }

    fn on_session_end(&self, session: u64) {
        self.sessions_ended.lock().push(session);
    }
}

/// Error callback that collects reported errors
pub fn collect_errors() -> (feedsocket::ErrorCallback, Arc<Mutex<Vec<FeedError>>>) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    (Arc::new(move |e| sink.lock().push(e)), errors)
}

/// Poll `check` every 5ms until it holds or `within` elapses
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

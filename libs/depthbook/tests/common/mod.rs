//! Common test utilities for DepthBook integration tests

#![allow(dead_code)]

use crossbeam_channel::{bounded, Receiver, Sender};
use depthbook::{
    BootstrapConfig, ConnectionConfig, DepthError, DepthErrorCallback, DepthSnapshot, PriceLevel,
    SnapshotSource,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
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

// =============================================================================
// Snapshot source
// =============================================================================

/// Snapshot source answering from per-symbol scripts
///
/// Each fetch pops the next scripted response; the last one repeats. With a
/// gate, every fetch blocks until the test releases it.
#[derive(Default)]
pub struct ScriptedSnapshots {
    scripts: Mutex<HashMap<String, VecDeque<Result<DepthSnapshot, DepthError>>>>,
    calls: Mutex<Vec<String>>,
    gate: Option<Receiver<()>>,
}

impl ScriptedSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose fetches wait for a `send(())` on the returned sender
    pub fn gated() -> (Self, Sender<()>) {
        let (release, gate) = bounded(16);
        let source = Self {
            gate: Some(gate),
            ..Self::default()
        };
        (source, release)
    }

    pub fn script(
        self,
        symbol: &str,
        responses: Vec<Result<DepthSnapshot, DepthError>>,
    ) -> Self {
        self.scripts
            .lock()
            .insert(symbol.to_string(), responses.into_iter().collect());
        self
    }

    /// Fetches made for `symbol` so far
    pub fn calls(&self, symbol: &str) -> usize {
        self.calls.lock().iter().filter(|s| s.as_str() == symbol).count()
    }
}

impl SnapshotSource for ScriptedSnapshots {
    fn fetch(&self, wire_symbol: &str, _limit: usize) -> depthbook::Result<DepthSnapshot> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv_timeout(Duration::from_secs(5));
        }
        self.calls.lock().push(wire_symbol.to_string());

        let mut scripts = self.scripts.lock();
        let Some(queue) = scripts.get_mut(wire_symbol) else {
            return Err(DepthError::Snapshot(format!("no script for {}", wire_symbol)));
        };
        match queue.len() {
            0 => Err(DepthError::Snapshot("empty script".into())),
            1 => queue[0].clone(),
            _ => queue.pop_front().unwrap(),
        }
    }
}

pub fn snapshot(sequence: u64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> DepthSnapshot {
    let levels = |side: &[(&str, &str)]| side.iter().map(|(p, q)| PriceLevel::new(*p, *q)).collect();
    DepthSnapshot {
        sequence,
        bids: levels(bids),
        asks: levels(asks),
    }
}

// =============================================================================
// Venue frames
// =============================================================================

/// Binance `depthUpdate` event; `E` is derived from `last`
pub fn binance_update(
    symbol: &str,
    first: u64,
    last: u64,
    bids: &[(&str, &str)],
    asks: &[(&str, &str)],
) -> String {
    let levels = |side: &[(&str, &str)]| -> Vec<[String; 2]> {
        side.iter().map(|(p, q)| [p.to_string(), q.to_string()]).collect()
    };
    serde_json::json!({
        "e": "depthUpdate",
        "E": event_time(last),
        "s": symbol,
        "U": first,
        "u": last,
        "b": levels(bids),
        "a": levels(asks),
    })
    .to_string()
}

/// Gate.io `spot.order_book_update` event
pub fn gate_update(symbol: &str, first: u64, last: u64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> String {
    let levels = |side: &[(&str, &str)]| -> Vec<[String; 2]> {
        side.iter().map(|(p, q)| [p.to_string(), q.to_string()]).collect()
    };
    serde_json::json!({
        "time": 1_700_000_000,
        "channel": "spot.order_book_update",
        "event": "update",
        "result": {
            "t": event_time(last),
            "e": "depthUpdate",
            "E": 1_700_000_000,
            "s": symbol,
            "U": first,
            "u": last,
            "b": levels(bids),
            "a": levels(asks),
        }
    })
    .to_string()
}

pub fn event_time(sequence: u64) -> i64 {
    1_700_000_000_000 + sequence as i64
}

// =============================================================================
// Config and callbacks
// =============================================================================

pub fn fast_connection() -> ConnectionConfig {
    ConnectionConfig {
        reconnect_delay_ms: 1,
        ..Default::default()
    }
}

pub fn fast_bootstrap(attempts: u32) -> BootstrapConfig {
    BootstrapConfig {
        attempts,
        retry_delay_ms: 1,
        depth_limit: None,
    }
}

/// Error callback that collects reported errors
pub fn collect_errors() -> (DepthErrorCallback, Arc<Mutex<Vec<DepthError>>>) {
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

// =============================================================================
// Mock WebSocket venue
// =============================================================================

/// Mock WebSocket venue: records client text frames and broadcasts pushed text
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    push: broadcast::Sender<String>,
    received: Arc<Mutex<Vec<String>>>,
}

impl MockWsServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let (push, _) = broadcast::channel(1024);
        let received = Arc::new(Mutex::new(Vec::new()));

        let server = Self {
            addr,
            shutdown: shutdown.clone(),
            push: push.clone(),
            received: received.clone(),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let push_rx = push.subscribe();
                        let received = received.clone();
                        tokio::spawn(Self::handle_connection(stream, push_rx, received));
                    }
                    _ = shutdown.notified() => break,
                }
            }
        });

        server
    }

    async fn handle_connection(
        stream: tokio::net::TcpStream,
        mut push: broadcast::Receiver<String>,
        received: Arc<Mutex<Vec<String>>>,
    ) {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;
        use tokio_tungstenite::tungstenite::Message;

        let Ok(ws_stream) = accept_async(stream).await else {
            return;
        };
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => received.lock().push(text),
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                text = push.recv() => match text {
                    Ok(text) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn push_text(&self, text: impl Into<String>) {
        let _ = self.push.send(text.into());
    }

    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

// =============================================================================
// Mock REST venue
// =============================================================================

/// One-shot-per-request HTTP responder serving a fixed status and body
pub struct MockHttpServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockHttpServer {
    pub fn start(status: u16, body: &str) -> Self {
        use std::io::{BufRead, BufReader, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();
        let body = body.to_string();

        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                seen.lock().push(request_line.trim_end().to_string());
                let mut header = String::new();
                while reader.read_line(&mut header).is_ok_and(|n| n > 2) {
                    header.clear();
                }

                let response = format!(
                    "HTTP/1.1 {} Mock\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes());
            }
        });

        Self { addr, requests }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Request lines received so far, e.g. `GET /api/v3/depth?... HTTP/1.1`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

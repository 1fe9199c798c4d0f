//! # Connection supervision
//!
//! ```text
//!            start()
//!               │
//!  Disconnected ─► Connecting ─► Live ──(close / read error / idle)──► Reconnecting
//!                      ▲                                                   │
//!                      └──────────────── delay (strategy) ◄───────────────┘
//!                                                                           │
//!                               restarts > limit within window ──► Halted ◄┘
//!  stop() from any state ──► Stopped
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use feedsocket::{Supervisor, SupervisorConfig, WsMessage};
//!
//! let supervisor = Supervisor::builder(MyProtocol::new())
//!     .handler(|session: u64, frame: WsMessage| println!("{session}: {frame:?}"))
//!     .config(SupervisorConfig::default())
//!     .build()?;
//!
//! supervisor.start().await?;
//! supervisor.subscribe(&["btcusdt".to_string()]).await?;
//! // ...
//! supervisor.stop().await;
//! ```

pub mod builder;
pub mod config;
pub mod connection_state;
pub mod heartbeat;
pub mod liveness;
pub mod storm;
pub mod supervisor;
pub mod transport;

pub use builder::{states, SupervisorBuilder};
pub use config::SupervisorConfig;
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
pub use heartbeat::sleep_or_stop;
pub use liveness::LivenessTracker;
pub use storm::RestartGuard;
pub use supervisor::{Supervisor, SupervisorEvent};
pub use transport::{ChannelAcceptor, ChannelPeer, ChannelTransport, ClientFrame, TungsteniteTransport};

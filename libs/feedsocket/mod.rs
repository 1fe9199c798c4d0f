//! # FeedSocket
//!
//! Supervised WebSocket connections for streaming market data.
//!
//! ## Features
//!
//! - **One reader per session**: payload frames reach the handler in arrival order
//! - **Subscription replay**: every reconnect re-sends the current subscription set
//! - **Liveness watchdog**: silent sessions are torn down and redialed
//! - **Restart-storm guard**: too many restarts in a window halts the supervisor
//! - **Type-state builder**: the handler must be set before `build()` exists
//! - **Pluggable seams**: protocol, transport and clock are traits

pub mod core;
pub mod traits;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use core::{
    builder, config, connection_state, heartbeat, liveness, sleep_or_stop, storm, supervisor,
    transport,
    builder::{states, SupervisorBuilder},
    config::SupervisorConfig,
    connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics},
    storm::RestartGuard,
    supervisor::{Supervisor, SupervisorEvent},
    transport::{ChannelAcceptor, ChannelPeer, ChannelTransport, ClientFrame, TungsteniteTransport},
};

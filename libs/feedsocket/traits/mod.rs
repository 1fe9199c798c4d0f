//! # FeedSocket Traits
//!
//! The seams of the supervisor:
//!
//! - **FeedProtocol**: venue endpoint, handshake, subscribe encoding, heartbeat
//! - **FrameHandler**: where payload frames go
//! - **Transport**: dials duplex connections
//! - **Clock**: monotonic time for liveness and restart accounting
//! - **ReconnectionStrategy**: delay between sessions

pub mod clock;
pub mod error;
pub mod handler;
pub mod message;
pub mod protocol;
pub mod reconnect;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{FeedError, Result};
pub use handler::{log_errors, ErrorCallback, FrameHandler};
pub use message::{FrameKind, InboundFrame, WsMessage};
pub use protocol::FeedProtocol;
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use transport::{Connection, FrameReader, FrameWriter, Transport};

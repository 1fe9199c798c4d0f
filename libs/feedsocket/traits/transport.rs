//! Duplex connection seam
//!
//! The supervisor never touches sockets directly. A [`Transport`] dials a URL
//! and returns the two halves of a connection: the writer is shared by the
//! control path and heartbeat task, the reader is owned by the reader task.

use crate::{InboundFrame, Result, WsMessage};
use async_trait::async_trait;

/// Outbound half of a connection
#[async_trait]
pub trait FrameWriter: Send {
    /// Write one application message
    async fn send(&mut self, message: WsMessage) -> Result<()>;

    /// Close the connection (best effort)
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of a connection
#[async_trait]
pub trait FrameReader: Send {
    /// Next frame; `None` once the stream has ended
    async fn next_frame(&mut self) -> Option<Result<InboundFrame>>;
}

/// An open duplex connection, split into halves
pub struct Connection {
    pub writer: Box<dyn FrameWriter>,
    pub reader: Box<dyn FrameReader>,
}

impl Connection {
    pub fn new(writer: Box<dyn FrameWriter>, reader: Box<dyn FrameReader>) -> Self {
        Self { writer, reader }
    }
}

/// Dials duplex connections
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Connection>;
}

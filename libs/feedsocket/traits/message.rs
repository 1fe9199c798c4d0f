/// Application-level WebSocket payload (text or binary)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    pub fn text(text: impl Into<String>) -> Self {
        WsMessage::Text(text.into())
    }

    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(_) => None,
        }
    }

    /// Raw bytes of either variant
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            WsMessage::Text(s) => s.as_bytes(),
            WsMessage::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

/// Everything the reader task can pull off a connection
///
/// Protocol-level ping/pong frames are surfaced so they count towards liveness
/// even though they never reach the frame handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Message(WsMessage),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close(Option<String>),
}

/// How a protocol classifies an inbound application message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameKind {
    /// Market data, forwarded to the frame handler
    Payload,
    /// Protocol heartbeat or acknowledgement; counts as liveness only
    Control,
    /// Server-initiated ping sent as a data message; the reply is written immediately
    Ping(WsMessage),
}

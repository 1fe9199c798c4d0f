//! Inbound payload dispatch
//!
//! The reader task hands every payload frame to a [`FrameHandler`] by direct
//! call, in arrival order. Handlers are expected to be quick: anything slow
//! (snapshot fetches, for example) must be moved onto its own task so the
//! reader never stalls.

use crate::WsMessage;
use std::sync::Arc;

/// Receives payload frames from the reader task of the live session
pub trait FrameHandler: Send + Sync + 'static {
    /// Handle one payload frame
    ///
    /// `session` is the id of the session the frame arrived on.
    /// Failures are the handler's own business; the reader keeps going.
    fn on_frame(&self, session: u64, message: WsMessage);

    /// A new session went live (after subscription replay)
    fn on_session_start(&self, _session: u64) {}

    /// The session ended (read failure, idle, stop)
    fn on_session_end(&self, _session: u64) {}
}

impl<F> FrameHandler for F
where
    F: Fn(u64, WsMessage) + Send + Sync + 'static,
{
    fn on_frame(&self, session: u64, message: WsMessage) {
        self(session, message)
    }
}

/// Callback invoked on every reportable failure
pub type ErrorCallback = Arc<dyn Fn(crate::FeedError) + Send + Sync>;

/// Error callback that only logs
pub fn log_errors() -> ErrorCallback {
    Arc::new(|err| {
        if err.is_fatal() {
            tracing::error!("[Supervisor] {}", err);
        } else {
            tracing::warn!("[Supervisor] {}", err);
        }
    })
}

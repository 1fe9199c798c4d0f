use crate::config::SupervisorConfig;
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState, Metrics};
use crate::heartbeat::{heartbeat_task, liveness_task, sleep_or_stop, LivenessWatchdog, WriterSlot};
use crate::liveness::LivenessTracker;
use crate::storm::RestartGuard;
use crate::traits::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle notifications from the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// Session went live; subscriptions have been replayed
    Connected { session: u64 },
    /// Session ended
    Disconnected { session: u64 },
    /// About to dial again (attempt counts consecutive failures, 1-based)
    Reconnecting { attempt: u32 },
    /// Gave up for good (restart storm or strategy exhausted)
    Halted,
    /// Stopped by the caller
    Stopped,
}

/// Why a session ended
#[derive(Debug)]
enum SessionEnd {
    Stopped,
    Closed(String),
    ReadFailed(FeedError),
    Idle(Duration),
}

impl SessionEnd {
    fn into_error(self) -> Option<FeedError> {
        match self {
            SessionEnd::Stopped => None,
            SessionEnd::Closed(reason) => Some(FeedError::ConnectionClosed(reason)),
            SessionEnd::ReadFailed(e) => Some(e),
            SessionEnd::Idle(idle) => Some(FeedError::Idle(idle)),
        }
    }
}

/// Everything the run loop, control path and timers share
pub(crate) struct Shared<P: FeedProtocol> {
    pub(crate) protocol: Arc<P>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) handler: Arc<dyn FrameHandler>,
    pub(crate) config: SupervisorConfig,
    pub(crate) strategy: Box<dyn ReconnectionStrategy>,
    pub(crate) on_error: ErrorCallback,
    pub(crate) guard: Mutex<RestartGuard>,
    pub(crate) liveness: Arc<LivenessTracker>,
    pub(crate) state: AtomicConnectionState,
    pub(crate) metrics: AtomicMetrics,
    /// Held across every control write so subscribe and replay never interleave
    pub(crate) writer: WriterSlot,
    pub(crate) subscriptions: Mutex<Vec<P::Subscription>>,
    pub(crate) events: Sender<SupervisorEvent>,
    pub(crate) stop_tx: watch::Sender<bool>,
}

/// Keeps one venue connection alive
///
/// - Dials through a [`Transport`], runs the protocol handshake, replays every
///   current subscription, then marks the session live
/// - Hands each payload frame to the [`FrameHandler`] from the reader task
/// - Reconnects on close, read failure or idle silence, after the strategy's delay
/// - Halts for good when restarts exceed the storm limit inside the storm window
///
/// Built with [`Supervisor::builder`].
pub struct Supervisor<P: FeedProtocol> {
    shared: Arc<Shared<P>>,
    events_rx: Receiver<SupervisorEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<P: FeedProtocol> Supervisor<P> {
    pub(crate) fn from_parts(
        protocol: P,
        transport: Arc<dyn Transport>,
        handler: Arc<dyn FrameHandler>,
        clock: Arc<dyn Clock>,
        config: SupervisorConfig,
        strategy: Box<dyn ReconnectionStrategy>,
        on_error: ErrorCallback,
    ) -> Result<Self> {
        config.validate()?;

        let (events, events_rx) = unbounded();
        let (stop_tx, _) = watch::channel(false);
        let guard = RestartGuard::new(clock.clone(), config.storm_window, config.storm_limit);

        let shared = Arc::new(Shared {
            protocol: Arc::new(protocol),
            transport,
            handler,
            liveness: Arc::new(LivenessTracker::new(clock)),
            config,
            strategy,
            on_error,
            guard: Mutex::new(guard),
            state: AtomicConnectionState::new(ConnectionState::Disconnected),
            metrics: AtomicMetrics::new(),
            writer: Arc::new(tokio::sync::Mutex::new(None)),
            subscriptions: Mutex::new(Vec::new()),
            events,
            stop_tx,
        });

        Ok(Self {
            shared,
            events_rx,
            task: Mutex::new(None),
        })
    }

    /// Open the first session and start supervising
    ///
    /// Fails if the first connect fails; nothing is retried in that case.
    pub async fn start(&self) -> Result<()> {
        if self.shared.state.get() != ConnectionState::Disconnected {
            return Err(FeedError::InvalidState(format!(
                "start called in state {:?}",
                self.shared.state.get()
            )));
        }

        let (session, reader) = match open_session(&self.shared).await {
            Ok(opened) => opened,
            Err(e) => {
                self.shared.state.advance(ConnectionState::Disconnected);
                return Err(e);
            }
        };
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            run_supervisor(shared, session, reader).await;
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Add subscriptions; sent immediately when live, replayed on every reconnect
    ///
    /// Subscriptions already present are ignored. A failed write is reported
    /// through the error callback and does not tear the session down.
    pub async fn subscribe(&self, subs: &[P::Subscription]) -> Result<()> {
        let mut slot = self.shared.writer.lock().await;

        let mut added: Vec<P::Subscription> = Vec::new();
        {
            let current = self.shared.subscriptions.lock();
            for sub in subs {
                if !current.contains(sub) && !added.contains(sub) {
                    added.push(sub.clone());
                }
            }
        }
        if added.is_empty() {
            return Ok(());
        }

        let frames = self.shared.protocol.subscribe_frames(&added)?;
        self.shared.subscriptions.lock().extend(added.iter().cloned());
        if self.shared.state.is_live() {
            if let Some(writer) = slot.as_mut() {
                debug!("[Supervisor] Subscribing {:?}", added);
                send_control(&self.shared, writer.as_mut(), frames).await;
            }
        }
        Ok(())
    }

    /// Remove subscriptions; unknown ones are ignored
    pub async fn unsubscribe(&self, subs: &[P::Subscription]) -> Result<()> {
        let mut slot = self.shared.writer.lock().await;

        let removed: Vec<P::Subscription> = {
            let mut current = self.shared.subscriptions.lock();
            let before = current.clone();
            current.retain(|s| !subs.contains(s));
            before.into_iter().filter(|s| subs.contains(s)).collect()
        };
        if removed.is_empty() {
            return Ok(());
        }

        let frames = self.shared.protocol.unsubscribe_frames(&removed)?;
        if self.shared.state.is_live() {
            if let Some(writer) = slot.as_mut() {
                debug!("[Supervisor] Unsubscribing {:?}", removed);
                send_control(&self.shared, writer.as_mut(), frames).await;
            }
        }
        Ok(())
    }

    /// Stop supervising and close the connection
    ///
    /// Nothing is reported through the error callback for a caller-initiated
    /// stop. Idempotent.
    pub async fn stop(&self) {
        let previous = self.shared.state.get();
        if !previous.is_terminal() {
            self.shared.state.set(ConnectionState::Stopped);
        }
        let _ = self.shared.stop_tx.send(true);

        if let Some(mut writer) = self.shared.writer.lock().await.take() {
            let _ = writer.close().await;
        }

        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("[Supervisor] Run loop ended abnormally: {}", e);
            }
        }

        if !previous.is_terminal() {
            info!("[Supervisor] Stopped");
            let _ = self.shared.events.send(SupervisorEvent::Stopped);
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    pub fn is_live(&self) -> bool {
        self.shared.state.is_live()
    }

    pub fn metrics(&self) -> Metrics {
        self.shared.metrics.snapshot(self.shared.state.get())
    }

    /// Current subscriptions, in subscribe order
    pub fn subscriptions(&self) -> Vec<P::Subscription> {
        self.shared.subscriptions.lock().clone()
    }

    pub fn protocol(&self) -> &P {
        &self.shared.protocol
    }

    /// Receiver for lifecycle events; every clone sees a share of the stream
    pub fn events(&self) -> Receiver<SupervisorEvent> {
        self.events_rx.clone()
    }

    pub fn try_recv_event(&self) -> Option<SupervisorEvent> {
        self.events_rx.try_recv().ok()
    }
}

/// Write control frames; failures are reported, never fatal to the session
async fn send_control<P: FeedProtocol>(
    shared: &Shared<P>,
    writer: &mut dyn FrameWriter,
    frames: Vec<WsMessage>,
) {
    for frame in frames {
        match writer.send(frame).await {
            Ok(()) => shared.metrics.increment_sent(),
            Err(e) => {
                (shared.on_error)(e);
                return;
            }
        }
    }
}

/// Dial, handshake, replay subscriptions and go live
///
/// Returns the new session id and the reader half.
async fn open_session<P: FeedProtocol>(
    shared: &Arc<Shared<P>>,
) -> Result<(u64, Box<dyn FrameReader>)> {
    if !shared.state.advance(ConnectionState::Connecting) {
        return Err(FeedError::Stopped);
    }

    let url = shared.protocol.endpoint();
    let dial = async {
        let mut connection = shared.transport.connect(&url).await?;
        if let Some(hello) = shared.protocol.handshake().await? {
            connection.writer.send(hello).await?;
            shared.metrics.increment_sent();
            debug!("[Supervisor] Sent handshake");
        }
        Ok::<_, FeedError>(connection)
    };
    let connection = tokio::time::timeout(shared.config.connect_timeout, dial)
        .await
        .map_err(|_| {
            FeedError::Timeout(format!(
                "connect to {} exceeded {:?}",
                url, shared.config.connect_timeout
            ))
        })??;

    let Connection { mut writer, reader } = connection;

    let mut slot = shared.writer.lock().await;
    if *shared.stop_tx.borrow() {
        let _ = writer.close().await;
        return Err(FeedError::Stopped);
    }

    let subs = shared.subscriptions.lock().clone();
    if !subs.is_empty() {
        let frames = shared.protocol.subscribe_frames(&subs)?;
        for frame in frames {
            writer.send(frame).await?;
            shared.metrics.increment_sent();
        }
        debug!("[Supervisor] Replayed {} subscription(s)", subs.len());
    }

    let session = shared.metrics.next_session();
    shared.liveness.record();
    *slot = Some(writer);
    if !shared.state.advance(ConnectionState::Live) {
        if let Some(mut writer) = slot.take() {
            let _ = writer.close().await;
        }
        return Err(FeedError::Stopped);
    }
    drop(slot);

    info!("[Supervisor] Session {} live on {}", session, url);
    shared.handler.on_session_start(session);
    let _ = shared.events.send(SupervisorEvent::Connected { session });
    Ok((session, reader))
}

/// Read one session until it ends
async fn read_session<P: FeedProtocol>(
    shared: &Arc<Shared<P>>,
    session: u64,
    mut reader: Box<dyn FrameReader>,
    stop: &mut watch::Receiver<bool>,
) -> SessionEnd {
    // Session-scoped stop for the timer tasks
    let (timers_stop, timers_stop_rx) = watch::channel(false);
    let (expired_tx, mut expired) = watch::channel(None);

    let watchdog = LivenessWatchdog::new(
        Arc::clone(&shared.liveness),
        shared.config.idle_timeout,
        shared.config.liveness_check_interval,
    );
    let liveness = tokio::spawn(liveness_task(watchdog, timers_stop_rx.clone(), expired_tx));

    let heartbeat = shared.protocol.heartbeat_interval().map(|interval| {
        let protocol = Arc::clone(&shared.protocol);
        tokio::spawn(heartbeat_task(
            interval,
            move || protocol.heartbeat_frame(),
            Arc::clone(&shared.writer),
            Arc::clone(&shared.on_error),
            timers_stop_rx,
        ))
    });

    let end = loop {
        if *stop.borrow() {
            break SessionEnd::Stopped;
        }

        tokio::select! {
            biased;

            _ = stop.changed() => break SessionEnd::Stopped,

            Ok(()) = expired.changed() => {
                let idle = (*expired.borrow()).unwrap_or_default();
                warn!("[Supervisor] Session {} idle for {:?}", session, idle);
                break SessionEnd::Idle(idle);
            }

            frame = reader.next_frame() => match frame {
                Some(Ok(InboundFrame::Message(message))) => {
                    shared.liveness.record();
                    shared.metrics.increment_received();
                    match shared.protocol.classify(&message) {
                        FrameKind::Payload => shared.handler.on_frame(session, message),
                        FrameKind::Control => {}
                        FrameKind::Ping(reply) => {
                            debug!("[Supervisor] Passive ping, replying");
                            if let Some(writer) = shared.writer.lock().await.as_mut() {
                                send_control(shared, writer.as_mut(), vec![reply]).await;
                            }
                        }
                    }
                }
                Some(Ok(InboundFrame::Ping(_))) | Some(Ok(InboundFrame::Pong(_))) => {
                    shared.liveness.record();
                }
                Some(Ok(InboundFrame::Close(reason))) => {
                    if *stop.borrow() {
                        break SessionEnd::Stopped;
                    }
                    break SessionEnd::Closed(reason.unwrap_or_else(|| "close frame".into()));
                }
                Some(Err(e)) => {
                    if *stop.borrow() {
                        break SessionEnd::Stopped;
                    }
                    break SessionEnd::ReadFailed(e);
                }
                None => {
                    if *stop.borrow() {
                        break SessionEnd::Stopped;
                    }
                    break SessionEnd::Closed("stream ended".into());
                }
            }
        }
    };

    let _ = timers_stop.send(true);
    let _ = liveness.await;
    if let Some(handle) = heartbeat {
        let _ = handle.await;
    }
    if let Some(mut writer) = shared.writer.lock().await.take() {
        let _ = writer.close().await;
    }
    shared.handler.on_session_end(session);
    end
}

fn halt<P: FeedProtocol>(shared: &Shared<P>, err: FeedError) {
    error!("[Supervisor] Halting: {}", err);
    shared.state.set(ConnectionState::Halted);
    (shared.on_error)(err);
    let _ = shared.events.send(SupervisorEvent::Halted);
}

/// Main supervisor loop: read a session, then reconnect until stopped or halted
async fn run_supervisor<P: FeedProtocol>(
    shared: Arc<Shared<P>>,
    first_session: u64,
    first_reader: Box<dyn FrameReader>,
) {
    let mut stop = shared.stop_tx.subscribe();
    let mut live = Some((first_session, first_reader));

    loop {
        if let Some((session, reader)) = live.take() {
            let end = read_session(&shared, session, reader, &mut stop).await;
            let _ = shared.events.send(SupervisorEvent::Disconnected { session });

            match end.into_error() {
                None => break,
                Some(err) => {
                    if shared.state.get().is_terminal() {
                        break;
                    }
                    warn!("[Supervisor] Session {} ended: {}", session, err);
                    (shared.on_error)(err);
                }
            }
        }

        let mut attempt: u32 = 0;
        loop {
            if !shared.state.advance(ConnectionState::Reconnecting) {
                debug!("[Supervisor] Terminal state, not reconnecting");
                return;
            }
            attempt += 1;

            let recorded = shared.guard.lock().record_restart();
            if let Err(storm) = recorded {
                halt(&shared, storm);
                return;
            }

            let Some(delay) = shared.strategy.next_delay(attempt) else {
                halt(
                    &shared,
                    FeedError::Transport(format!(
                        "reconnection strategy exhausted after {} attempt(s)",
                        attempt - 1
                    )),
                );
                return;
            };

            info!("[Supervisor] Reconnecting in {:?} (attempt {})", delay, attempt);
            let _ = shared.events.send(SupervisorEvent::Reconnecting { attempt });
            if sleep_or_stop(&mut stop, delay).await {
                debug!("[Supervisor] Stop requested during reconnect delay");
                return;
            }

            shared.metrics.increment_reconnects();
            match open_session(&shared).await {
                Ok(opened) => {
                    live = Some(opened);
                    break;
                }
                Err(FeedError::Stopped) => return,
                Err(e) => {
                    if shared.state.get().is_terminal() {
                        return;
                    }
                    warn!("[Supervisor] Reconnect attempt {} failed: {}", attempt, e);
                    (shared.on_error)(e);
                }
            }
        }
    }

    debug!("[Supervisor] Run loop exiting");
}

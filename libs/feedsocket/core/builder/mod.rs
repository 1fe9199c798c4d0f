pub mod states;

use crate::config::SupervisorConfig;
use crate::supervisor::Supervisor;
use crate::traits::*;
use crate::transport::TungsteniteTransport;
use states::*;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-state builder for [`Supervisor`]
///
/// The protocol is given up front; the frame handler is required before
/// `build()` becomes available. Everything else has a default:
///
/// | Setting     | Default                                   |
/// |-------------|-------------------------------------------|
/// | transport   | [`TungsteniteTransport`]                  |
/// | clock       | [`SystemClock`]                           |
/// | config      | [`SupervisorConfig::default`]             |
/// | reconnect   | [`FixedDelay`] of `config.reconnect_delay`|
/// | on_error    | [`log_errors`]                            |
pub struct SupervisorBuilder<P, H>
where
    P: FeedProtocol,
    H: HandlerState,
{
    _state: PhantomData<H>,
    protocol: P,
    handler: Option<Arc<dyn FrameHandler>>,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<Arc<dyn Clock>>,
    config: SupervisorConfig,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    on_error: Option<ErrorCallback>,
}

impl<P: FeedProtocol> Supervisor<P> {
    pub fn builder(protocol: P) -> SupervisorBuilder<P, NoHandler> {
        SupervisorBuilder {
            _state: PhantomData,
            protocol,
            handler: None,
            transport: None,
            clock: None,
            config: SupervisorConfig::default(),
            reconnect_strategy: None,
            on_error: None,
        }
    }
}

// Handler setting
impl<P: FeedProtocol> SupervisorBuilder<P, NoHandler> {
    pub fn handler(self, handler: impl FrameHandler) -> SupervisorBuilder<P, HasHandler> {
        self.shared_handler(Arc::new(handler))
    }

    /// Same as [`handler`](Self::handler) for a handler the caller keeps a reference to
    pub fn shared_handler(self, handler: Arc<dyn FrameHandler>) -> SupervisorBuilder<P, HasHandler> {
        SupervisorBuilder {
            _state: PhantomData,
            protocol: self.protocol,
            handler: Some(handler),
            transport: self.transport,
            clock: self.clock,
            config: self.config,
            reconnect_strategy: self.reconnect_strategy,
            on_error: self.on_error,
        }
    }
}

// Optional configuration methods
impl<P, H> SupervisorBuilder<P, H>
where
    P: FeedProtocol,
    H: HandlerState,
{
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: SupervisorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    /// Called for every reportable failure; fatal ones carry `is_fatal() == true`
    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }
}

// Build method - only available once the handler is set
impl<P: FeedProtocol> SupervisorBuilder<P, HasHandler> {
    pub fn build(self) -> Result<Supervisor<P>> {
        let handler = self
            .handler
            .ok_or_else(|| FeedError::Configuration("frame handler must be set".into()))?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(TungsteniteTransport));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(FixedDelay::new(self.config.reconnect_delay, None)));
        let on_error = self.on_error.unwrap_or_else(log_errors);

        Supervisor::from_parts(
            self.protocol,
            transport,
            handler,
            clock,
            self.config,
            strategy,
            on_error,
        )
    }
}

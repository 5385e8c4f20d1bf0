//! SSE connection state machine.
//!
//! [`SseConnection`] is the object callers hold. It owns one transport
//! stream at a time, moves through [`EventState`] as the transport reports
//! progress, dispatches events to registered handlers, and re-opens the
//! stream through its [`ReconnectController`] when automatic reconnection is
//! enabled.
//!
//! Nothing runs in the background. The caller drives the connection with
//! [`SseConnection::next_step`] or [`SseConnection::run`]; handlers run inside
//! those calls, in registration order.

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::ConnectionConfig;
use crate::error::{SseError, SseResult, TransportError};
use crate::message::{SseMessage, DEFAULT_EVENT_NAME};
use crate::reconnect::{ReconnectController, RetryDecision};
use crate::registry::{ErrorHandler, HandlerRegistry, MessageHandler, StateHandler};
use crate::state::EventState;
use crate::transport::{Transport, TransportHandle, TransportSignal};

/// Control commands sent through an [`SseHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SseCommand {
    /// Close the connection.
    Close,
    /// Reconnect immediately, ignoring the retry budget.
    Reconnect,
}

/// Clone-able control handle for an [`SseConnection`].
///
/// Commands are applied by the connection as soon as the handler that queued
/// them returns: the remaining handlers of that dispatch are skipped, and the
/// command runs before the next transport signal or retry. This is how a
/// handler closes or reconnects the connection that is calling it.
#[derive(Debug, Clone)]
pub struct SseHandle {
    cmd_tx: mpsc::UnboundedSender<SseCommand>,
}

impl SseHandle {
    /// Request a close.
    pub fn close(&self) -> SseResult<()> {
        self.send(SseCommand::Close)
    }

    /// Request a manual reconnection.
    pub fn reconnect(&self) -> SseResult<()> {
        self.send(SseCommand::Reconnect)
    }

    fn send(&self, command: SseCommand) -> SseResult<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| SseError::closed("SSE connection dropped"))
    }
}

enum Step {
    Command(SseCommand),
    RetryDue(u32),
    Signal(TransportSignal),
}

/// A client connection to one Server-Sent Events stream.
///
/// Mutating methods return `&mut Self` so registrations can be chained.
///
/// # Example
///
/// ```
/// use archimedes_eventsource::transport::ChannelTransport;
/// use archimedes_eventsource::{EventState, MessageHandler, SseConnection};
///
/// let (transport, _controller) = ChannelTransport::new();
/// let mut conn = SseConnection::connect(transport, "https://example.test/events").unwrap();
///
/// conn.on("update", MessageHandler::new(|msg| println!("update: {}", msg.data())))
///     .on_message(MessageHandler::new(|msg| println!("message: {}", msg.data())))
///     .setup_auto_reconnect();
///
/// assert_eq!(conn.connection_state(), EventState::Connecting);
/// assert!(conn.is_auto_reconnect_enabled());
/// ```
pub struct SseConnection<T: Transport> {
    config: ConnectionConfig,
    state: EventState,
    transport: T,
    stream: Option<T::Handle>,
    registry: HandlerRegistry,
    retry: ReconnectController,
    last_event_id: Option<String>,
    cmd_tx: mpsc::UnboundedSender<SseCommand>,
    cmd_rx: mpsc::UnboundedReceiver<SseCommand>,
}

impl<T: Transport> SseConnection<T> {
    /// Connect to `url` with the default configuration.
    ///
    /// The transport is asked to open the stream immediately; the connection
    /// starts in [`EventState::Connecting`].
    pub fn connect(transport: T, url: impl Into<String>) -> SseResult<Self> {
        Self::connect_with_config(transport, ConnectionConfig::new(url))
    }

    /// Connect with an explicit configuration.
    ///
    /// Invalid URLs and out-of-range settings are rejected here, before the
    /// transport is touched.
    pub fn connect_with_config(transport: T, config: ConnectionConfig) -> SseResult<Self> {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let retry = ReconnectController::new(&config);
        let mut connection = Self {
            config,
            state: EventState::Connecting,
            transport,
            stream: None,
            registry: HandlerRegistry::new(),
            retry,
            last_event_id: None,
            cmd_tx,
            cmd_rx,
        };
        connection.open_stream();
        Ok(connection)
    }

    // -- Read-only accessors ------------------------------------------------

    /// Get the stream URL.
    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Get the configuration this connection was created with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Get the current state.
    pub fn connection_state(&self) -> EventState {
        self.state
    }

    /// Check if the stream is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Check if the connection was closed.
    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Automatic attempts made since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.retry.retry_count()
    }

    /// Check if automatic reconnection was enabled.
    pub fn is_auto_reconnect_enabled(&self) -> bool {
        self.retry.is_enabled()
    }

    /// Check if a reconnection attempt is waiting on its timer.
    pub fn is_retry_pending(&self) -> bool {
        self.retry.is_pending()
    }

    /// The id of the most recent event that carried one.
    ///
    /// Passed to [`Transport::open`] on every later open so the stream can
    /// resume with `Last-Event-ID`.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Number of handlers registered for `event_name`.
    pub fn handler_count(&self, event_name: &str) -> usize {
        self.registry.handler_count(event_name)
    }

    /// Get a control handle for this connection.
    pub fn handle(&self) -> SseHandle {
        SseHandle {
            cmd_tx: self.cmd_tx.clone(),
        }
    }

    // -- Handler registration -----------------------------------------------

    /// Register `handler` for events named `event_name`.
    pub fn on(&mut self, event_name: impl Into<String>, handler: MessageHandler) -> &mut Self {
        self.registry.register(event_name, handler);
        self
    }

    /// Register `handler` for unnamed events.
    pub fn on_message(&mut self, handler: MessageHandler) -> &mut Self {
        self.on(DEFAULT_EVENT_NAME, handler)
    }

    /// Register `handler` to run each time the stream opens.
    pub fn on_open(&mut self, handler: StateHandler) -> &mut Self {
        self.registry.register_open(handler);
        self
    }

    /// Register `handler` to run on transport errors.
    pub fn on_error(&mut self, handler: ErrorHandler) -> &mut Self {
        self.registry.register_error(handler);
        self
    }

    /// Remove one registration of `handler` for `event_name`.
    pub fn off(&mut self, event_name: &str, handler: &MessageHandler) -> &mut Self {
        if !self.registry.unregister(event_name, handler) {
            debug!(event = event_name, "no matching handler to remove");
        }
        self
    }

    // -- Lifecycle ----------------------------------------------------------

    /// Enable automatic reconnection after transport errors.
    ///
    /// Applies to errors reported from now on.
    pub fn setup_auto_reconnect(&mut self) -> &mut Self {
        self.retry.enable();
        debug!(
            url = %self.config.url,
            max_retries = self.config.max_retries,
            interval_ms = self.config.reconnect_interval_ms,
            "SSE auto-reconnect enabled"
        );
        self
    }

    /// Re-open the stream now.
    ///
    /// Allowed from any state, including `Closed`. Cancels a pending
    /// automatic attempt and restores the full retry budget.
    pub fn reconnect(&mut self) -> &mut Self {
        self.retry.reset();
        info!(url = %self.config.url, from = %self.state, "SSE manual reconnect");
        self.open_stream();
        self
    }

    /// Close the connection. Closing a closed connection does nothing.
    pub fn close(&mut self) -> &mut Self {
        if self.state == EventState::Closed {
            return self;
        }
        if self.retry.cancel() {
            debug!(url = %self.config.url, "pending SSE reconnect cancelled");
        }
        self.terminate_stream();
        self.state = EventState::Closed;
        info!(url = %self.config.url, "SSE connection closed");
        self
    }

    // -- Driver -------------------------------------------------------------

    /// Process one unit of work: a control command, a due reconnection, or
    /// one transport signal.
    ///
    /// Returns `false` without waiting when there is nothing left to wait
    /// for: the connection is closed, or failed with no attempt pending.
    #[instrument(skip(self), fields(url = %self.config.url, state = %self.state))]
    pub async fn next_step(&mut self) -> bool {
        if let Ok(command) = self.cmd_rx.try_recv() {
            self.apply_command(command);
            return true;
        }
        if self.stream.is_none() && !self.retry.is_pending() {
            return false;
        }

        let step = {
            let cmd_rx = &mut self.cmd_rx;
            let retry = &mut self.retry;
            let stream = &mut self.stream;
            tokio::select! {
                biased;

                Some(command) = cmd_rx.recv() => Step::Command(command),
                attempt = retry.due() => Step::RetryDue(attempt),
                signal = next_signal(stream) => Step::Signal(signal),
            }
        };

        match step {
            Step::Command(command) => self.apply_command(command),
            Step::RetryDue(attempt) => self.retry_now(attempt),
            Step::Signal(signal) => self.handle_signal(signal),
        }
        true
    }

    /// Drive the connection until [`next_step`](Self::next_step) reports it
    /// idle.
    pub async fn run(&mut self) {
        while self.next_step().await {}
        debug!(url = %self.config.url, state = %self.state, "SSE connection idle");
    }

    // -- Internal -----------------------------------------------------------

    fn handle_signal(&mut self, signal: TransportSignal) {
        match signal {
            TransportSignal::Opened => self.handle_opened(),
            TransportSignal::Message(raw) => {
                if self.state != EventState::Open {
                    debug!(state = %self.state, "SSE message ignored");
                    return;
                }
                if let Some(id) = &raw.id {
                    self.last_event_id = Some(id.clone());
                }
                let message = SseMessage::from_raw(raw, self.config.url.as_str());
                let cmd_rx = &self.cmd_rx;
                let delivered = self
                    .registry
                    .dispatch_until(message.event_name(), &message, || !cmd_rx.is_empty());
                debug!(
                    event = message.event_name(),
                    id = message.id(),
                    delivered,
                    "SSE message dispatched"
                );
                self.drain_commands();
            }
            TransportSignal::Error(error) => self.handle_error(&error),
        }
    }

    fn handle_opened(&mut self) {
        if self.state != EventState::Connecting {
            debug!(state = %self.state, "SSE open signal ignored");
            return;
        }
        self.state = EventState::Open;
        self.retry.on_open();
        info!(url = %self.config.url, "SSE connection open");
        let cmd_rx = &self.cmd_rx;
        self.registry
            .dispatch_open_until(EventState::Open, || !cmd_rx.is_empty());
        self.drain_commands();
    }

    fn handle_error(&mut self, error: &TransportError) {
        if !self.state.has_transport() {
            debug!(state = %self.state, error = %error, "SSE error signal ignored");
            return;
        }
        self.terminate_stream();
        self.state = EventState::Error;
        warn!(url = %self.config.url, error = %error, "SSE transport error");

        // Armed before handlers run; a close or reconnect from a handler
        // cancels it, and a panicking handler leaves it pending.
        self.schedule_retry();
        let cmd_rx = &self.cmd_rx;
        self.registry.dispatch_error_until(error, || !cmd_rx.is_empty());
        self.drain_commands();
    }

    fn schedule_retry(&mut self) {
        match self.retry.on_error() {
            RetryDecision::Scheduled { attempt, delay } => info!(
                url = %self.config.url,
                attempt,
                max_retries = self.config.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "SSE reconnect scheduled"
            ),
            RetryDecision::AlreadyPending => debug!("SSE reconnect already pending"),
            RetryDecision::Exhausted => warn!(
                url = %self.config.url,
                max_retries = self.config.max_retries,
                "SSE retry budget exhausted, not reconnecting"
            ),
            RetryDecision::Disabled => debug!("SSE auto-reconnect disabled"),
        }
    }

    fn retry_now(&mut self, attempt: u32) {
        if self.state != EventState::Error {
            debug!(state = %self.state, attempt, "SSE reconnect no longer needed");
            return;
        }
        info!(url = %self.config.url, attempt, "SSE reconnecting");
        self.open_stream();
    }

    fn apply_command(&mut self, command: SseCommand) {
        debug!(?command, "SSE command received");
        match command {
            SseCommand::Close => {
                self.close();
            }
            SseCommand::Reconnect => {
                self.reconnect();
            }
        }
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.cmd_rx.try_recv() {
            self.apply_command(command);
        }
    }

    fn open_stream(&mut self) {
        self.terminate_stream();
        self.state = EventState::Connecting;
        info!(
            url = %self.config.url,
            with_credentials = self.config.with_credentials,
            last_event_id = self.last_event_id.as_deref(),
            "SSE connecting"
        );
        let handle = self.transport.open(
            &self.config.url,
            self.config.with_credentials,
            self.last_event_id.as_deref(),
        );
        self.stream = Some(handle);
    }

    fn terminate_stream(&mut self) {
        if let Some(mut handle) = self.stream.take() {
            handle.terminate();
        }
    }
}

impl<T: Transport> Drop for SseConnection<T> {
    fn drop(&mut self) {
        self.terminate_stream();
    }
}

impl<T: Transport> std::fmt::Debug for SseConnection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseConnection")
            .field("url", &self.config.url)
            .field("state", &self.state)
            .field("retry_count", &self.retry.retry_count())
            .field("auto_reconnect", &self.retry.is_enabled())
            .field("retry_pending", &self.retry.is_pending())
            .finish_non_exhaustive()
    }
}

/// Next signal from the current stream; never completes without one.
async fn next_signal<H: TransportHandle>(stream: &mut Option<H>) -> TransportSignal {
    match stream {
        Some(handle) => handle
            .next()
            .await
            .unwrap_or(TransportSignal::Error(TransportError::StreamAborted)),
        None => std::future::pending().await,
    }
}

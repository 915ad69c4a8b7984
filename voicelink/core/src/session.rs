//! Session Façade
//!
//! The public object a host holds: one connection to the synthesis service,
//! one playback queue, one handler, one interrupt coordinator.
//!
//! # Driving a Session
//!
//! A session does nothing on its own. The host drives it from a single task,
//! either by awaiting [`Session::step`] (cancel-safe, so it can sit inside
//! the host's own `tokio::select!`) or by calling [`Session::poll`] from a
//! frame loop.
//!
//! ```ignore
//! let mut session = Session::new(config, Box::new(output), Arc::new(decoder));
//! session.on_event(|event| println!("{event:?}"));
//! session.connect("ws://localhost:3001").await?;
//! session.send_request("Hello", "yuki", None).await?;
//! while session.step().await {}
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use crate::audio::{AudioOutput, MediaDecoder};
use crate::config::ClientConfig;
use crate::error::{SessionError, SessionResult};
use crate::events::{SessionEvent, StreamOutcome};
use crate::interrupt::{InterruptCoordinator, InterruptReport};
use crate::messages::{ClientId, ClientMessage, ServerMessage, StreamRequest, SynthesisConfig};
use crate::playback::{PlaybackQueue, QueueState, QueueStats, UnitId};
use crate::protocol::{DecodedChunk, Dispatch, HandlerStats, StreamHandler};
use crate::transport::{create_transport, SynthesisTransport, TransportError};

/// Session lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the remote side to assign an identity
    Connecting,
    /// Ready for requests
    Open,
    /// No connection
    Closed,
}

type EventCallback = Box<dyn FnMut(SessionEvent) + Send>;
type ErrorCallback = Box<dyn FnMut(&SessionError) + Send>;

/// What woke a `step`
enum Wake {
    Finished(UnitId),
    Decoded(DecodedChunk),
    Inbound(Result<ServerMessage, TransportError>),
}

/// Interruptible audio-response streaming session
pub struct Session {
    config: ClientConfig,
    state: SessionState,
    client_id: Option<ClientId>,
    transport: Option<Box<dyn SynthesisTransport>>,
    queue: PlaybackQueue,
    handler: StreamHandler,
    interrupts: InterruptCoordinator,
    /// A request was sent and has not settled yet
    in_flight: bool,
    outcome: Option<StreamOutcome>,
    on_event: Option<EventCallback>,
    on_error: Option<ErrorCallback>,
}

impl Session {
    /// Create a closed session
    pub fn new(
        config: ClientConfig,
        output: Box<dyn AudioOutput>,
        decoder: Arc<dyn MediaDecoder>,
    ) -> Self {
        let handler = StreamHandler::new(decoder, config.default_mime_type.clone())
            .with_discard_until_ack(config.discard_until_interrupt_ack)
            .with_ack_timeout(config.interrupt_ack_timeout());

        Self {
            queue: PlaybackQueue::new(output),
            handler,
            interrupts: InterruptCoordinator::new(),
            state: SessionState::Closed,
            client_id: None,
            transport: None,
            in_flight: false,
            outcome: None,
            on_event: None,
            on_error: None,
            config,
        }
    }

    // ========================================================================
    // Callbacks
    // ========================================================================

    /// Register the event handler, replacing any previous one
    pub fn on_event<F>(&mut self, callback: F)
    where
        F: FnMut(SessionEvent) + Send + 'static,
    {
        self.on_event = Some(Box::new(callback));
    }

    /// Register the error handler, replacing any previous one
    pub fn on_error<F>(&mut self, callback: F)
    where
        F: FnMut(&SessionError) + Send + 'static,
    {
        self.on_error = Some(Box::new(callback));
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Connect to the synthesis service at `address`
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyConnected` unless the session is
    /// closed, or `SessionError::Connection` if the address is unsupported or
    /// the session cannot be established.
    pub async fn connect(&mut self, address: &str) -> SessionResult<()> {
        if self.state != SessionState::Closed {
            return Err(SessionError::AlreadyConnected);
        }

        let transport = match create_transport(address, &self.config.transport) {
            Ok(transport) => transport,
            Err(e) => {
                let err = SessionError::Connection(e.to_string());
                self.report(&err);
                return Err(err);
            }
        };
        self.connect_with(transport).await
    }

    /// Establish the session over a caller-supplied transport
    ///
    /// Resolves once the remote side has assigned a client identity. Any
    /// other message that arrives first is handled right after. Bounded by
    /// the configured connect timeout.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyConnected` unless the session is
    /// closed, or `SessionError::Connection` if the channel cannot be opened,
    /// closes before confirming, or the timeout elapses.
    pub async fn connect_with(
        &mut self,
        mut transport: Box<dyn SynthesisTransport>,
    ) -> SessionResult<()> {
        if self.state != SessionState::Closed {
            return Err(SessionError::AlreadyConnected);
        }
        self.state = SessionState::Connecting;

        let mut early = VecDeque::new();
        let handshake = handshake(transport.as_mut(), &mut early);
        let result = match self.config.transport.connect_timeout() {
            Some(limit) => match tokio::time::timeout(limit, handshake).await {
                Ok(result) => result,
                Err(_) => Err(SessionError::Connection(format!(
                    "no session confirmation within {} ms",
                    limit.as_millis()
                ))),
            },
            None => handshake.await,
        };

        let client_id = match result {
            Ok(client_id) => client_id,
            Err(err) => {
                self.state = SessionState::Closed;
                if let Err(e) = transport.disconnect().await {
                    tracing::debug!(error = %e, "Disconnect after failed connect");
                }
                tracing::warn!(error = %err, "Connect failed");
                self.report(&err);
                return Err(err);
            }
        };

        tracing::info!(client_id = %client_id, "Session open");
        self.client_id = Some(client_id);
        self.transport = Some(transport);
        self.state = SessionState::Open;
        self.handler.clear_gate();

        for message in early {
            self.dispatch(message);
        }
        Ok(())
    }

    /// Close the session
    ///
    /// Playback stops at once. Safe to call when already closed.
    pub async fn disconnect(&mut self) {
        self.interrupts.halt(&mut self.queue, &mut self.handler);
        self.settle(StreamOutcome::Interrupted);

        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.disconnect().await {
                tracing::debug!(error = %e, "Transport disconnect failed");
            }
            tracing::info!("Session closed");
        }
        self.state = SessionState::Closed;
        self.client_id = None;
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Start a new response, superseding the current one
    ///
    /// Always interrupts first, so nothing from the prior response plays
    /// after this is called. The remote side is only signalled when there
    /// is something to cancel: a request still in flight, audio playing or
    /// chunks decoding.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotConnected` when the session is not open,
    /// leaving the current response and outcome untouched, or
    /// `SessionError::Transport` if the request could not be sent.
    pub async fn send_request(
        &mut self,
        text: &str,
        persona_id: &str,
        voice_id: Option<&str>,
    ) -> SessionResult<()> {
        if !self.is_open() {
            return Err(SessionError::NotConnected);
        }

        if self.has_current_response() {
            self.interrupt().await;
        } else {
            self.interrupts.halt(&mut self.queue, &mut self.handler);
        }
        self.outcome = None;

        let mut request = StreamRequest::new(text, persona_id);
        if let Some(voice) = voice_id {
            request = request.with_voice(voice);
        }

        self.send(request.to_message()).await?;
        self.handler.begin_stream();
        self.in_flight = true;
        tracing::debug!(persona = %persona_id, len = text.len(), "Request sent");
        Ok(())
    }

    /// Stop playback and cancel the current response
    ///
    /// Local state is cleared before this returns: the queue is idle, the
    /// backlog empty and every discarded resource released. The remote side
    /// is told best effort; its acknowledgement is not awaited.
    pub async fn interrupt(&mut self) -> InterruptReport {
        let report = self
            .interrupts
            .interrupt(&mut self.queue, &mut self.handler, self.transport.as_deref())
            .await;
        self.settle(StreamOutcome::Interrupted);
        report
    }

    /// Update server-side synthesis parameters
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotConnected` when the session is not open, or
    /// `SessionError::Transport` if the message could not be sent.
    pub async fn update_config(&mut self, config: SynthesisConfig) -> SessionResult<()> {
        self.send(ClientMessage::Config { config }).await
    }

    async fn send(&mut self, message: ClientMessage) -> SessionResult<()> {
        let transport = match (&self.state, self.transport.as_deref()) {
            (SessionState::Open, Some(transport)) => transport,
            _ => return Err(SessionError::NotConnected),
        };

        let kind = message.kind();
        let sent = transport.send(message).await;
        if let Err(e) = sent {
            tracing::warn!(kind, error = %e, "Send failed");
            let err = SessionError::Transport(e);
            self.report(&err);
            return Err(err);
        }
        Ok(())
    }

    // ========================================================================
    // Event Pump
    // ========================================================================

    /// Wait for the next thing to happen and handle it
    ///
    /// Wakes on a playback completion, a finished chunk decode or an inbound
    /// message, in that priority. Cancel-safe.
    ///
    /// Returns `false` without waiting when nothing can happen any more: no
    /// connection, nothing playing and nothing decoding.
    pub async fn step(&mut self) -> bool {
        if self.transport.is_none() && self.queue.is_idle() && self.handler.pending_decodes() == 0
        {
            return false;
        }

        let wake = {
            let queue = &mut self.queue;
            let handler = &mut self.handler;
            let transport = self.transport.as_mut();
            let decoding = handler.pending_decodes() > 0;

            tokio::select! {
                biased;

                Some(unit) = queue.next_finished() => Wake::Finished(unit),
                Some(chunk) = handler.next_decoded(), if decoding => Wake::Decoded(chunk),
                result = recv_from(transport) => Wake::Inbound(result),
            }
        };

        self.process(wake);
        true
    }

    /// Handle everything that is ready without waiting
    ///
    /// Returns the number of wakes handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let wake = if let Some(unit) = self.queue.try_next_finished() {
                Wake::Finished(unit)
            } else if let Some(chunk) = self.handler.try_next_decoded() {
                Wake::Decoded(chunk)
            } else {
                match self.transport.as_deref_mut().map(|t| t.try_recv()) {
                    Some(Ok(Some(message))) => Wake::Inbound(Ok(message)),
                    Some(Err(e)) => Wake::Inbound(Err(e)),
                    Some(Ok(None)) | None => break,
                }
            };
            self.process(wake);
            handled += 1;
        }
        handled
    }

    fn process(&mut self, wake: Wake) {
        match wake {
            Wake::Finished(unit) => {
                self.queue.on_active_finished(unit);
            }
            Wake::Decoded(chunk) => {
                if let Err(err) = self.handler.on_decoded(chunk, &mut self.queue) {
                    self.report(&err);
                }
            }
            Wake::Inbound(Ok(message)) => self.dispatch(message),
            Wake::Inbound(Err(e)) => self.fail_transport(e),
        }

        for rejection in self.queue.take_rejections() {
            self.report(&SessionError::Playback(rejection));
        }
        self.check_completion();
    }

    fn dispatch(&mut self, message: ServerMessage) {
        tracing::trace!(kind = message.kind(), "Inbound message");

        match self.handler.handle(message) {
            Dispatch::Connected(client_id) => {
                tracing::warn!(client_id = %client_id, "Identity reassigned on open session");
                self.client_id = Some(client_id);
            }
            Dispatch::Event(event) => self.emit(event),
            Dispatch::TextOnly(event) => {
                self.settle(StreamOutcome::TextOnly);
                self.emit(event);
            }
            Dispatch::RemoteError(detail) => {
                self.settle(StreamOutcome::Failed(detail.clone()));
                self.report(&SessionError::Remote(detail));
            }
            Dispatch::Handled => {}
        }
        self.check_completion();
    }

    fn check_completion(&mut self) {
        if let Some(event) = self.handler.take_completion(&self.queue) {
            self.settle(StreamOutcome::Completed);
            self.emit(event);
        }
    }

    /// A transport failure ends the session
    fn fail_transport(&mut self, error: TransportError) {
        tracing::warn!(error = %error, "Connection lost");

        self.interrupts.halt(&mut self.queue, &mut self.handler);
        self.settle(StreamOutcome::Failed(error.to_string()));

        // Dropping the transport closes it
        self.transport = None;
        self.state = SessionState::Closed;
        self.client_id = None;

        self.report(&SessionError::TransportClosed(error.to_string()));
    }

    fn is_open(&self) -> bool {
        self.state == SessionState::Open && self.transport.is_some()
    }

    fn has_current_response(&self) -> bool {
        self.in_flight || !self.queue.is_idle() || self.handler.pending_decodes() > 0
    }

    fn settle(&mut self, outcome: StreamOutcome) {
        if self.in_flight {
            tracing::debug!(outcome = ?outcome, "Request settled");
            self.in_flight = false;
            self.outcome = Some(outcome);
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        match self.on_event.as_mut() {
            Some(callback) => callback(event),
            None => tracing::trace!(event = ?event, "No event handler registered"),
        }
    }

    fn report(&mut self, error: &SessionError) {
        if let Some(callback) = self.on_error.as_mut() {
            callback(error);
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Lifecycle state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Identity assigned by the remote side, while open
    #[must_use]
    pub fn client_id(&self) -> Option<&ClientId> {
        self.client_id.as_ref()
    }

    /// How the most recent request ended, once it has
    #[must_use]
    pub fn outcome(&self) -> Option<&StreamOutcome> {
        self.outcome.as_ref()
    }

    /// Whether a request is still in progress
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Playback queue state
    #[must_use]
    pub fn queue_state(&self) -> QueueState {
        self.queue.state()
    }

    /// Units waiting behind the active one
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.queue.backlog_len()
    }

    /// Chunk decodes in flight
    #[must_use]
    pub fn pending_decodes(&self) -> usize {
        self.handler.pending_decodes()
    }

    /// Playback counters
    #[must_use]
    pub fn queue_stats(&self) -> &QueueStats {
        self.queue.stats()
    }

    /// Chunk handling counters
    #[must_use]
    pub fn handler_stats(&self) -> &HandlerStats {
        self.handler.stats()
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("client_id", &self.client_id)
            .field("queue_state", &self.queue.state())
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// Open the transport and wait for the identity assignment
async fn handshake(
    transport: &mut dyn SynthesisTransport,
    early: &mut VecDeque<ServerMessage>,
) -> SessionResult<ClientId> {
    transport
        .connect()
        .await
        .map_err(|e| SessionError::Connection(e.to_string()))?;

    loop {
        match transport.recv().await {
            Ok(ServerMessage::Connected { client_id }) => return Ok(client_id),
            Ok(other) => {
                tracing::debug!(kind = other.kind(), "Message before session confirmation");
                early.push_back(other);
            }
            Err(e) => {
                return Err(SessionError::Connection(format!(
                    "closed before session confirmation: {e}"
                )))
            }
        }
    }
}

/// Receive from the transport, or never resolve without one
async fn recv_from(
    transport: Option<&mut Box<dyn SynthesisTransport>>,
) -> Result<ServerMessage, TransportError> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

//! Chat session state machine
//!
//! [`ChatSession`] owns the conversation and drives one send at a time:
//!
//! ```text
//! Idle -> Sending -> Streaming -> Idle
//!         Sending/Streaming -> Error -> Idle
//!         Sending/Streaming -> Cancelled -> Idle
//! ```
//!
//! `send` spawns a worker task that opens the transport, parses each line and
//! relays deltas through the [`Dispatcher`](super::dispatcher::Dispatcher).
//! The consumer pumps events with [`ChatSession::dispatch_pending`] or
//! [`ChatSession::dispatch_next`]; every [`ChatEvents`] callback runs inside
//! one of those calls or inside [`ChatSession::cancel`], never on the worker.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chat::dispatcher::{self, Dispatch, DispatchSender, Dispatcher};
use crate::chat::{ChatRequest, ChunkParser, Conversation, Message};
use crate::config::{normalize_endpoint, Config};
use crate::error::{AiorgError, ChatResult, ErrorKind};
use crate::transport::{HttpStreamingTransport, StreamingTransport};

/// Default idle window between two streamed lines
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Receiver of session events
///
/// Exactly one of `on_complete`, `on_error` or `on_cancelled` fires per
/// accepted `send`, after zero or more `on_chunk` calls.
pub trait ChatEvents: Send {
    /// A non-empty piece of the assistant reply
    fn on_chunk(&mut self, delta: &str);

    /// The reply finished; `message` is the committed assistant message
    fn on_complete(&mut self, message: &Message);

    /// The send failed
    fn on_error(&mut self, kind: ErrorKind, message: &str);

    /// The send was aborted
    fn on_cancelled(&mut self);
}

/// Observable state of a [`ChatSession`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Sending,
    Streaming,
    Error,
    Cancelled,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Sending => "sending",
            Self::Streaming => "streaming",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Explicit per-session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Base URL of the model server, without trailing slash
    pub endpoint: String,
    /// Model name sent with every request
    pub model: String,
    /// Longest allowed gap between two lines of the response
    pub idle_timeout: Duration,
    /// Number of deltas that may wait for the consumer
    pub dispatch_capacity: usize,
}

impl SessionConfig {
    /// Creates a configuration with default timeout and queue capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use aiorg::chat::SessionConfig;
    ///
    /// let config = SessionConfig::new("http://localhost:11434/", "llama3.2:latest");
    /// assert_eq!(config.endpoint, "http://localhost:11434");
    /// assert_eq!(config.dispatch_capacity, 64);
    /// ```
    pub fn new(endpoint: impl AsRef<str>, model: impl Into<String>) -> Self {
        Self {
            endpoint: normalize_endpoint(endpoint.as_ref()),
            model: model.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            dispatch_capacity: dispatcher::DEFAULT_DISPATCH_CAPACITY,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_dispatch_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_capacity = capacity;
        self
    }

    /// Derives the session configuration from the loaded application config
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.ollama.host, config.ollama.model.clone())
            .with_idle_timeout(Duration::from_secs(config.chat.idle_timeout_seconds))
            .with_dispatch_capacity(config.chat.dispatch_capacity)
    }
}

#[derive(Debug)]
struct SharedState {
    state: SessionState,
    send_id: u64,
}

#[derive(Debug)]
struct InFlight {
    send_id: u64,
    token: CancellationToken,
    dispatcher: Dispatcher,
}

/// Streaming chat session against one model server
pub struct ChatSession {
    id: Uuid,
    config: SessionConfig,
    transport: Arc<dyn StreamingTransport>,
    events: Box<dyn ChatEvents>,
    conversation: Conversation,
    shared: Arc<Mutex<SharedState>>,
    in_flight: Option<InFlight>,
    next_send_id: u64,
    runtime: Handle,
}

impl fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatSession")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("messages", &self.conversation.len())
            .finish_non_exhaustive()
    }
}

impl ChatSession {
    /// Creates a session talking HTTP to `config.endpoint`
    ///
    /// # Errors
    ///
    /// Returns [`AiorgError::InvalidState`] outside a Tokio runtime and
    /// [`AiorgError::Connection`] if the HTTP client cannot be built.
    pub fn new(config: SessionConfig, events: Box<dyn ChatEvents>) -> ChatResult<Self> {
        let transport = HttpStreamingTransport::new(&config.endpoint, config.idle_timeout)?;
        Self::with_transport(config, Arc::new(transport), events)
    }

    /// Creates a session on top of an existing transport
    ///
    /// The transport should not be shared with another live session, since
    /// `cancel` aborts whatever request the transport is currently serving.
    pub fn with_transport(
        config: SessionConfig,
        transport: Arc<dyn StreamingTransport>,
        events: Box<dyn ChatEvents>,
    ) -> ChatResult<Self> {
        let runtime = Handle::try_current().map_err(|_| {
            AiorgError::InvalidState("a chat session needs a running Tokio runtime".to_string())
        })?;

        let id = Uuid::new_v4();
        tracing::info!(
            "Created chat session {}: endpoint={}, model={}",
            id,
            config.endpoint,
            config.model
        );

        Ok(Self {
            id,
            config,
            transport,
            events,
            conversation: Conversation::new(),
            shared: Arc::new(Mutex::new(SharedState {
                state: SessionState::Idle,
                send_id: 0,
            })),
            in_flight: None,
            next_send_id: 0,
            runtime,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        lock(&self.shared).state
    }

    /// Whether a send is waiting for its terminal event
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Copy of the conversation, including the partial reply if one is
    /// being streamed
    pub fn history(&self) -> Vec<Message> {
        self.conversation.snapshot()
    }

    /// Starts a send and returns without waiting for the reply
    ///
    /// # Errors
    ///
    /// Returns [`AiorgError::InvalidState`] if a send is already in flight
    /// and [`AiorgError::EmptyMessage`] if `text` is blank. Nothing changes in
    /// either case.
    pub fn send(&mut self, text: &str) -> ChatResult<()> {
        if text.trim().is_empty() {
            return Err(AiorgError::EmptyMessage);
        }
        let state = self.state();
        if state != SessionState::Idle || self.in_flight.is_some() {
            return Err(AiorgError::InvalidState(format!(
                "cannot send while the session is {}",
                state
            )));
        }

        self.conversation.push_user(text);
        let request = ChatRequest::streaming(&self.config.model, self.conversation.snapshot());

        self.next_send_id += 1;
        let send_id = self.next_send_id;
        let token = CancellationToken::new();
        let (sender, dispatcher) =
            dispatcher::channel(self.config.dispatch_capacity, token.clone());

        self.set_state(SessionState::Sending, Some(send_id));
        tracing::info!(
            "Session {}: send #{} with {} messages",
            self.id,
            send_id,
            request.messages.len()
        );

        let worker = StreamWorker {
            transport: Arc::clone(&self.transport),
            request,
            sender,
            token: token.clone(),
            shared: Arc::clone(&self.shared),
            send_id,
        };
        self.runtime.spawn(worker.run());

        self.in_flight = Some(InFlight {
            send_id,
            token,
            dispatcher,
        });
        Ok(())
    }

    /// Aborts the send in flight; does nothing when idle
    ///
    /// Fires `on_cancelled` before returning. No other callback fires for the
    /// aborted send afterwards.
    pub fn cancel(&mut self) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };

        in_flight.token.cancel();
        self.transport.abort();
        tracing::info!("Session {}: send #{} cancelled", self.id, in_flight.send_id);
        self.finish_cancelled();
    }

    /// Clears the conversation
    ///
    /// # Errors
    ///
    /// Returns [`AiorgError::InvalidState`] unless the session is idle.
    pub fn reset(&mut self) -> ChatResult<()> {
        let state = self.state();
        if state != SessionState::Idle || self.in_flight.is_some() {
            return Err(AiorgError::InvalidState(format!(
                "cannot reset while the session is {}",
                state
            )));
        }
        self.conversation.clear();
        tracing::debug!("Session {}: conversation cleared", self.id);
        Ok(())
    }

    /// Delivers every event that is already available, without waiting
    ///
    /// Returns the number of events delivered.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(event) = self
            .in_flight
            .as_mut()
            .and_then(|in_flight| in_flight.dispatcher.try_next())
        {
            self.deliver(event);
            delivered += 1;
        }
        delivered
    }

    /// Waits for the next event of the send in flight and delivers it
    ///
    /// Returns `false` when no send is in flight. Dropping the future before
    /// it completes loses no event.
    pub async fn dispatch_next(&mut self) -> bool {
        let Some(in_flight) = self.in_flight.as_mut() else {
            return false;
        };
        let event = in_flight.dispatcher.next().await;
        match event {
            Some(event) => {
                self.deliver(event);
                true
            }
            None => false,
        }
    }

    /// Pumps events until the send in flight has finished
    pub async fn wait_idle(&mut self) {
        while self.dispatch_next().await {}
    }

    fn deliver(&mut self, event: Dispatch) {
        match event {
            Dispatch::Chunk(delta) => {
                self.conversation.append_streaming(&delta);
                self.events.on_chunk(&delta);
            }
            Dispatch::Finished(Ok(())) => {
                self.in_flight = None;
                let message = self.conversation.commit_streaming();
                self.set_state(SessionState::Idle, None);
                tracing::info!(
                    "Session {}: reply complete ({} chars)",
                    self.id,
                    message.content.len()
                );
                self.events.on_complete(&message);
            }
            Dispatch::Finished(Err(AiorgError::Cancelled)) => {
                self.in_flight = None;
                tracing::info!("Session {}: stream aborted by the transport", self.id);
                self.finish_cancelled();
            }
            Dispatch::Finished(Err(error)) => {
                self.in_flight = None;
                self.conversation.discard_streaming();
                self.set_state(SessionState::Error, None);
                tracing::error!("Session {}: send failed: {}", self.id, error);
                self.events.on_error(error.kind(), &error.to_string());
                self.set_state(SessionState::Idle, None);
            }
        }
    }

    fn finish_cancelled(&mut self) {
        self.conversation.discard_streaming();
        self.set_state(SessionState::Cancelled, None);
        self.events.on_cancelled();
        self.set_state(SessionState::Idle, None);
    }

    fn set_state(&self, state: SessionState, send_id: Option<u64>) {
        let mut shared = lock(&self.shared);
        tracing::debug!("Session {}: {} -> {}", self.id, shared.state, state);
        shared.state = state;
        if let Some(send_id) = send_id {
            shared.send_id = send_id;
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.token.cancel();
            self.transport.abort();
        }
    }
}

fn lock(shared: &Mutex<SharedState>) -> std::sync::MutexGuard<'_, SharedState> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Background half of one send
struct StreamWorker {
    transport: Arc<dyn StreamingTransport>,
    request: ChatRequest,
    sender: DispatchSender,
    token: CancellationToken,
    shared: Arc<Mutex<SharedState>>,
    send_id: u64,
}

impl StreamWorker {
    async fn run(self) {
        let outcome = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(AiorgError::Cancelled),
            outcome = self.stream() => outcome,
        };

        match &outcome {
            Ok(()) => tracing::debug!("Send #{}: stream complete", self.send_id),
            Err(e) => tracing::debug!("Send #{}: stream ended with {}", self.send_id, e),
        }
        self.sender.finish(outcome);
    }

    async fn stream(&self) -> ChatResult<()> {
        let mut lines = self.transport.open(&self.request).await?;
        // response headers are the first bytes the server sends
        self.mark_streaming();

        while let Some(line) = lines.next().await {
            let line = line?;
            let chunk = ChunkParser::parse(&line)?;
            if !chunk.delta.is_empty() {
                self.sender.relay(chunk.delta)?;
            }
            if chunk.terminal {
                return Ok(());
            }
        }

        Err(AiorgError::Protocol(
            "stream ended before the completion record".to_string(),
        ))
    }

    fn mark_streaming(&self) {
        let mut shared = lock(&self.shared);
        if shared.send_id == self.send_id && shared.state == SessionState::Sending {
            shared.state = SessionState::Streaming;
            tracing::debug!("Send #{}: response started, streaming", self.send_id);
        }
    }
}

//! Streaming HTTP transport for the Ollama chat endpoint
//!
//! [`HttpStreamingTransport`] POSTs the chat request to `{endpoint}/api/chat`
//! and exposes the NDJSON response body as a [`LineStream`].
//!
//! # Timeouts
//!
//! The client carries no overall request timeout: a long generation is
//! legitimate as long as lines keep arriving. Instead the idle window bounds
//! both the wait for response headers and the gap between two lines.
//!
//! # Abort
//!
//! Every `open` arms a fresh [`CancellationToken`]; `abort` cancels the token
//! of the most recent request, which drops the response body and with it the
//! connection.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::chat::ChatRequest;
use crate::config::normalize_endpoint;
use crate::error::{AiorgError, ChatResult};
use crate::transport::{line_stream, LineStream, StreamingTransport};

/// Streaming transport over `reqwest`
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use aiorg::transport::HttpStreamingTransport;
///
/// let transport = HttpStreamingTransport::new("http://localhost:11434/", Duration::from_secs(30)).unwrap();
/// assert_eq!(transport.chat_url(), "http://localhost:11434/api/chat");
/// ```
#[derive(Debug)]
pub struct HttpStreamingTransport {
    client: reqwest::Client,
    endpoint: String,
    idle_timeout: Duration,
    current: Mutex<CancellationToken>,
}

impl HttpStreamingTransport {
    /// Creates a transport for the model server at `endpoint`
    ///
    /// # Errors
    ///
    /// Returns [`AiorgError::Connection`] if the HTTP client cannot be built.
    pub fn new(endpoint: &str, idle_timeout: Duration) -> ChatResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(idle_timeout)
            .user_agent(concat!("aiorg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiorgError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        let endpoint = normalize_endpoint(endpoint);
        tracing::debug!(
            "Initialized streaming transport: endpoint={}, idle_timeout={:?}",
            endpoint,
            idle_timeout
        );

        Ok(Self {
            client,
            endpoint,
            idle_timeout,
            current: Mutex::new(CancellationToken::new()),
        })
    }

    /// Base endpoint without a trailing slash
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Full URL of the chat route
    pub fn chat_url(&self) -> String {
        format!("{}/api/chat", self.endpoint)
    }

    /// Replaces the abort token with a fresh one for a new request
    fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        *current = token.clone();
        token
    }

    fn request_error(&self, error: reqwest::Error) -> AiorgError {
        if error.is_timeout() {
            AiorgError::Timeout(self.idle_timeout)
        } else {
            AiorgError::Connection(format!(
                "Could not connect to the model server at {}: {}",
                self.endpoint, error
            ))
        }
    }
}

#[async_trait::async_trait]
impl StreamingTransport for HttpStreamingTransport {
    async fn open(&self, request: &ChatRequest) -> ChatResult<LineStream> {
        let token = self.arm();
        let url = self.chat_url();

        tracing::debug!(
            "Sending chat request to {}: model={}, {} messages",
            url,
            request.model,
            request.messages.len()
        );

        let pending = self.client.post(&url).json(request).send();
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            response = tokio::time::timeout(self.idle_timeout, pending) => Some(response),
        };

        let response = match response {
            None => return Err(AiorgError::Cancelled),
            Some(Err(_)) => {
                tracing::error!("No response headers within {:?}", self.idle_timeout);
                return Err(AiorgError::Timeout(self.idle_timeout));
            }
            Some(Ok(Err(e))) => {
                tracing::error!("Chat request failed: {}", e);
                return Err(self.request_error(e));
            }
            Some(Ok(Ok(response))) => response,
        };

        let status = response.status();
        if !status.is_success() {
            let body = tokio::time::timeout(self.idle_timeout, response.text())
                .await
                .ok()
                .and_then(|text| text.ok())
                .unwrap_or_default();
            tracing::error!("Model server returned error {}: {}", status, body);
            return Err(AiorgError::Server {
                status: status.as_u16(),
                body,
            });
        }

        tracing::info!("Connected to model server, receiving stream");
        Ok(line_stream(
            response.bytes_stream(),
            token,
            self.idle_timeout,
        ))
    }

    fn abort(&self) {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if !current.is_cancelled() {
            tracing::info!("Aborting in-flight chat request");
            current.cancel();
        }
    }
}

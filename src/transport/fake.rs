//! Scripted in-process transport for tests
//!
//! Each call to `open` consumes the next [`FakeResponse`] from the script and
//! records the request it was given.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::chat::ChatRequest;
use crate::error::{AiorgError, ChatResult};
use crate::transport::{LineStream, StreamingTransport};

/// Scripted outcome of one `open` call
#[derive(Debug, Clone)]
pub enum FakeResponse {
    /// Yield these items, then end the stream
    Lines(Vec<ChatResult<String>>),
    /// Yield these items, then stay silent until aborted
    LinesThenHang(Vec<ChatResult<String>>),
    /// Fail `open` itself
    Fail(AiorgError),
}

impl FakeResponse {
    /// Convenience for a well-formed stream of deltas ending in a done record
    pub fn deltas(deltas: &[&str]) -> Self {
        let mut lines: Vec<ChatResult<String>> = deltas
            .iter()
            .map(|d| Ok(record(d, false)))
            .collect();
        lines.push(Ok(record("", true)));
        Self::Lines(lines)
    }
}

/// Builds one wire record
pub fn record(content: &str, done: bool) -> String {
    serde_json::json!({
        "model": "fake",
        "created_at": "2024-01-01T00:00:00Z",
        "message": {"role": "assistant", "content": content},
        "done": done
    })
    .to_string()
}

#[derive(Debug, Default)]
pub struct FakeTransport {
    script: Mutex<VecDeque<FakeResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
    aborts: AtomicUsize,
    current: Mutex<CancellationToken>,
}

impl FakeTransport {
    pub fn new(script: impl IntoIterator<Item = FakeResponse>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl StreamingTransport for FakeTransport {
    async fn open(&self, request: &ChatRequest) -> ChatResult<LineStream> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let response = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| {
                FakeResponse::Fail(AiorgError::Connection("no scripted response".to_string()))
            });

        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();

        let (items, hang) = match response {
            FakeResponse::Fail(error) => return Err(error),
            FakeResponse::Lines(items) => (items, false),
            FakeResponse::LinesThenHang(items) => (items, true),
        };

        let state = (items.into_iter(), token, false);
        Ok(Box::pin(futures::stream::unfold(
            state,
            move |(mut items, token, done)| async move {
                if done {
                    return None;
                }
                if token.is_cancelled() {
                    return Some((Err(AiorgError::Cancelled), (items, token, true)));
                }
                if let Some(item) = items.next() {
                    tokio::task::yield_now().await;
                    return Some((item, (items, token, false)));
                }
                if !hang {
                    return None;
                }
                token.cancelled().await;
                Some((Err(AiorgError::Cancelled), (items, token, true)))
            },
        )))
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

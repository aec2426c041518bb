//! NDJSON line framing
//!
//! The model server writes one JSON record per line, but nothing ties a
//! network read to a record boundary: a record may arrive in several pieces
//! and a multi-byte UTF-8 character may be split between two reads.
//! [`LineBuffer`] keeps raw bytes until a `\n` is seen and only then decodes
//! the line.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::error::{AiorgError, ChatResult};
use crate::transport::LineStream;

/// Accumulates body bytes and yields complete, non-blank lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: BytesMut,
    // Bytes of `pending` already known to contain no newline
    scanned: usize,
}

impl LineBuffer {
    /// Creates an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends bytes received from the network
    pub fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Returns the next complete line, skipping blank ones
    ///
    /// The line terminator (`\n` or `\r\n`) is stripped. Returns `None` when
    /// no complete line is buffered yet.
    ///
    /// # Examples
    ///
    /// ```
    /// use aiorg::transport::LineBuffer;
    ///
    /// let mut buffer = LineBuffer::new();
    /// buffer.push(b"{\"a\":");
    /// assert!(buffer.next_line().is_none());
    /// buffer.push(b"1}\n");
    /// assert_eq!(buffer.next_line().unwrap().unwrap(), "{\"a\":1}");
    /// ```
    pub fn next_line(&mut self) -> Option<ChatResult<String>> {
        loop {
            let offset = self.pending[self.scanned..]
                .iter()
                .position(|b| *b == b'\n');
            let Some(offset) = offset else {
                self.scanned = self.pending.len();
                return None;
            };

            let end = self.scanned + offset;
            let mut line = self.pending.split_to(end + 1);
            self.scanned = 0;
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }

            if is_blank(&line) {
                continue;
            }
            return Some(decode(&line));
        }
    }

    /// Drains whatever is left once the body has ended
    ///
    /// A final record without a trailing newline is still a record.
    pub fn finish(&mut self) -> Option<ChatResult<String>> {
        let rest = self.pending.split();
        self.scanned = 0;
        if is_blank(&rest) {
            return None;
        }
        Some(decode(&rest))
    }

    /// Number of bytes waiting for a line terminator
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn decode(bytes: &[u8]) -> ChatResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| AiorgError::Protocol(format!("line is not valid UTF-8: {}", e)))
}

struct LineState<S> {
    body: std::pin::Pin<Box<S>>,
    buffer: LineBuffer,
    token: CancellationToken,
    idle_timeout: Duration,
    done: bool,
}

/// Turns a response body into a [`LineStream`]
///
/// Each line must arrive within `idle_timeout` of the previous one (or of the
/// call for the first line), otherwise the stream yields
/// [`AiorgError::Timeout`]. Cancelling `token` makes the stream yield
/// [`AiorgError::Cancelled`] at once. The stream ends after its first error.
pub fn line_stream<S, E>(body: S, token: CancellationToken, idle_timeout: Duration) -> LineStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = LineState {
        body: Box::pin(body),
        buffer: LineBuffer::new(),
        token,
        idle_timeout,
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }

        let deadline = tokio::time::Instant::now() + state.idle_timeout;
        loop {
            if state.token.is_cancelled() {
                state.done = true;
                return Some((Err(AiorgError::Cancelled), state));
            }

            if let Some(line) = state.buffer.next_line() {
                state.done = line.is_err();
                return Some((line, state));
            }

            let next = tokio::select! {
                biased;
                _ = state.token.cancelled() => None,
                next = tokio::time::timeout_at(deadline, state.body.next()) => Some(next),
            };

            match next {
                None => {
                    state.done = true;
                    return Some((Err(AiorgError::Cancelled), state));
                }
                Some(Err(_)) => {
                    tracing::warn!(
                        "No line received within {:?} ({} bytes buffered)",
                        state.idle_timeout,
                        state.buffer.pending_len()
                    );
                    state.done = true;
                    return Some((Err(AiorgError::Timeout(state.idle_timeout)), state));
                }
                Some(Ok(None)) => {
                    state.done = true;
                    let tail = state.buffer.finish();
                    return tail.map(|line| (line, state));
                }
                Some(Ok(Some(Err(e)))) => {
                    state.done = true;
                    return Some((
                        Err(AiorgError::Connection(format!(
                            "response stream interrupted: {}",
                            e
                        ))),
                        state,
                    ));
                }
                Some(Ok(Some(Ok(bytes)))) => state.buffer.push(&bytes),
            }
        }
    }))
}

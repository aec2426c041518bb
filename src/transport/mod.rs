//! Streaming transport abstraction and implementations
//!
//! This module defines the [`StreamingTransport`] trait the chat session uses
//! to reach the model server. Concrete implementations live in submodules:
//!
//! - [`http::HttpStreamingTransport`]: `POST /api/chat` with a streaming body
//!   over `reqwest`
//! - `fake::FakeTransport`: scripted in-process fake, test builds only
//!
//! # Design
//!
//! `open` returns a lazy, finite [`LineStream`] of raw NDJSON lines. Framing
//! (splitting the byte stream into lines, including records that straddle
//! network reads) is done by [`lines::LineBuffer`]; decoding a line into a
//! chunk is the caller's job.

use std::pin::Pin;

use futures::Stream;

use crate::chat::ChatRequest;
use crate::error::ChatResult;

pub mod http;
pub mod lines;

#[cfg(test)]
pub mod fake;

pub use http::HttpStreamingTransport;
pub use lines::{line_stream, LineBuffer};

/// Lazy sequence of raw response lines, ending after the last line or the
/// first error
pub type LineStream = Pin<Box<dyn Stream<Item = ChatResult<String>> + Send>>;

/// Abstraction over the connection to the model server
///
/// Implementations must let `abort` interrupt a stream returned by `open`
/// from another task: the stream then yields
/// [`crate::error::AiorgError::Cancelled`] and ends.
#[async_trait::async_trait]
pub trait StreamingTransport: Send + Sync + std::fmt::Debug {
    /// Issues the chat request and returns the response body as lines.
    ///
    /// # Errors
    ///
    /// Returns `Connection`, `Timeout` or `Server` errors raised before the
    /// first byte of the body, or `Cancelled` if aborted while connecting.
    async fn open(&self, request: &ChatRequest) -> ChatResult<LineStream>;

    /// Closes the connection of the request currently being streamed.
    fn abort(&self);
}

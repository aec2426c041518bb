//! Ollama chat wire format and the line decoder
//!
//! The streaming `/api/chat` endpoint answers with one JSON record per line:
//!
//! ```text
//! {"model":"llama3.2","created_at":"...","message":{"role":"assistant","content":"Hel"},"done":false}
//! {"model":"llama3.2","created_at":"...","message":{"role":"assistant","content":"lo"},"done":false}
//! {"model":"llama3.2","created_at":"...","message":{"role":"assistant","content":""},"done":true}
//! ```
//!
//! [`ChunkParser::parse`] turns each such line into a [`StreamChunk`].

use serde::{Deserialize, Serialize};

use crate::chat::Message;
use crate::error::{AiorgError, ChatResult};

/// Request body for `POST /api/chat`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub stream: bool,
}

impl ChatRequest {
    /// Builds a streaming request carrying the full message history
    ///
    /// # Examples
    ///
    /// ```
    /// use aiorg::chat::{ChatRequest, Message};
    ///
    /// let request = ChatRequest::streaming("llama3.2:latest", vec![Message::user("Hi")]);
    /// assert!(request.stream);
    /// ```
    pub fn streaming(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            stream: true,
        }
    }
}

/// One decoded record of the response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamChunk {
    /// Text to append to the assistant reply, possibly empty
    pub delta: String,
    /// True for the final record of the stream
    pub terminal: bool,
}

/// Raw record as it appears on the wire
///
/// `model` and `created_at` are informational. `message` and `done` are
/// optional here so that their absence can be reported as a protocol error
/// with a precise message instead of a generic serde failure.
#[derive(Debug, Deserialize)]
struct ChatResponseLine {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Decoder for single lines of the chat stream
#[derive(Debug, Clone, Copy, Default)]
pub struct ChunkParser;

impl ChunkParser {
    /// Decodes one raw line into a [`StreamChunk`]
    ///
    /// # Errors
    ///
    /// Returns [`AiorgError::Protocol`] if the line is not JSON, lacks
    /// `message.content` or `done`, or carries a server-side `error`.
    ///
    /// # Examples
    ///
    /// ```
    /// use aiorg::chat::ChunkParser;
    ///
    /// let chunk = ChunkParser::parse(r#"{"message":{"content":"Hel"},"done":false}"#).unwrap();
    /// assert_eq!(chunk.delta, "Hel");
    /// assert!(!chunk.terminal);
    ///
    /// assert!(ChunkParser::parse("not-json").is_err());
    /// ```
    pub fn parse(line: &str) -> ChatResult<StreamChunk> {
        let record: ChatResponseLine = serde_json::from_str(line).map_err(|e| {
            tracing::debug!("Undecodable stream line: {}", truncate(line, 120));
            AiorgError::Protocol(format!("invalid JSON record: {}", e))
        })?;

        if let Some(error) = record.error {
            return Err(AiorgError::Protocol(format!(
                "server reported an error mid-stream: {}",
                error
            )));
        }

        let delta = record
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| AiorgError::Protocol("record is missing message.content".to_string()))?;
        let terminal = record
            .done
            .ok_or_else(|| AiorgError::Protocol("record is missing the done flag".to_string()))?;

        if terminal {
            tracing::debug!(
                "Received completion record from model {}",
                record.model.as_deref().unwrap_or("<unknown>")
            );
        }

        Ok(StreamChunk { delta, terminal })
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

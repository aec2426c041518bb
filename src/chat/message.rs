//! Conversation messages and history
//!
//! A [`Conversation`] is an ordered, append-only list of [`Message`] values.
//! The assistant reply that is currently streaming lives beside the committed
//! history until it is either committed (on completion) or discarded (on
//! error or cancellation).

use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Message structure for conversation
///
/// Serializes to the `{"role": ..., "content": ...}` shape the model server
/// expects in the `messages` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use aiorg::chat::{Message, Role};
    ///
    /// let msg = Message::user("Hello, assistant!");
    /// assert_eq!(msg.role, Role::User);
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    ///
    /// # Examples
    ///
    /// ```
    /// use aiorg::chat::{Message, Role};
    ///
    /// let msg = Message::assistant("Hello, user!");
    /// assert_eq!(msg.role, Role::Assistant);
    /// ```
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered chat history owned by a single session
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
    streaming: Option<String>,
}

impl Conversation {
    /// Creates an empty conversation
    ///
    /// # Examples
    ///
    /// ```
    /// use aiorg::chat::Conversation;
    ///
    /// let conversation = Conversation::new();
    /// assert!(conversation.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a committed user message
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Appends a delta to the assistant reply being streamed, starting it if needed
    pub fn append_streaming(&mut self, delta: &str) {
        self.streaming.get_or_insert_with(String::new).push_str(delta);
    }

    /// Returns the partial assistant reply, if one is streaming
    pub fn streaming(&self) -> Option<&str> {
        self.streaming.as_deref()
    }

    /// Commits the streamed reply as an assistant message and returns it
    ///
    /// A reply that produced no deltas is committed as an empty message.
    pub fn commit_streaming(&mut self) -> Message {
        let message = Message::assistant(self.streaming.take().unwrap_or_default());
        self.messages.push(message.clone());
        message
    }

    /// Drops the partial assistant reply without committing it
    pub fn discard_streaming(&mut self) {
        self.streaming = None;
    }

    /// Committed messages in insertion order
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Copy of the history, including the partial assistant reply
    pub fn snapshot(&self) -> Vec<Message> {
        let mut snapshot = self.messages.clone();
        if let Some(partial) = &self.streaming {
            snapshot.push(Message::assistant(partial.clone()));
        }
        snapshot
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.streaming.is_none()
    }

    /// Removes every message, including any partial reply
    pub fn clear(&mut self) {
        self.messages.clear();
        self.streaming = None;
    }
}

//! Streaming chat core
//!
//! - [`message`]: conversation data model
//! - [`parser`]: wire records and the per-line decoder
//! - [`dispatcher`]: ordered relay from the stream worker to the consumer
//! - [`session`]: the state machine tying transport, parser and dispatcher
//!   together

pub mod dispatcher;
pub mod message;
pub mod parser;
pub mod session;

pub use dispatcher::{Dispatch, DEFAULT_DISPATCH_CAPACITY};
pub use message::{Conversation, Message, Role};
pub use parser::{ChatRequest, ChunkParser, StreamChunk};
pub use session::{ChatEvents, ChatSession, SessionConfig, SessionState, DEFAULT_IDLE_TIMEOUT};

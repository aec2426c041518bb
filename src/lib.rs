//! AIOrg - streaming chat core for locally hosted language models
//!
//! This library talks to an Ollama-compatible server over its streaming
//! `/api/chat` endpoint and delivers the reply incrementally, in order,
//! without blocking the caller.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `chat`: conversation model, line parser, dispatcher and the session
//!   state machine
//! - `transport`: streaming HTTP transport and NDJSON line framing
//! - `probe`: server reachability check and model listing
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli`, `commands`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use aiorg::chat::{ChatEvents, ChatSession, Message, SessionConfig};
//! use aiorg::error::ErrorKind;
//!
//! struct Print;
//!
//! impl ChatEvents for Print {
//!     fn on_chunk(&mut self, delta: &str) {
//!         print!("{}", delta);
//!     }
//!     fn on_complete(&mut self, _message: &Message) {
//!         println!();
//!     }
//!     fn on_error(&mut self, kind: ErrorKind, message: &str) {
//!         eprintln!("{}: {}", kind, message);
//!     }
//!     fn on_cancelled(&mut self) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SessionConfig::new("http://localhost:11434", "llama3.2:latest");
//!     let mut session = ChatSession::new(config, Box::new(Print))?;
//!
//!     session.send("Why is the sky blue?")?;
//!     session.wait_idle().await;
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod probe;
pub mod transport;

// Re-export commonly used types
pub use chat::{ChatEvents, ChatSession, SessionConfig, SessionState};
pub use config::Config;
pub use error::{AiorgError, ChatResult, ErrorKind, Result};
pub use probe::{ConnectionProbe, ConnectionStatus};

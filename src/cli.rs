//! Command-line interface definition for AIOrg
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, one-shot questions and
//! server checks.

use clap::{Parser, Subcommand};

/// AIOrg - chat with a locally hosted language model
///
/// Streams replies from an Ollama-compatible server as they are generated.
#[derive(Parser, Debug, Clone)]
#[command(name = "aiorg")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the model server URL
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Override the model name
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Use a named model profile from the configuration
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for AIOrg
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat,

    /// Ask a single question and stream the answer
    Ask {
        /// Prompt to send
        prompt: String,
    },

    /// Check whether the model server is reachable
    Status,

    /// List models installed on the server
    Models {
        /// Print the list as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            host: None,
            model: None,
            profile: None,
            command: Commands::Chat,
        }
    }
}

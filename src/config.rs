//! Configuration management for AIOrg
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{AiorgError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest accepted dispatch queue capacity
pub const MAX_DISPATCH_CAPACITY: usize = 4096;

/// Main configuration structure for AIOrg
///
/// This structure holds the model server location, chat streaming limits,
/// probe settings and the named model profiles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model server settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Streaming chat settings
    #[serde(default)]
    pub chat: ChatConfig,

    /// Reachability probe settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Named local model presets
    #[serde(default)]
    pub profiles: Vec<ModelProfile>,
}

/// Ollama server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Ollama server host
    #[serde(default = "default_ollama_host")]
    pub host: String,

    /// Model to use for Ollama
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

fn default_ollama_host() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:latest".to_string()
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_ollama_host(),
            model: default_ollama_model(),
        }
    }
}

/// Streaming chat configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Longest gap between two streamed lines before the send times out
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u64,

    /// Number of reply chunks that may wait for the consumer
    #[serde(default = "default_dispatch_capacity")]
    pub dispatch_capacity: usize,
}

fn default_idle_timeout() -> u64 {
    30
}

fn default_dispatch_capacity() -> usize {
    crate::chat::DEFAULT_DISPATCH_CAPACITY
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            idle_timeout_seconds: default_idle_timeout(),
            dispatch_capacity: default_dispatch_capacity(),
        }
    }
}

/// Reachability probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Timeout for `/api/version` and `/api/tags` requests
    #[serde(default = "default_probe_timeout")]
    pub timeout_seconds: u64,
}

fn default_probe_timeout() -> u64 {
    3
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_probe_timeout(),
        }
    }
}

/// Named model preset selectable with `--profile`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Profile name
    pub name: String,

    /// Server URL; falls back to `ollama.host` when absent
    #[serde(default)]
    pub host: Option<String>,

    /// Model name
    pub model: String,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or if `--profile`
    /// names an unknown profile
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli)?;

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AiorgError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AiorgError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(host) = std::env::var("AIORG_OLLAMA_HOST") {
            self.ollama.host = host;
        }

        if let Ok(model) = std::env::var("AIORG_OLLAMA_MODEL") {
            self.ollama.model = model;
        }

        if let Ok(timeout) = std::env::var("AIORG_IDLE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.chat.idle_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid AIORG_IDLE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(timeout) = std::env::var("AIORG_PROBE_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.probe.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid AIORG_PROBE_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(capacity) = std::env::var("AIORG_DISPATCH_CAPACITY") {
            if let Ok(value) = capacity.parse() {
                self.chat.dispatch_capacity = value;
            } else {
                tracing::warn!("Invalid AIORG_DISPATCH_CAPACITY: {}", capacity);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) -> Result<()> {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(name) = &cli.profile {
            self.apply_profile(name)?;
        }

        if let Some(host) = &cli.host {
            self.ollama.host = host.clone();
        }

        if let Some(model) = &cli.model {
            self.ollama.model = model.clone();
        }

        Ok(())
    }

    /// Switches the active server and model to the named profile
    ///
    /// # Errors
    ///
    /// Returns error if no profile has that name
    pub fn apply_profile(&mut self, name: &str) -> Result<()> {
        let profile = self
            .profiles
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| {
                let known: Vec<&str> = self.profiles.iter().map(|p| p.name.as_str()).collect();
                AiorgError::Config(format!(
                    "Unknown profile '{}'. Known profiles: {}",
                    name,
                    if known.is_empty() {
                        "none".to_string()
                    } else {
                        known.join(", ")
                    }
                ))
            })?;

        tracing::debug!("Using model profile {}", profile.name);
        if let Some(host) = profile.host {
            self.ollama.host = host;
        }
        self.ollama.model = profile.model;
        Ok(())
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Returns
    ///
    /// Returns Ok if configuration is valid
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        validate_host("ollama.host", &self.ollama.host)?;

        if self.ollama.model.trim().is_empty() {
            return Err(AiorgError::Config("ollama.model cannot be empty".to_string()).into());
        }

        if self.chat.idle_timeout_seconds == 0 {
            return Err(AiorgError::Config(
                "chat.idle_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.chat.dispatch_capacity == 0 || self.chat.dispatch_capacity > MAX_DISPATCH_CAPACITY
        {
            return Err(AiorgError::Config(format!(
                "chat.dispatch_capacity must be between 1 and {}",
                MAX_DISPATCH_CAPACITY
            ))
            .into());
        }

        if self.probe.timeout_seconds == 0 {
            return Err(AiorgError::Config(
                "probe.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        for (index, profile) in self.profiles.iter().enumerate() {
            if profile.name.trim().is_empty() {
                return Err(
                    AiorgError::Config(format!("profiles[{}].name cannot be empty", index)).into(),
                );
            }
            if profile.model.trim().is_empty() {
                return Err(AiorgError::Config(format!(
                    "profile '{}' must name a model",
                    profile.name
                ))
                .into());
            }
            if let Some(host) = &profile.host {
                validate_host(&format!("profile '{}' host", profile.name), host)?;
            }
            if self.profiles[..index].iter().any(|p| p.name == profile.name) {
                return Err(AiorgError::Config(format!(
                    "profile '{}' is defined more than once",
                    profile.name
                ))
                .into());
            }
        }

        Ok(())
    }
}

fn validate_host(field: &str, host: &str) -> Result<()> {
    let parsed = url::Url::parse(host)
        .map_err(|e| AiorgError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AiorgError::Config(format!(
            "{} must use http or https, got {}",
            field,
            parsed.scheme()
        ))
        .into());
    }
    Ok(())
}

/// Strips trailing slashes so that route paths can be appended directly
///
/// # Examples
///
/// ```
/// use aiorg::config::normalize_endpoint;
///
/// assert_eq!(normalize_endpoint("http://localhost:11434/"), "http://localhost:11434");
/// assert_eq!(normalize_endpoint(" http://gpu-box:11434 "), "http://gpu-box:11434");
/// ```
pub fn normalize_endpoint(endpoint: &str) -> String {
    endpoint.trim().trim_end_matches('/').to_string()
}

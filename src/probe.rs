//! Reachability check for the model server
//!
//! [`ConnectionProbe`] is independent of any chat session. A status is
//! computed on every call and never cached.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::normalize_endpoint;
use crate::error::{AiorgError, ChatResult};

/// Default timeout for probe requests
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Outcome of one reachability check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub reachable: bool,
    pub checked_at: DateTime<Utc>,
    /// Server version when reachable, failure reason otherwise
    pub detail: Option<String>,
}

/// Model installed on the server, as listed by `/api/tags`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
}

impl ModelSummary {
    /// Human readable size, e.g. `1.9GB`
    pub fn display_size(&self) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
        let mut size = self.size as f64;
        let mut unit = 0;

        while size >= 1024.0 && unit < UNITS.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }

        format!("{:.1}{}", size, UNITS[unit])
    }
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelSummary>,
}

/// Lightweight HTTP checks against a model server
#[derive(Debug, Clone)]
pub struct ConnectionProbe {
    client: Client,
}

impl ConnectionProbe {
    /// Creates a probe with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns [`AiorgError::Connection`] if the HTTP client cannot be built.
    pub fn new() -> ChatResult<Self> {
        let client = Client::builder()
            .user_agent(concat!("aiorg/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiorgError::Connection(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Checks whether the server at `endpoint` answers within `timeout`
    ///
    /// Never fails: any problem yields `reachable == false` with the reason
    /// in `detail`.
    pub async fn check(&self, endpoint: &str, timeout: Duration) -> ConnectionStatus {
        let url = format!("{}/api/version", normalize_endpoint(endpoint));
        tracing::debug!("Probing model server: {}", url);

        let result = self.client.get(&url).timeout(timeout).send().await;
        let checked_at = Utc::now();

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                let reason = if e.is_timeout() {
                    format!("no answer within {:?}", timeout)
                } else {
                    format!("unreachable: {}", e)
                };
                tracing::warn!("Model server at {} is {}", endpoint, reason);
                return ConnectionStatus {
                    reachable: false,
                    checked_at,
                    detail: Some(reason),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Model server at {} answered {}", endpoint, status);
            return ConnectionStatus {
                reachable: false,
                checked_at,
                detail: Some(format!("server answered {}", status)),
            };
        }

        let version = response
            .json::<VersionResponse>()
            .await
            .ok()
            .and_then(|body| body.version);
        tracing::info!(
            "Model server at {} is reachable (version {})",
            endpoint,
            version.as_deref().unwrap_or("unknown")
        );

        ConnectionStatus {
            reachable: true,
            checked_at,
            detail: version,
        }
    }

    /// Lists the models installed on the server
    ///
    /// # Errors
    ///
    /// Returns `Connection`, `Timeout`, `Server` or `Protocol` errors when the
    /// listing cannot be fetched or decoded.
    pub async fn list_models(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> ChatResult<Vec<ModelSummary>> {
        let url = format!("{}/api/tags", normalize_endpoint(endpoint));
        tracing::debug!("Fetching models from {}", url);

        let response = self
            .client
            .get(&url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Failed to fetch models: {}", e);
                if e.is_timeout() {
                    AiorgError::Timeout(timeout)
                } else {
                    AiorgError::Connection(format!("Failed to connect to {}: {}", endpoint, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!("Model listing returned error {}: {}", status, body);
            return Err(AiorgError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let tags: TagsResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse model listing: {}", e);
            AiorgError::Protocol(format!("invalid /api/tags response: {}", e))
        })?;

        tracing::debug!("Fetched {} models", tags.models.len());
        Ok(tags.models)
    }
}

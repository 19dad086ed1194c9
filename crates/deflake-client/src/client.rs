//! HTTP transport to the fix-suggestion service
//!
//! One POST per failing run. Failures are reported, never retried: the
//! caller decides what a failed triage means for its exit code.

use crate::auth::ClientSettings;
use crate::types::{HealRequest, HealResponse};
use async_trait::async_trait;
use deflake_core::{DeflakeError, Result};
use serde_json::Value;
use tracing::{debug, error, info, instrument};

/// Anything that can turn a heal request into a response
#[async_trait]
pub trait ReportClient: Send + Sync {
    /// Send one evidence bundle and wait for the verdict
    async fn heal(&self, request: &HealRequest) -> Result<HealResponse>;

    /// Short human-readable description of the destination
    fn endpoint(&self) -> &str;
}

/// Production transport over HTTP
#[derive(Clone)]
pub struct HttpReportClient {
    api_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl HttpReportClient {
    /// Create a client; fails without touching the network if no key is configured
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let api_key = settings.api_key.ok_or(DeflakeError::MissingApiKey {
            env_var: settings.api_key_env,
        })?;

        Ok(Self {
            api_url: settings.api_url,
            api_key,
            http: reqwest::Client::new(),
        })
    }

    /// First four characters of the key, for logs
    fn masked_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(4).collect();
        format!("{}***", prefix)
    }
}

impl std::fmt::Debug for HttpReportClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpReportClient")
            .field("api_url", &self.api_url)
            .field("api_key", &self.masked_key())
            .finish()
    }
}

#[async_trait]
impl ReportClient for HttpReportClient {
    #[instrument(skip(self, request), fields(url = %self.api_url))]
    async fn heal(&self, request: &HealRequest) -> Result<HealResponse> {
        info!("Authenticating with API key {}", self.masked_key());
        debug!(
            "Sending {} chars of log and {} chars of snapshot",
            request.error_log.len(),
            request.html_snapshot.len()
        );

        let response = self
            .http
            .post(&self.api_url)
            .header("X-API-KEY", &self.api_key)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| DeflakeError::Transport(format!("Failed to reach {}: {}", self.api_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown".to_string());
            let mut detail = error_detail(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown").to_string());
            if status.as_u16() == 403 {
                detail.push_str(" (Access denied. Check your API key.)");
            }

            error!("API error {}: {}", status, detail);
            return Err(DeflakeError::Api {
                status: status.as_u16(),
                detail,
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| DeflakeError::Transport(format!("Failed to parse response: {}", e)))?;

        Ok(HealResponse::new(raw))
    }

    fn endpoint(&self) -> &str {
        &self.api_url
    }
}

/// `detail` field of an error body, if the body is JSON and has one
fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

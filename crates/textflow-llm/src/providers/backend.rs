use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use textflow_core::config::ProcessorConfig;
use textflow_core::error::{Result, TextflowError};
use textflow_core::traits::StepProcessor;
use textflow_core::types::{BackendHealth, StepKind};

use super::{http_client, request_error};

/// Client for a remote step-processing service.
///
/// Each step is `POST {base_url}/process/{kind}` with `{"text": ...}`.
/// The service answers `{"success": true, "result": ...}` or
/// `{"success": false, "error": ...}`.
pub struct BackendProcessor {
    http: Client,
    base_url: String,
    timeout_secs: u64,
    health_timeout: Duration,
}

impl BackendProcessor {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let base_url = config
            .base_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| TextflowError::Config("Step backend: base_url is required".into()))?;

        Ok(Self {
            http: http_client(config.timeout_secs)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs: config.timeout_secs,
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Serialize)]
struct ProcessRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug, Default)]
struct ProcessResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Debug)]
struct HealthResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    llm_connection: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Turn a backend reply into the step output or the backend's own message.
fn interpret(status: reqwest::StatusCode, body: &str) -> std::result::Result<String, String> {
    let parsed: ProcessResponse = serde_json::from_str(body).unwrap_or_default();

    if let Some(error) = parsed.error.filter(|e| !e.is_empty()) {
        return Err(error);
    }
    if !status.is_success() {
        return Err(format!("HTTP {}", status));
    }
    parsed
        .result
        .ok_or_else(|| "Malformed response from step backend: missing result".to_string())
}

impl StepProcessor for BackendProcessor {
    fn name(&self) -> &str {
        "backend"
    }

    fn process(&self, kind: StepKind, text: &str) -> BoxFuture<'_, Result<String>> {
        let text = text.to_string();

        Box::pin(async move {
            let url = format!("{}/process/{}", self.base_url, kind);
            debug!(step = %kind, url = %url, "Sending step to backend");

            let response = self
                .http
                .post(&url)
                .json(&ProcessRequest { text: &text })
                .send()
                .await
                .map_err(|e| request_error(e, kind, self.timeout_secs, ""))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| request_error(e, kind, self.timeout_secs, ""))?;

            interpret(status, &body).map_err(TextflowError::Processor)
        })
    }

    fn health(&self) -> BoxFuture<'_, BackendHealth> {
        Box::pin(async move {
            let url = format!("{}/health", self.base_url);
            let response = match self.http.get(&url).timeout(self.health_timeout).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(url = %url, error = %e, "Step backend health check failed");
                    return BackendHealth::unreachable(e.to_string());
                }
            };

            match response.json::<HealthResponse>().await {
                Ok(h) if h.status == "healthy" => {
                    let llm = h.llm_connection.unwrap_or_default();
                    let connected = llm == "connected";
                    BackendHealth {
                        reachable: true,
                        llm_connected: connected,
                        detail: if connected { None } else { Some(llm) },
                    }
                }
                Ok(h) => BackendHealth::unreachable(
                    h.error.unwrap_or_else(|| format!("status: {}", h.status)),
                ),
                Err(e) => BackendHealth::unreachable(format!("invalid health response: {}", e)),
            }
        })
    }
}

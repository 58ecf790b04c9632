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
use crate::prompts::{error_prefix, prompt_for};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini native API processor.
///
/// Each step is a single non-streaming `generateContent` call with a
/// step-specific prompt.
pub struct GeminiProcessor {
    http: Client,
    base_url: String,
    model_id: String,
    api_key: String,
    timeout_secs: u64,
    health_timeout: Duration,
}

impl GeminiProcessor {
    pub fn new(config: &ProcessorConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty() && !k.starts_with("${"))
            .ok_or_else(|| TextflowError::Config("Gemini: api_key is required".into()))?;

        Ok(Self {
            http: http_client(config.timeout_secs)?,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model_id: config.model_id.clone(),
            api_key: api_key.to_string(),
            timeout_secs: config.timeout_secs,
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model_id)
    }

    fn request(&self, prompt: String) -> reqwest::RequestBuilder {
        self.http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateRequest {
                contents: vec![GeminiContent {
                    role: Some("user".to_string()),
                    parts: vec![GeminiPart { text: prompt }],
                }],
            })
    }
}

// ── Request types ────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<GeminiContent>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize, Debug)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

// ── Response types ───────────────────────────────────────────────

#[derive(Deserialize, Debug)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize, Debug)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize, Debug)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Deserialize, Debug)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: String,
}

// ── Parsing ──────────────────────────────────────────────────────

/// Concatenate the first candidate's text parts, trimmed.
fn extract_text(body: &str) -> std::result::Result<String, String> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).map_err(|e| format!("malformed response: {}", e))?;

    let text = parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err("model returned no text".to_string());
    }
    Ok(text.to_string())
}

/// Pull the human-readable message out of a Gemini error body.
fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<GeminiErrorBody>(body) {
        Ok(err) if !err.error.message.is_empty() => {
            format!("HTTP {}: {}", status, err.error.message)
        }
        _ => format!("HTTP {}: {}", status, body),
    }
}

impl StepProcessor for GeminiProcessor {
    fn name(&self) -> &str {
        "gemini"
    }

    fn process(&self, kind: StepKind, text: &str) -> BoxFuture<'_, Result<String>> {
        let prompt = prompt_for(kind, text);

        Box::pin(async move {
            let prefix = error_prefix(kind);
            debug!(step = %kind, model = %self.model_id, "Sending step to Gemini");

            let response = self
                .request(prompt)
                .send()
                .await
                .map_err(|e| request_error(e, kind, self.timeout_secs, prefix))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| request_error(e, kind, self.timeout_secs, prefix))?;

            if !status.is_success() {
                return Err(TextflowError::Processor(format!(
                    "{}: {}",
                    prefix,
                    error_message(status, &body)
                )));
            }

            extract_text(&body).map_err(|e| TextflowError::Processor(format!("{}: {}", prefix, e)))
        })
    }

    fn health(&self) -> BoxFuture<'_, BackendHealth> {
        Box::pin(async move {
            let result = self
                .request("test".to_string())
                .timeout(self.health_timeout)
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => BackendHealth::healthy(),
                Ok(resp) => {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    BackendHealth {
                        reachable: true,
                        llm_connected: false,
                        detail: Some(format!("disconnected: {}", error_message(status, &body))),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Gemini health check failed");
                    BackendHealth::unreachable(e.to_string())
                }
            }
        })
    }
}

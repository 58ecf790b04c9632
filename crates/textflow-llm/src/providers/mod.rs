pub mod backend;
pub mod gemini;

pub use backend::BackendProcessor;
pub use gemini::GeminiProcessor;

use std::time::Duration;

use textflow_core::error::{Result, TextflowError};
use textflow_core::types::StepKind;

/// Build an HTTP client with a per-request timeout.
fn http_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TextflowError::Config(format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport error for one step call.
fn request_error(e: reqwest::Error, step: StepKind, timeout_secs: u64, prefix: &str) -> TextflowError {
    if e.is_timeout() {
        TextflowError::ProcessorTimeout { step, timeout_secs }
    } else if prefix.is_empty() {
        TextflowError::Processor(e.to_string())
    } else {
        TextflowError::Processor(format!("{}: {}", prefix, e))
    }
}

pub mod prompts;
pub mod providers;

use textflow_core::config::ProcessorConfig;
use textflow_core::error::{Result, TextflowError};
use textflow_core::traits::StepProcessor;

pub use providers::backend::BackendProcessor;
pub use providers::gemini::GeminiProcessor;

/// Create a step processor based on the provider name.
pub fn create_processor(config: &ProcessorConfig) -> Result<Box<dyn StepProcessor>> {
    match config.provider.as_str() {
        "gemini" | "google" => Ok(Box::new(GeminiProcessor::new(config)?)),
        "backend" | "http" => Ok(Box::new(BackendProcessor::new(config)?)),
        other => Err(TextflowError::Config(format!(
            "Unsupported step processor provider: {}",
            other
        ))),
    }
}

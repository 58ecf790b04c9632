use std::sync::Arc;

use textflow_core::config::GatewayConfig;
use textflow_core::traits::{RunHistoryStore, WorkflowStore};
use textflow_engine::WorkflowRunner;

/// Shared application state for axum handlers.
pub struct AppState {
    pub config: GatewayConfig,
    pub runner: Arc<WorkflowRunner>,
    pub workflows: Arc<dyn WorkflowStore>,
    pub history: Arc<dyn RunHistoryStore>,
}

impl AppState {
    /// Clamp a requested history size into `1..=max_history_limit`.
    ///
    /// Missing, zero or unparseable values fall back to the default.
    pub fn history_limit(&self, requested: Option<&str>) -> usize {
        let limit = requested
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(self.config.default_history_limit);
        limit.clamp(1, self.config.max_history_limit.max(1))
    }
}

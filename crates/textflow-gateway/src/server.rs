use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::info;

use textflow_core::config::GatewayConfig;
use textflow_core::traits::{RunHistoryStore, WorkflowStore};
use textflow_engine::WorkflowRunner;

use crate::routes;
use crate::state::AppState;

/// Build the API router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/status", get(routes::status))
        .route(
            "/api/workflows",
            get(routes::list_workflows).post(routes::create_workflow),
        )
        // The literal `run` segment takes priority over the `{id}` capture.
        .route("/api/workflows/run", post(routes::run_workflow))
        .route(
            "/api/workflows/{id}",
            get(routes::get_workflow).delete(routes::delete_workflow),
        )
        .route("/api/workflows/{id}/run", post(routes::run_saved_workflow))
        .route("/api/history", get(routes::history))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// HTTP gateway server built on axum.
pub struct GatewayServer {
    config: GatewayConfig,
    runner: Arc<WorkflowRunner>,
    workflows: Arc<dyn WorkflowStore>,
    history: Arc<dyn RunHistoryStore>,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        runner: Arc<WorkflowRunner>,
        workflows: Arc<dyn WorkflowStore>,
        history: Arc<dyn RunHistoryStore>,
    ) -> Self {
        Self {
            config,
            runner,
            workflows,
            history,
        }
    }

    /// Run the gateway server until the cancellation token is triggered.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            runner: self.runner.clone(),
            workflows: self.workflows.clone(),
            history: self.history.clone(),
        });

        let app = router(state);

        let listener = TcpListener::bind(&self.config.bind).await?;
        info!(bind = %self.config.bind, "Gateway listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("Gateway shut down");
        Ok(())
    }
}

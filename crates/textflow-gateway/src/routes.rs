use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use textflow_core::types::{NewWorkflow, RunInput, Workflow, WorkflowId};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = std::result::Result<T, ApiError>;

fn connected(ok: bool) -> &'static str {
    if ok {
        "connected"
    } else {
        "disconnected"
    }
}

// GET /api/health
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// GET /api/status: step backend, database and model reachability
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let processor = state.runner.processor();
    let backend = processor.health().await;
    let database = state.history.ping().await;

    if !backend.reachable {
        warn!(detail = ?backend.detail, "Step backend health check failed");
    }

    let db_ok = database.is_ok();
    let overall = if backend.reachable && backend.llm_connected && db_ok {
        "healthy"
    } else {
        "degraded"
    };

    Json(json!({
        "success": true,
        "status": overall,
        "services": {
            "backend": {
                "status": connected(backend.reachable),
                "processor": processor.name(),
                "detail": backend.detail,
            },
            "database": {
                "status": connected(db_ok),
                "message": match database {
                    Ok(()) => "Database connection successful".to_string(),
                    Err(e) => e.to_string(),
                },
            },
            "llm": {
                "status": connected(backend.llm_connected),
            },
        },
    }))
}

// GET /api/workflows
pub async fn list_workflows(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let workflows = state.workflows.list_workflows().await?;
    Ok(Json(json!({ "success": true, "workflows": workflows })))
}

// POST /api/workflows
pub async fn create_workflow(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<NewWorkflow>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(new) = body?;
    let workflow = Workflow::create(new)?;
    state.workflows.create_workflow(&workflow).await?;

    info!(workflow_id = %workflow.id, name = %workflow.name, "Workflow created");
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "workflowId": workflow.id })),
    ))
}

// GET /api/workflows/{id}
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let workflow = state
        .workflows
        .get_workflow(&WorkflowId::from_string(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Workflow"))?;
    Ok(Json(json!({ "success": true, "workflow": workflow })))
}

// DELETE /api/workflows/{id}
pub async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    if !state
        .workflows
        .delete_workflow(&WorkflowId::from_string(&id))
        .await?
    {
        return Err(ApiError::not_found("Workflow"));
    }

    info!(workflow_id = %id, "Workflow deleted");
    Ok(Json(json!({
        "success": true,
        "message": "Workflow deleted successfully",
    })))
}

async fn run(state: &AppState, input: RunInput) -> ApiResult<Json<Value>> {
    let run = state.runner.execute(input).await?;
    Ok(Json(json!({
        "success": true,
        "runId": run.run_id,
        "results": run.results,
    })))
}

// POST /api/workflows/run: ad-hoc run with the caller's step list
pub async fn run_workflow(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<RunInput>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(input) = body?;
    run(&state, input).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSavedBody {
    #[serde(default)]
    pub input_text: String,
}

// POST /api/workflows/{id}/run: run a stored workflow
pub async fn run_saved_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: std::result::Result<Json<RunSavedBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let workflow = state
        .workflows
        .get_workflow(&WorkflowId::from_string(&id))
        .await?
        .ok_or_else(|| ApiError::not_found("Workflow"))?;

    run(&state, RunInput::from_workflow(&workflow, body.input_text)).await
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
}

// GET /api/history?limit=5&workflowId=...
pub async fn history(
    State(state): State<Arc<AppState>>,
    Query(q): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let limit = state.history_limit(q.limit.as_deref());
    let history = match q.workflow_id.filter(|id| !id.is_empty()) {
        Some(id) => {
            state
                .history
                .list_for_workflow(&WorkflowId::from_string(&id), limit)
                .await?
        }
        None => state.history.list_recent(limit).await?,
    };
    Ok(Json(json!({ "success": true, "history": history })))
}

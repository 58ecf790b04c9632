use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use textflow_core::error::TextflowError;

/// Error response body: `{"success": false, "error": ..., ...}`.
pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "success": false, "error": message.into() }),
        }
    }

    pub fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", what))
    }
}

impl From<TextflowError> for ApiError {
    fn from(e: TextflowError) -> Self {
        match e {
            TextflowError::Validation(message) => Self::new(StatusCode::BAD_REQUEST, message),
            TextflowError::WorkflowNotFound(_) => Self::not_found("Workflow"),
            TextflowError::StepExecution {
                step,
                index,
                message,
            } => Self {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!({
                    "success": false,
                    "error": message,
                    "failedStep": step,
                    "failedStepIndex": index,
                }),
            },
            other => {
                error!(error = %other, "Request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

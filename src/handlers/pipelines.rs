// src/handlers/pipelines.rs
//! Pipeline control endpoints - start, cancel, retry, status

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::pipeline::{JobOptions, PipelineError};
use crate::AppState;

#[derive(Deserialize)]
pub struct StartPipelineRequest {
    pub campaign_id: Option<String>,
    #[serde(flatten)]
    pub options: JobOptions,
}

#[derive(Deserialize, Default)]
pub struct RetryPipelineRequest {
    #[serde(flatten)]
    pub options: JobOptions,
}

fn error_response(e: PipelineError) -> Response {
    let status = match &e {
        PipelineError::JobNotFound(_) => StatusCode::NOT_FOUND,
        PipelineError::NotStartable { .. } => StatusCode::CONFLICT,
        PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}

/// POST /api/pipelines/:job_id/start - Start or resume a pipeline run
pub async fn start_pipeline(
    Path(job_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<StartPipelineRequest>,
) -> impl IntoResponse {
    match state
        .service
        .start(&job_id, request.campaign_id, request.options)
        .await
    {
        Ok(job) => {
            tracing::info!("🎬 Pipeline accepted for job {}", job_id);
            (StatusCode::ACCEPTED, Json(json!({ "job": job }))).into_response()
        }
        Err(e) => {
            tracing::warn!("Start rejected for job {}: {}", job_id, e);
            error_response(e)
        }
    }
}

/// POST /api/pipelines/:job_id/cancel - Cancel a running pipeline
pub async fn cancel_pipeline(
    Path(job_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.service.cancel(&job_id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            tracing::warn!("Cancel rejected for job {}: {}", job_id, e);
            error_response(e)
        }
    }
}

/// POST /api/pipelines/:job_id/retry - Re-run the failed parts of a pipeline
pub async fn retry_pipeline(
    Path(job_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<RetryPipelineRequest>,
) -> impl IntoResponse {
    match state.service.retry(&job_id, request.options).await {
        Ok(outcome) => {
            tracing::info!("🔁 Retry accepted for job {}", job_id);
            (StatusCode::ACCEPTED, Json(outcome)).into_response()
        }
        Err(e) => {
            tracing::warn!("Retry rejected for job {}: {}", job_id, e);
            error_response(e)
        }
    }
}

/// GET /api/pipelines/:job_id/status - Job, task and clip progress
pub async fn pipeline_status(
    Path(job_id): Path<String>,
    Extension(state): Extension<Arc<AppState>>,
) -> impl IntoResponse {
    match state.service.status(&job_id).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Routes for pipeline management
pub fn pipeline_routes() -> Router {
    Router::new()
        .route("/api/pipelines/:job_id/start", post(start_pipeline))
        .route("/api/pipelines/:job_id/cancel", post(cancel_pipeline))
        .route("/api/pipelines/:job_id/retry", post(retry_pipeline))
        .route("/api/pipelines/:job_id/status", get(pipeline_status))
}

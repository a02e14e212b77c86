// src/handlers/status.rs
//! API health check and system status

use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;

use crate::utils::check_ffmpeg_available;
use crate::AppState;

/// GET /api/status - API health check
pub async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    let db_status = match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let ffmpeg_status = match check_ffmpeg_available() {
        Ok(_) => "available",
        Err(_) => "missing",
    };

    let configured = |key: &str| std::env::var(key).map(|v| !v.is_empty()).unwrap_or(false);

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "ffmpeg": ffmpeg_status,
        },
        "providers": {
            "kling": configured("KLING_API_KEY"),
            "luma": configured("LUMA_API_KEY"),
            "elevenlabs": configured("ELEVEN_LABS_API_KEY"),
        },
        "endpoints": {
            "start": "/api/pipelines/:job_id/start",
            "cancel": "/api/pipelines/:job_id/cancel",
            "retry": "/api/pipelines/:job_id/retry",
            "job_status": "/api/pipelines/:job_id/status"
        }
    }))
}

pub fn status_routes() -> Router {
    Router::new().route("/api/status", get(api_status))
}

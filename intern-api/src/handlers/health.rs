//! Health Check Handlers

use axum::{extract::State, Json};
use chrono::Utc;

use crate::dto::HealthResponse;
use crate::error::ApiResult;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = match state.check_storage().await {
        Ok(()) => "healthy",
        Err(e) => {
            tracing::warn!(error = %e, "Storage health check failed");
            "degraded"
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        version: crate::VERSION.to_string(),
        timestamp: Utc::now(),
    })
}

/// Liveness probe
pub async fn liveness() -> &'static str {
    "OK"
}

/// Readiness probe
pub async fn readiness(State(state): State<AppState>) -> ApiResult<&'static str> {
    state.check_storage().await?;
    Ok("OK")
}

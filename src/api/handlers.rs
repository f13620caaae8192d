use axum::{extract::State, http::StatusCode, Json};

use crate::api::responses::{LivenessResponse, WelcomeResponse};
use crate::error::{AppError, HttpFault};
use crate::observability::{DiagnosticReport, ReadinessReport};

use super::routes::AppState;

/// Root endpoint.
pub async fn root(State(state): State<AppState>) -> Json<WelcomeResponse> {
    Json(WelcomeResponse {
        message: format!("Welcome to {}", state.app_name),
    })
}

/// Diagnostic health endpoint. Always 200; degraded dependencies are reported in the body.
pub async fn health_check(State(state): State<AppState>) -> Json<DiagnosticReport> {
    Json(state.health_checker.check_diagnostic().await)
}

/// Liveness probe endpoint.
pub async fn liveness_check() -> Json<LivenessResponse> {
    Json(LivenessResponse::alive())
}

/// Readiness probe endpoint. 503 when any dependency is not `Ok`.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessReport>) {
    let report = state.health_checker.check_readiness().await;
    (report.status_code(), Json(report))
}

/// Prometheus exposition endpoint.
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, AppError> {
    match &state.metrics_handle {
        Some(handle) => Ok(handle.render()),
        None => Err(HttpFault::not_found().into()),
    }
}

/// Fallback for unmatched routes.
pub async fn not_found() -> AppError {
    HttpFault::not_found().into()
}

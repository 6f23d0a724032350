use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

/// Liveness: the process is up and serving.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "insider-risk-monitor"
    }))
}

/// Readiness: the backing store answers queries.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.check_health().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ready"}))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not ready", "error": e.to_string()})),
        ),
    }
}

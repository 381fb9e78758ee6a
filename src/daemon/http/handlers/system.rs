//! System handlers: health and metrics

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use super::AppState;
use crate::daemon::http::types::HealthResponse;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

/// Prometheus text exposition
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    // Refresh the gauge so it reflects the store, not the last poll cycle
    let _ = state.orchestrator.active_campaigns();
    let body = state.orchestrator.metrics().to_prometheus();
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

//! Health and metrics endpoints

use axum::{Json, extract::State, response::IntoResponse};

use crate::AppState;
use crate::metrics::HealthStatus;

/// Health check endpoint - returns relay status and counters
pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let relay = &state.relay;
    let metrics = relay.metrics().snapshot();

    Json(HealthStatus {
        status: "healthy".to_string(),
        connections: relay.registry().len().await as u64,
        history_len: relay.history().len().await,
        uptime_secs: metrics.uptime_secs,
        metrics,
    })
}

/// Metrics endpoint - returns the raw counter snapshot
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.relay.metrics().snapshot())
}

//! Health Routes
//!
//! Health check endpoints for monitoring and Kubernetes probes.
//!
//! - GET /health/live - Liveness probe (process is alive)
//! - GET /health/ready - Readiness probe (ready to serve traffic)
//! - GET /health - Full health status

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use crate::api::dto::HealthResponse;
use crate::api::state::AppState;

/// GET /health/live
///
/// Kubernetes liveness probe.
/// Returns 200 if the process is alive, no dependency checks.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// GET /health/ready
///
/// Kubernetes readiness probe.
/// Returns 200 if the room table can be read.
pub async fn readiness(State(state): State<Arc<AppState>>) -> StatusCode {
    match state.hub.room_count() {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// GET /health
///
/// Full health status with room and connection counts.
pub async fn full_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (status, hub, rooms) = match state.hub.room_count() {
        Ok(rooms) => ("healthy", "ok", rooms),
        Err(e) => {
            tracing::warn!(error = %e, "Room table unavailable");
            ("unhealthy", "error", 0)
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        hub: hub.to_string(),
        rooms,
        connections: state.connection_count(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

//! Connectivity Probe
//!
//! - GET|POST /api/test/ - Confirms the frontend can reach the backend

use axum::{http::Method, Json};

use crate::api::dto::ProbeResponse;

/// GET /api/test/
pub async fn test_connection(method: Method) -> Json<ProbeResponse> {
    Json(ProbeResponse {
        status: "success".to_string(),
        message: "Backend is connected!".to_string(),
        method: method.to_string(),
    })
}

//! Data Transfer Objects
//!
//! Response types for the HTTP endpoints.
//! These types are serialized to JSON.

use serde::Serialize;

use crate::session::RoomSummary;

// ============================================
// PROBE DTOs
// ============================================

/// Connectivity probe response
#[derive(Debug, Serialize)]
pub struct ProbeResponse {
    /// Always "success"
    pub status: String,
    pub message: String,
    /// HTTP method of the probe request
    pub method: String,
}

// ============================================
// ROOM DTOs
// ============================================

/// Live rooms listing
#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomSummary>,
    pub total: usize,
}

// ============================================
// HEALTH DTOs
// ============================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy" or "unhealthy"
    pub status: String,
    /// Hub status: "ok" or "error"
    pub hub: String,
    /// Live rooms
    pub rooms: usize,
    /// Open WebSocket connections
    pub connections: usize,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Server version
    pub version: String,
}

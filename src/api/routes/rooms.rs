//! Room Routes
//!
//! Read-only views of live collaboration rooms.
//!
//! - GET /api/v1/rooms - List live rooms
//! - GET /api/v1/rooms/:room_id - Describe one room

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::dto::RoomListResponse;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::session::RoomSummary;

/// GET /api/v1/rooms
pub async fn list_rooms(State(state): State<Arc<AppState>>) -> ApiResult<Json<RoomListResponse>> {
    let rooms = state.hub.room_summaries()?;

    Ok(Json(RoomListResponse {
        total: rooms.len(),
        rooms,
    }))
}

/// GET /api/v1/rooms/:room_id
pub async fn get_room(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
) -> ApiResult<Json<RoomSummary>> {
    state
        .hub
        .room_summary(&room_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Room '{}'", room_id)))
}

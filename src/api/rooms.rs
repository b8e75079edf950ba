use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::connection_manager::RoomInfo;
use crate::error::{AppError, Result};
use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct RoomListResponse {
    pub rooms: Vec<RoomInfo>,
    pub total: usize,
}

/// GET /api/v1/rooms
pub async fn list_rooms(State(state): State<AppState>) -> Json<RoomListResponse> {
    let rooms = state.connection_manager.list_rooms();
    let total = rooms.len();
    Json(RoomListResponse { rooms, total })
}

/// GET /api/v1/rooms/{name}
pub async fn get_room(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<RoomInfo>> {
    let member_count = state.connection_manager.get_room_connections(&name).len();
    if member_count == 0 {
        return Err(AppError::NotFound(format!("Room '{}' has no members", name)));
    }

    Ok(Json(RoomInfo { name, member_count }))
}

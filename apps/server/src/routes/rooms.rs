// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room listing endpoints.

use crate::error::ApiError;
use crate::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use ifc_share_viewer::collab::RoomId;
use serde::Serialize;

/// Longest accepted room id.
pub const MAX_ROOM_ID_LEN: usize = 128;

/// One active room.
#[derive(Debug, Serialize)]
pub struct RoomInfo {
    pub room: RoomId,
    pub members: usize,
}

/// Room listing response.
#[derive(Debug, Serialize)]
pub struct RoomsResponse {
    pub rooms: Vec<RoomInfo>,
}

/// GET /api/v1/rooms - Active rooms with member counts.
pub async fn list(State(state): State<AppState>) -> Json<RoomsResponse> {
    let rooms = state
        .hub
        .rooms()
        .into_iter()
        .map(|(room, members)| RoomInfo { room, members })
        .collect();
    Json(RoomsResponse { rooms })
}

/// GET /api/v1/rooms/:room - Member count of one room.
pub async fn get(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> Result<Json<RoomInfo>, ApiError> {
    if room.trim().is_empty() || room.len() > MAX_ROOM_ID_LEN {
        return Err(ApiError::BadRequest(format!(
            "room id must be 1 to {} bytes",
            MAX_ROOM_ID_LEN
        )));
    }

    let room = RoomId::new(room);
    match state.hub.members(&room) {
        0 => Err(ApiError::NotFound(format!("Room has no members: {}", room))),
        members => Ok(Json(RoomInfo { room, members })),
    }
}

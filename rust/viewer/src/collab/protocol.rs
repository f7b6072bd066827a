// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire protocol of the selection relay.
//!
//! Every frame is a JSON envelope `{"event": "<name>", "data": <payload>}`:
//!
//! ```json
//! {"event": "join-room", "data": "demo-project-room"}
//! {"event": "element-selected", "data": {"modelID": 0, "id": 42}}
//! ```

use ifc_share_engine::{ElementId, ModelId, PickResult};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_ROOM: &str = "demo-project-room";
pub const JOIN_ROOM: &str = "join-room";
pub const LEAVE_ROOM: &str = "leave-room";
pub const ELEMENT_SELECTED: &str = "element-selected";

/// Identifier of a collaboration room.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(id: impl Into<String>) -> Self {
        RoomId(id.into())
    }

    /// The room shared by everyone viewing `project`.
    pub fn for_project(project: &str) -> Self {
        RoomId(format!("{project}-room"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RoomId {
    fn default() -> Self {
        RoomId(DEFAULT_ROOM.to_string())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        RoomId::new(id)
    }
}

/// Payload of `element-selected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionEvent {
    #[serde(rename = "modelID", alias = "modelId")]
    pub model_id: ModelId,
    #[serde(rename = "id", alias = "elementId", alias = "expressID")]
    pub element_id: ElementId,
}

impl SelectionEvent {
    pub fn new(model_id: ModelId, element_id: ElementId) -> Self {
        Self {
            model_id,
            element_id,
        }
    }
}

impl From<PickResult> for SelectionEvent {
    fn from(pick: PickResult) -> Self {
        Self::new(pick.model_id, pick.element_id)
    }
}

/// Frames a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom(RoomId),
    LeaveRoom(RoomId),
    ElementSelected(SelectionEvent),
}

/// Frames the relay sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Acknowledges `join-room`.
    Joined(RoomId),
    /// Acknowledges `leave-room`.
    Left(RoomId),
    ElementSelected(SelectionEvent),
    Error { message: String },
}

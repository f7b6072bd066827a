// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Room-scoped selection sharing.

pub mod channel;
pub mod hub;
pub mod protocol;
pub mod sync;

pub use channel::{Channel, ChannelError, ListenerId, LISTENER_CAPACITY};
pub use hub::{ClientId, HubClient, RoomHub, MAX_ROOMS_PER_CLIENT};
pub use protocol::{
    ClientMessage, RoomId, SelectionEvent, ServerMessage, DEFAULT_ROOM, ELEMENT_SELECTED,
    JOIN_ROOM, LEAVE_ROOM,
};
pub use sync::CollaborationSync;

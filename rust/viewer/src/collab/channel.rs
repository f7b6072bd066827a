// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Collaboration channel interface.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::protocol::{RoomId, SelectionEvent};

/// Queue depth for inbound selection listeners. Events arriving at a full
/// queue are dropped.
pub const LISTENER_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("not a member of any room")]
    NotJoined,

    #[error("channel closed")]
    Closed,

    #[error("room limit reached ({0} rooms per client)")]
    TooManyRooms(usize),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Token returned by [`Channel::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A room-scoped pub/sub connection.
///
/// Events a client emits reach the other members of its rooms, never the
/// client itself.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn join(&self, room: &RoomId) -> Result<(), ChannelError>;

    async fn leave(&self, room: &RoomId) -> Result<(), ChannelError>;

    async fn emit(&self, event: SelectionEvent) -> Result<(), ChannelError>;

    /// Subscribes to inbound `element-selected` events.
    fn on(&self, listener: mpsc::Sender<SelectionEvent>) -> ListenerId;

    /// Returns `false` when the listener was not registered.
    fn off(&self, listener: ListenerId) -> bool;
}

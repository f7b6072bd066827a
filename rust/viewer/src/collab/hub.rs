// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-process room relay.
//!
//! [`RoomHub`] is the room bookkeeping behind the relay server, and doubles as
//! an in-memory transport: every [`HubClient`] is a [`Channel`] connected to
//! the hub it came from.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, trace};

use super::channel::{Channel, ChannelError, ListenerId};
use super::protocol::{RoomId, SelectionEvent};

/// Most rooms a single client may be a member of at once.
pub const MAX_ROOMS_PER_CLIENT: usize = 32;

/// Hub-assigned id of a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

#[derive(Debug, Default)]
struct Member {
    rooms: BTreeSet<RoomId>,
    listeners: Vec<(ListenerId, mpsc::Sender<SelectionEvent>)>,
}

#[derive(Debug, Default)]
struct HubState {
    next_client: u64,
    next_listener: u64,
    clients: FxHashMap<ClientId, Member>,
    rooms: BTreeMap<RoomId, BTreeSet<ClientId>>,
}

impl HubState {
    fn leave(&mut self, client: ClientId, room: &RoomId) -> bool {
        let left = self
            .clients
            .get_mut(&client)
            .is_some_and(|member| member.rooms.remove(room));
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&client);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
        left
    }
}

/// Shared room registry. Cloning yields another handle to the same hub.
#[derive(Debug, Clone, Default)]
pub struct RoomHub {
    state: Arc<Mutex<HubState>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new client.
    pub fn connect(&self) -> HubClient {
        let mut state = self.state();
        let id = ClientId(state.next_client);
        state.next_client += 1;
        state.clients.insert(id, Member::default());
        debug!(client = id.0, "Client connected");
        HubClient {
            id,
            hub: self.clone(),
        }
    }

    /// Rooms with their member counts, ordered by room id.
    pub fn rooms(&self) -> Vec<(RoomId, usize)> {
        self.state()
            .rooms
            .iter()
            .map(|(room, members)| (room.clone(), members.len()))
            .collect()
    }

    pub fn members(&self, room: &RoomId) -> usize {
        self.state().rooms.get(room).map_or(0, BTreeSet::len)
    }

    pub fn client_count(&self) -> usize {
        self.state().clients.len()
    }

    fn join(&self, client: ClientId, room: &RoomId) -> Result<(), ChannelError> {
        let mut state = self.state();
        let member = state.clients.get_mut(&client).ok_or(ChannelError::Closed)?;
        if !member.rooms.contains(room) && member.rooms.len() >= MAX_ROOMS_PER_CLIENT {
            debug!(client = client.0, room = %room, "Room limit reached");
            return Err(ChannelError::TooManyRooms(MAX_ROOMS_PER_CLIENT));
        }
        member.rooms.insert(room.clone());
        state.rooms.entry(room.clone()).or_default().insert(client);
        debug!(client = client.0, room = %room, "Joined room");
        Ok(())
    }

    fn leave(&self, client: ClientId, room: &RoomId) -> Result<(), ChannelError> {
        let mut state = self.state();
        if !state.clients.contains_key(&client) {
            return Err(ChannelError::Closed);
        }
        if state.leave(client, room) {
            debug!(client = client.0, room = %room, "Left room");
        }
        Ok(())
    }

    /// Forwards `event` to every other member of the sender's rooms. Returns
    /// how many clients received it.
    fn relay(&self, sender: ClientId, event: SelectionEvent) -> Result<usize, ChannelError> {
        let mut guard = self.state();
        let state = &mut *guard;
        let member = state.clients.get(&sender).ok_or(ChannelError::Closed)?;
        if member.rooms.is_empty() {
            return Err(ChannelError::NotJoined);
        }

        let recipients: BTreeSet<ClientId> = member
            .rooms
            .iter()
            .filter_map(|room| state.rooms.get(room))
            .flatten()
            .copied()
            .filter(|client| *client != sender)
            .collect();

        let mut delivered = 0;
        for client in recipients {
            let Some(member) = state.clients.get_mut(&client) else {
                continue;
            };
            let before = member.listeners.len();
            let mut accepted = false;
            member.listeners.retain(|(_, tx)| match tx.try_send(event) {
                Ok(()) => {
                    accepted = true;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    trace!(client = client.0, "Listener queue full, selection dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
            if accepted {
                delivered += 1;
            }
            if member.listeners.len() < before {
                trace!(client = client.0, "Pruned closed listeners");
            }
        }
        trace!(sender = sender.0, delivered, "Selection relayed");
        Ok(delivered)
    }

    fn subscribe(
        &self,
        client: ClientId,
        listener: mpsc::Sender<SelectionEvent>,
    ) -> ListenerId {
        let mut state = self.state();
        let id = ListenerId(state.next_listener);
        state.next_listener += 1;
        if let Some(member) = state.clients.get_mut(&client) {
            member.listeners.push((id, listener));
        }
        id
    }

    fn unsubscribe(&self, client: ClientId, listener: ListenerId) -> bool {
        let mut state = self.state();
        let Some(member) = state.clients.get_mut(&client) else {
            return false;
        };
        let before = member.listeners.len();
        member.listeners.retain(|(id, _)| *id != listener);
        member.listeners.len() < before
    }

    fn disconnect(&self, client: ClientId) {
        let mut state = self.state();
        let Some(member) = state.clients.remove(&client) else {
            return;
        };
        for room in &member.rooms {
            if let Some(members) = state.rooms.get_mut(room) {
                members.remove(&client);
                if members.is_empty() {
                    state.rooms.remove(room);
                }
            }
        }
        debug!(client = client.0, "Client disconnected");
    }
}

/// One connection to a [`RoomHub`]. Disconnects when dropped.
#[derive(Debug)]
pub struct HubClient {
    id: ClientId,
    hub: RoomHub,
}

impl HubClient {
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Like [`Channel::emit`], but reports how many clients were reached.
    pub fn broadcast(&self, event: SelectionEvent) -> Result<usize, ChannelError> {
        self.hub.relay(self.id, event)
    }
}

#[async_trait]
impl Channel for HubClient {
    async fn join(&self, room: &RoomId) -> Result<(), ChannelError> {
        self.hub.join(self.id, room)
    }

    async fn leave(&self, room: &RoomId) -> Result<(), ChannelError> {
        self.hub.leave(self.id, room)
    }

    async fn emit(&self, event: SelectionEvent) -> Result<(), ChannelError> {
        self.hub.relay(self.id, event).map(|_| ())
    }

    fn on(&self, listener: mpsc::Sender<SelectionEvent>) -> ListenerId {
        self.hub.subscribe(self.id, listener)
    }

    fn off(&self, listener: ListenerId) -> bool {
        self.hub.unsubscribe(self.id, listener)
    }
}

impl Drop for HubClient {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifc_share_engine::{ElementId, ModelId};

    fn event(id: u32) -> SelectionEvent {
        SelectionEvent::new(ModelId(0), ElementId(id))
    }

    #[tokio::test]
    async fn relays_to_others_only() {
        let hub = RoomHub::new();
        let room = RoomId::default();
        let (a, b) = (hub.connect(), hub.connect());
        let (a_tx, mut a_rx) = mpsc::channel(8);
        let (b_tx, mut b_rx) = mpsc::channel(8);
        a.on(a_tx);
        b.on(b_tx);
        a.join(&room).await.unwrap();
        b.join(&room).await.unwrap();

        assert_eq!(a.broadcast(event(42)).unwrap(), 1);
        assert_eq!(b_rx.recv().await, Some(event(42)));
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn rooms_are_isolated() {
        let hub = RoomHub::new();
        let (a, b) = (hub.connect(), hub.connect());
        let (b_tx, mut b_rx) = mpsc::channel(8);
        b.on(b_tx);
        a.join(&RoomId::new("north")).await.unwrap();
        b.join(&RoomId::new("south")).await.unwrap();

        assert_eq!(a.broadcast(event(1)).unwrap(), 0);
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn emitting_outside_a_room_fails() {
        let hub = RoomHub::new();
        let a = hub.connect();
        assert_eq!(a.emit(event(1)).await, Err(ChannelError::NotJoined));
    }

    #[tokio::test]
    async fn shared_members_receive_once() {
        let hub = RoomHub::new();
        let (a, b) = (hub.connect(), hub.connect());
        let (b_tx, mut b_rx) = mpsc::channel(8);
        b.on(b_tx);
        for room in ["one", "two"] {
            a.join(&RoomId::new(room)).await.unwrap();
            b.join(&RoomId::new(room)).await.unwrap();
        }

        a.emit(event(5)).await.unwrap();
        assert_eq!(b_rx.recv().await, Some(event(5)));
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn membership_follows_connections() {
        let hub = RoomHub::new();
        let room = RoomId::default();
        let a = hub.connect();
        let b = hub.connect();
        a.join(&room).await.unwrap();
        b.join(&room).await.unwrap();
        assert_eq!(hub.rooms(), vec![(room.clone(), 2)]);

        drop(a);
        assert_eq!(hub.members(&room), 1);
        b.leave(&room).await.unwrap();
        assert!(hub.rooms().is_empty());
        assert_eq!(hub.client_count(), 1);
    }

    #[tokio::test]
    async fn off_stops_delivery() {
        let hub = RoomHub::new();
        let room = RoomId::default();
        let (a, b) = (hub.connect(), hub.connect());
        let (b_tx, mut b_rx) = mpsc::channel(8);
        let listener = b.on(b_tx);
        a.join(&room).await.unwrap();
        b.join(&room).await.unwrap();

        assert!(b.off(listener));
        assert!(!b.off(listener));
        assert_eq!(a.broadcast(event(9)).unwrap(), 0);
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn room_count_per_client_is_capped() {
        let hub = RoomHub::new();
        let a = hub.connect();
        for n in 0..MAX_ROOMS_PER_CLIENT {
            a.join(&RoomId::new(format!("room-{n}"))).await.unwrap();
        }

        assert_eq!(
            a.join(&RoomId::new("one-too-many")).await,
            Err(ChannelError::TooManyRooms(MAX_ROOMS_PER_CLIENT))
        );
        // Rejoining a current room is not a new membership.
        a.join(&RoomId::new("room-0")).await.unwrap();
        assert_eq!(hub.rooms().len(), MAX_ROOMS_PER_CLIENT);
    }

    #[tokio::test]
    async fn full_listener_queues_drop_events() {
        let hub = RoomHub::new();
        let room = RoomId::default();
        let (a, b) = (hub.connect(), hub.connect());
        let (b_tx, mut b_rx) = mpsc::channel(1);
        b.on(b_tx);
        a.join(&room).await.unwrap();
        b.join(&room).await.unwrap();

        assert_eq!(a.broadcast(event(1)).unwrap(), 1);
        assert_eq!(a.broadcast(event(2)).unwrap(), 0);
        assert_eq!(b_rx.recv().await, Some(event(1)));
        assert!(b_rx.try_recv().is_err());

        // The listener survives a full queue.
        assert_eq!(a.broadcast(event(3)).unwrap(), 1);
        assert_eq!(b_rx.recv().await, Some(event(3)));
    }
}

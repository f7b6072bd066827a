// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Applies selections made by other room members to the local engine.

use ifc_share_engine::Engine;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::channel::{Channel, ChannelError, ListenerId, LISTENER_CAPACITY};
use super::protocol::{RoomId, SelectionEvent};
use crate::lifecycle::Liveness;

struct Subscription {
    listener: ListenerId,
    task: JoinHandle<()>,
}

/// Room membership and inbound selection handling for one viewer.
///
/// Inbound events only ever highlight; they are never re-emitted, so a
/// selection cannot bounce around the room.
pub struct CollaborationSync {
    channel: Arc<dyn Channel>,
    engine: Arc<dyn Engine>,
    room: RoomId,
    liveness: Liveness,
    subscription: Mutex<Option<Subscription>>,
}

impl CollaborationSync {
    pub fn new(
        channel: Arc<dyn Channel>,
        engine: Arc<dyn Engine>,
        room: RoomId,
        liveness: Liveness,
    ) -> Self {
        Self {
            channel,
            engine,
            room,
            liveness,
            subscription: Mutex::new(None),
        }
    }

    fn subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Subscribes to inbound selections and joins the room. A second mount
    /// is a no-op.
    ///
    /// The subscription stays in place when joining fails, so a transport
    /// that recovers still delivers.
    pub async fn mount(&self) -> Result<(), ChannelError> {
        if self.is_mounted() {
            return Ok(());
        }

        let (tx, mut rx) = mpsc::channel::<SelectionEvent>(LISTENER_CAPACITY);
        let listener = self.channel.on(tx);
        let engine = Arc::clone(&self.engine);
        let liveness = self.liveness.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !liveness.is_alive() {
                    break;
                }
                let highlighted = engine
                    .highlight(event.model_id, &[event.element_id], true, true)
                    .await;
                if let Err(e) = highlighted {
                    debug!(element = %event.element_id, error = %e, "Remote highlight failed");
                }
            }
        });
        *self.subscription() = Some(Subscription { listener, task });

        self.channel.join(&self.room).await?;
        info!(room = %self.room, "Joined collaboration room");
        Ok(())
    }

    /// Shares a local selection with the room. Failures are logged and
    /// reported as `false`.
    pub async fn publish(&self, event: SelectionEvent) -> bool {
        if !self.liveness.is_alive() {
            return false;
        }
        match self.channel.emit(event).await {
            Ok(()) => true,
            Err(e) => {
                warn!(room = %self.room, error = %e, "Failed to publish selection");
                false
            }
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription().is_some()
    }

    /// Unsubscribes. Pending inbound events are dropped.
    pub fn unmount(&self) {
        if let Some(subscription) = self.subscription().take() {
            self.channel.off(subscription.listener);
            subscription.task.abort();
            debug!(room = %self.room, "Left collaboration room");
        }
    }
}

impl Drop for CollaborationSync {
    fn drop(&mut self) {
        self.unmount();
    }
}

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

use crate::state::{AppState, Outbound, PlayerId, RoomId};

/// A record enqueued by a connection's reader, destined for one connection
/// (unicast) or every connection in a room (broadcast). A single consumer
/// task drains this channel so that, within a room, enqueue order is
/// delivery order for every recipient.
pub enum DispatchEvent {
    Unicast {
        room_id: RoomId,
        player_id: PlayerId,
        payload: Outbound,
    },
    Broadcast {
        room_id: RoomId,
        payload: Outbound,
    },
}

/// A cheaply cloneable sender half, handed to every connection task so it
/// can enqueue outbound payloads without touching room internals directly.
#[derive(Clone)]
pub struct SwitchHandle {
    tx: mpsc::Sender<DispatchEvent>,
}

impl SwitchHandle {
    pub async fn unicast(&self, room_id: RoomId, player_id: PlayerId, payload: Outbound) {
        let _ = self
            .tx
            .send(DispatchEvent::Unicast {
                room_id,
                player_id,
                payload,
            })
            .await;
    }

    pub async fn broadcast(&self, room_id: RoomId, payload: Outbound) {
        let _ = self.tx.send(DispatchEvent::Broadcast { room_id, payload }).await;
    }
}

/// Build the switch channel and spawn its single consumer task. Overflow on
/// a full per-connection queue (capacity 256) suspends the consumer rather
/// than dropping the payload -- the design this implementation picked over
/// the drop-oldest alternative the spec also permits (see DESIGN.md).
pub fn spawn(state: Arc<AppState>) -> SwitchHandle {
    let (tx, rx) = mpsc::channel(1024);
    tokio::spawn(run_switch(state, rx));
    SwitchHandle { tx }
}

async fn run_switch(state: Arc<AppState>, mut rx: mpsc::Receiver<DispatchEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            DispatchEvent::Unicast {
                room_id,
                player_id,
                payload,
            } => {
                let Some(room) = state.rooms.get(&room_id) else {
                    trace!(room_id = %room_id, player_id = %player_id, "dropping unicast: room gone");
                    continue;
                };
                let Some(conn) = room.connections.get(&player_id) else {
                    trace!(room_id = %room_id, player_id = %player_id, "dropping unicast: connection gone");
                    continue;
                };
                if conn.tx.send(payload).await.is_err() {
                    trace!(room_id = %room_id, player_id = %player_id, "dropping unicast: queue closed");
                }
            }
            DispatchEvent::Broadcast { room_id, payload } => {
                let Some(room) = state.rooms.get(&room_id) else {
                    trace!(room_id = %room_id, "dropping broadcast: room gone");
                    continue;
                };
                for conn in room.connections.iter() {
                    let _ = conn.tx.send(payload.clone()).await;
                }
            }
        }
    }
}

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use minesweeper_core::protocol::ServerMessage;

use crate::state::{Outbound, Room};
use crate::switch::SwitchHandle;

const SCORE_UPDATE_INTERVAL: Duration = Duration::from_secs(3);

/// A monotonic-enough tick value for `score_updated` payloads; unix-nanos
/// is acceptable here, not a correctness-bearing clock.
pub fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// Start a per-room periodic scoreboard broadcaster. Returns the stop
/// handle; the room stores it and signals it on game end or teardown.
pub fn spawn_score_ticker(room: Arc<Room>, switch: SwitchHandle) -> oneshot::Sender<()> {
    let (stop_tx, mut stop_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SCORE_UPDATE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let scoreboard = room.scoreboard();
                    let tick = now_nanos();
                    switch
                        .broadcast(
                            room.id.clone(),
                            Outbound::Message(ServerMessage::ScoreUpdated { scoreboard, tick }),
                        )
                        .await;
                }
                _ = &mut stop_rx => {
                    debug!(room_id = %room.id, "score ticker stopped");
                    break;
                }
            }
        }
    });

    stop_tx
}

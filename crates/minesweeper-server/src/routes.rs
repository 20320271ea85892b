use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::response::IntoResponse;

use crate::state::{generate_room_id, AppState};
use crate::ws;

/// Liveness probe, per component 6's boundary glue.
pub async fn liveness() -> &'static str {
    "OK"
}

/// Issue a fresh room id. Collision with an existing room is possible but
/// vanishingly unlikely at this length, and is not re-checked here --
/// `create_room` on the socket is the authoritative existence check.
pub async fn create_room() -> impl IntoResponse {
    generate_room_id()
}

pub async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Path(room_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_socket(state, socket, room_id))
}

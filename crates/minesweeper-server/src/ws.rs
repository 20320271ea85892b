use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use minesweeper_core::{BoardError, ClientMessage, Player, ServerMessage, SettingsPatch};

use crate::cron::{self, now_nanos};
use crate::errors::RoomError;
use crate::state::{generate_player_id, AppState, ConnectionHandle, Outbound, PlayerId, Room, RoomId};
use crate::switch::SwitchHandle;

/// Hard-coded room size, matching the original server's own unconditional
/// `NewGameRoom(roomID, hostID, 4)` call (settings otherwise fully override
/// the board itself; only the room's player capacity is fixed here).
const ROOM_CAPACITY: usize = 4;

pub async fn handle_socket(state: Arc<AppState>, mut socket: WebSocket, room_id: RoomId) {
    let switch = state.switch();
    let (tx, mut outbound_rx) = mpsc::channel::<Outbound>(256);
    let mut player_id: Option<PlayerId> = None;

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Message(msg)) => {
                        if write_message(&mut socket, &msg).await.is_err() {
                            break;
                        }
                    }
                    Some(Outbound::CloseAfter(msg)) => {
                        let _ = write_message(&mut socket, &msg).await;
                        if let Some(pid) = player_id.take() {
                            unregister_connection(&state, &room_id, &pid);
                        }
                        break;
                    }
                    None => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(event) => {
                                handle_client_message(&state, &switch, &room_id, &tx, &mut player_id, event).await;
                            }
                            Err(error) => {
                                tracing::trace!(%error, "ignoring malformed client message");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        synthesize_leave(&state, &switch, &room_id, &mut player_id).await;
                        break;
                    }
                    Some(Err(error)) => {
                        warn!(%error, "websocket error, treating as leave");
                        synthesize_leave(&state, &switch, &room_id, &mut player_id).await;
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn write_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).expect("ServerMessage always serializes");
    socket.send(Message::Text(json.into())).await
}

async fn reply_direct(tx: &mpsc::Sender<Outbound>, msg: ServerMessage) {
    let _ = tx.send(Outbound::Message(msg)).await;
}

fn unregister_connection(state: &Arc<AppState>, room_id: &RoomId, player_id: &PlayerId) {
    if let Some(room) = state.rooms.get(room_id) {
        room.connections.remove(player_id);
    }
}

async fn teardown_room(state: &Arc<AppState>, room_id: &RoomId) {
    if let Some((_, room)) = state.rooms.remove(room_id) {
        if let Some(stop) = room.end() {
            let _ = stop.send(());
        }
        info!(room_id = %room_id, "room torn down");
    }
}

/// Deliver a close-and-unregister payload to `departing_id`'s own
/// connection and, if the room is now empty, tear it down.
///
/// Routing through the switch is correct as long as the room stays
/// registered long enough for its single consumer to catch up -- but when
/// this departure empties the room, teardown would race that consumer, so
/// the last departure is delivered directly instead.
async fn finalize_departure(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room: &Arc<Room>,
    room_id: &RoomId,
    departing_id: &PlayerId,
    ack: ServerMessage,
) {
    if room.is_empty() {
        if let Some(conn) = room.connections.get(departing_id) {
            let _ = conn.tx.send(Outbound::CloseAfter(ack)).await;
        }
        teardown_room(state, room_id).await;
    } else {
        switch
            .unicast(room_id.clone(), departing_id.clone(), Outbound::CloseAfter(ack))
            .await;
    }
}

async fn handle_client_message(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    tx: &mpsc::Sender<Outbound>,
    player_id: &mut Option<PlayerId>,
    event: ClientMessage,
) {
    match event {
        ClientMessage::CreateRoom { client_name, avatar_url } => {
            handle_create_room(state, switch, room_id, tx, player_id, client_name, avatar_url).await;
        }
        ClientMessage::JoinRoom { client_name, avatar_url } => {
            handle_join_room(state, switch, room_id, tx, player_id, client_name, avatar_url).await;
        }
        ClientMessage::LeaveRoom {} => {
            handle_leave_room(state, switch, room_id, player_id).await;
        }
        ClientMessage::KickPlayer { id_player } => {
            if id_player.is_empty() {
                handle_leave_room(state, switch, room_id, player_id).await;
            } else {
                handle_kick_player(state, switch, room_id, player_id, id_player).await;
            }
        }
        ClientMessage::VoteKickPlayer { id_player, agree_to_kick } => {
            handle_vote_kick(state, switch, room_id, player_id, id_player, agree_to_kick).await;
        }
        ClientMessage::StartGame {} => {
            handle_start_game(state, switch, room_id, player_id).await;
        }
        ClientMessage::ChangeSettings { settings } => {
            handle_change_settings(state, switch, room_id, player_id, settings).await;
        }
        ClientMessage::OpenCell { row, col } => {
            handle_open_cell(state, switch, room_id, player_id, row, col).await;
        }
        ClientMessage::FlagCell { row, col } => {
            handle_flag_cell(state, switch, room_id, player_id, row, col).await;
        }
        ClientMessage::Chat { message } => {
            handle_chat(state, switch, room_id, player_id, message).await;
        }
        ClientMessage::PositionUpdated { row, col } => {
            handle_position_updated(switch, room_id, player_id, row, col).await;
        }
    }
}

async fn handle_create_room(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    tx: &mpsc::Sender<Outbound>,
    player_id: &mut Option<PlayerId>,
    client_name: String,
    avatar_url: String,
) {
    if state.rooms.contains_key(room_id) {
        reply_direct(
            tx,
            ServerMessage::CreateRoomResult {
                success: false,
                message: RoomError::RoomExists.to_string(),
                game_room: None,
            },
        )
        .await;
        return;
    }
    if state.rooms.len() >= state.capacity {
        reply_direct(
            tx,
            ServerMessage::CreateRoomResult {
                success: false,
                message: RoomError::ServerFull.to_string(),
                game_room: None,
            },
        )
        .await;
        return;
    }

    let new_player_id = generate_player_id();
    let mut host = Player::new(new_player_id.clone(), client_name, avatar_url, 0);
    host.is_host = true;

    let room = Arc::new(Room::new(room_id.clone(), new_player_id.clone(), ROOM_CAPACITY));
    room.add_player(host);
    room.connections.insert(
        new_player_id.clone(),
        ConnectionHandle {
            player_id: new_player_id.clone(),
            tx: tx.clone(),
        },
    );

    let snapshot = room.snapshot();
    state.rooms.insert(room_id.clone(), room);
    *player_id = Some(new_player_id.clone());

    info!(room_id = %room_id, player_id = %new_player_id, "room created");

    switch
        .unicast(
            room_id.clone(),
            new_player_id,
            Outbound::Message(ServerMessage::CreateRoomResult {
                success: true,
                message: "room created".to_string(),
                game_room: Some(snapshot),
            }),
        )
        .await;
}

async fn handle_join_room(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    tx: &mpsc::Sender<Outbound>,
    player_id: &mut Option<PlayerId>,
    client_name: String,
    avatar_url: String,
) {
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else {
        reply_direct(
            tx,
            ServerMessage::JoinRoomResult {
                game_room: None,
                id_player: None,
                detail: RoomError::RoomAbsent.to_string(),
            },
        )
        .await;
        return;
    };
    if room.is_username_taken(&client_name) {
        reply_direct(
            tx,
            ServerMessage::JoinRoomResult {
                game_room: None,
                id_player: None,
                detail: RoomError::NameTaken.to_string(),
            },
        )
        .await;
        return;
    }

    let new_player_id = generate_player_id();
    let join_index = room.players.len();
    let player = Player::new(new_player_id.clone(), client_name, avatar_url, join_index);
    room.add_player(player.clone());
    room.connections.insert(
        new_player_id.clone(),
        ConnectionHandle {
            player_id: new_player_id.clone(),
            tx: tx.clone(),
        },
    );
    *player_id = Some(new_player_id.clone());

    let snapshot = room.snapshot();
    info!(room_id = %room_id, player_id = %new_player_id, "player joined");

    switch
        .unicast(
            room_id.clone(),
            new_player_id.clone(),
            Outbound::Message(ServerMessage::JoinRoomResult {
                game_room: Some(snapshot),
                id_player: Some(new_player_id.clone()),
                detail: "joined room".to_string(),
            }),
        )
        .await;
    switch
        .broadcast(room_id.clone(), Outbound::Message(ServerMessage::JoinRoomBroadcast { player }))
        .await;
}

async fn handle_leave_room(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &mut Option<PlayerId>,
) {
    let Some(pid) = player_id.clone() else { return };
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else { return };
    if !room.players.contains_key(&pid) {
        return;
    }

    let was_host = room.settings.lock().unwrap().host_id == pid;
    room.remove_player(&pid);
    info!(room_id = %room_id, player_id = %pid, "player left");

    switch
        .broadcast(
            room_id.clone(),
            Outbound::Message(ServerMessage::LeaveRoomBroadcast { id_player: pid.clone() }),
        )
        .await;

    if was_host && !room.is_empty() {
        if let Some(new_host) = room.pick_random_host() {
            switch
                .broadcast(room_id.clone(), Outbound::Message(ServerMessage::HostChanged { id_player: new_host }))
                .await;
        }
    }

    finalize_departure(state, switch, &room, room_id, &pid, ServerMessage::LeaveRoomAck { success: true }).await;
}

async fn handle_kick_player(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &Option<PlayerId>,
    target_id: PlayerId,
) {
    let Some(pid) = player_id.clone() else { return };
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else { return };

    if !room.players.contains_key(&target_id) {
        switch
            .unicast(room_id.clone(), pid, Outbound::Message(ServerMessage::VoteKickResult { success: false }))
            .await;
        return;
    }

    room.vote_ballot.lock().unwrap().insert(target_id.clone(), Default::default());

    switch
        .broadcast(
            room_id.clone(),
            Outbound::Message(ServerMessage::VoteKickBroadcast {
                id_player: target_id,
                id_issuer: pid.clone(),
            }),
        )
        .await;
    switch
        .unicast(room_id.clone(), pid, Outbound::Message(ServerMessage::VoteKickResult { success: true }))
        .await;
}

async fn handle_vote_kick(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &Option<PlayerId>,
    target_id: PlayerId,
    agree_to_kick: bool,
) {
    if !agree_to_kick {
        return;
    }
    let Some(pid) = player_id.clone() else { return };
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else { return };

    let evicted = {
        let mut ballot = room.vote_ballot.lock().unwrap();
        let Some(voters) = ballot.get_mut(&target_id) else {
            return;
        };
        voters.insert(pid);
        let threshold = room.players.len() / 2;
        let evict = voters.len() > threshold;
        if evict {
            ballot.remove(&target_id);
        }
        evict
    };
    if !evicted {
        return;
    }

    let was_host = room.settings.lock().unwrap().host_id == target_id;
    room.remove_player(&target_id);
    info!(room_id = %room_id, player_id = %target_id, "player voted out");

    switch
        .broadcast(
            room_id.clone(),
            Outbound::Message(ServerMessage::LeaveRoomBroadcast {
                id_player: target_id.clone(),
            }),
        )
        .await;

    if was_host && !room.is_empty() {
        if let Some(new_host) = room.pick_random_host() {
            switch
                .broadcast(room_id.clone(), Outbound::Message(ServerMessage::HostChanged { id_player: new_host }))
                .await;
        }
    }

    finalize_departure(
        state,
        switch,
        &room,
        room_id,
        &target_id,
        ServerMessage::VoteKickResult { success: true },
    )
    .await;
}

async fn handle_start_game(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &Option<PlayerId>,
) {
    let Some(pid) = player_id.clone() else { return };
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else { return };

    let is_host = room.settings.lock().unwrap().host_id == pid;
    if !is_host {
        switch
            .unicast(
                room_id.clone(),
                pid,
                Outbound::Message(ServerMessage::StartGameResult {
                    success: false,
                    detail: RoomError::NotHost.to_string(),
                }),
            )
            .await;
        return;
    }

    match room.start() {
        Ok(()) => {
            let board = room.board.lock().unwrap().as_ref().unwrap().render(false);
            info!(room_id = %room_id, "game started");
            switch
                .broadcast(
                    room_id.clone(),
                    Outbound::Message(ServerMessage::StartGameBroadcast {
                        success: true,
                        detail: "game started".to_string(),
                        board,
                    }),
                )
                .await;
            switch
                .broadcast(
                    room_id.clone(),
                    Outbound::Message(ServerMessage::Notification {
                        message: "game started".to_string(),
                    }),
                )
                .await;
            let ticker = cron::spawn_score_ticker(room.clone(), switch.clone());
            *room.score_ticker.lock().unwrap() = Some(ticker);
        }
        Err(error) => {
            switch
                .unicast(
                    room_id.clone(),
                    pid,
                    Outbound::Message(ServerMessage::StartGameResult {
                        success: false,
                        detail: error.to_string(),
                    }),
                )
                .await;
        }
    }
}

async fn handle_change_settings(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &Option<PlayerId>,
    patch: SettingsPatch,
) {
    let Some(pid) = player_id.clone() else { return };
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else { return };

    let is_host = room.settings.lock().unwrap().host_id == pid;
    if !is_host {
        switch
            .unicast(
                room_id.clone(),
                pid,
                Outbound::Message(ServerMessage::SettingsUpdatedResult {
                    success: false,
                    detail: RoomError::NotHost.to_string(),
                }),
            )
            .await;
        return;
    }
    if room.is_started() {
        switch
            .unicast(
                room_id.clone(),
                pid,
                Outbound::Message(ServerMessage::SettingsUpdatedResult {
                    success: false,
                    detail: RoomError::AlreadyStarted.to_string(),
                }),
            )
            .await;
        return;
    }

    let updated = {
        let mut settings = room.settings.lock().unwrap();
        settings.merge(patch);
        settings.clone()
    };

    switch
        .unicast(
            room_id.clone(),
            pid,
            Outbound::Message(ServerMessage::SettingsUpdatedResult {
                success: true,
                detail: "settings updated".to_string(),
            }),
        )
        .await;
    switch
        .broadcast(
            room_id.clone(),
            Outbound::Message(ServerMessage::SettingsUpdatedBroadcast { settings: updated }),
        )
        .await;
}

async fn handle_open_cell(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &Option<PlayerId>,
    row: usize,
    col: usize,
) {
    let Some(pid) = player_id.clone() else { return };
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else { return };
    if !room.is_started() {
        return;
    }

    let Some((error, board_snapshot, cleared, cleared_snapshot)) = ({
        let mut board_guard = room.board.lock().unwrap();
        board_guard.as_mut().and_then(|board| {
            if row >= board.rows() || col >= board.cols() {
                return None;
            }
            let (points, error) = board.open(row, col, &pid);
            if let Some(mut player) = room.players.get_mut(&pid) {
                player.score += points;
            }
            let bare = matches!(error, Some(BoardError::OpenMine));
            let cleared = board.is_cleared();
            // `game_cleared` is a game-end reveal like `mine_opened`; it
            // needs its own bare render regardless of `bare` above.
            let cleared_snapshot = cleared.then(|| board.render(true));
            Some((error, board.render(bare), cleared, cleared_snapshot))
        })
    }) else {
        return;
    };

    match error {
        Some(BoardError::OpenMine) => {
            warn!(room_id = %room_id, player_id = %pid, "mine opened, game over");
            switch
                .broadcast(
                    room_id.clone(),
                    Outbound::Message(ServerMessage::ScoreUpdated {
                        scoreboard: room.scoreboard(),
                        tick: now_nanos(),
                    }),
                )
                .await;
            if let Some(stop) = room.end() {
                let _ = stop.send(());
            }
            let player_name = room.players.get(&pid).map(|p| p.name.clone()).unwrap_or_else(|| pid.clone());
            let players: Vec<Player> = room.players.iter().map(|e| e.value().clone()).collect();
            switch
                .broadcast(
                    room_id.clone(),
                    Outbound::Message(ServerMessage::MineOpened {
                        board: board_snapshot,
                        players,
                    }),
                )
                .await;
            switch
                .broadcast(
                    room_id.clone(),
                    Outbound::Message(ServerMessage::Notification {
                        message: format!("{player_name} hit a mine"),
                    }),
                )
                .await;
        }
        Some(BoardError::OpenFlagged) => {
            debug!(room_id = %room_id, player_id = %pid, "open rejected: cell flagged");
        }
        Some(BoardError::FlagOpened) | Some(BoardError::TooManyMines) => unreachable!(),
        None => {
            switch
                .broadcast(
                    room_id.clone(),
                    Outbound::Message(ServerMessage::BoardUpdated { board: board_snapshot.clone() }),
                )
                .await;
            if cleared {
                switch
                    .broadcast(
                        room_id.clone(),
                        Outbound::Message(ServerMessage::ScoreUpdated {
                            scoreboard: room.scoreboard(),
                            tick: now_nanos(),
                        }),
                    )
                    .await;
                if let Some(stop) = room.end() {
                    let _ = stop.send(());
                }
                switch
                    .broadcast(
                        room_id.clone(),
                        Outbound::Message(ServerMessage::Notification {
                            message: "board cleared".to_string(),
                        }),
                    )
                    .await;
                let players: Vec<Player> = room.players.iter().map(|e| e.value().clone()).collect();
                switch
                    .broadcast(
                        room_id.clone(),
                        Outbound::Message(ServerMessage::GameCleared {
                            board: cleared_snapshot.expect("cleared_snapshot set whenever cleared is true"),
                            players,
                        }),
                    )
                    .await;
            }
        }
    }
}

async fn handle_flag_cell(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &Option<PlayerId>,
    row: usize,
    col: usize,
) {
    let Some(pid) = player_id.clone() else { return };
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else { return };
    if !room.is_started() {
        return;
    }

    let board_snapshot = {
        let mut board_guard = room.board.lock().unwrap();
        let Some(board) = board_guard.as_mut() else { return };
        if row >= board.rows() || col >= board.cols() {
            return;
        }
        match board.toggle_flag(row, col, &pid) {
            Ok(()) => Some(board.render(false)),
            Err(error) => {
                debug!(room_id = %room_id, player_id = %pid, %error, "flag rejected");
                None
            }
        }
    };

    if let Some(board_snapshot) = board_snapshot {
        switch
            .broadcast(room_id.clone(), Outbound::Message(ServerMessage::BoardUpdated { board: board_snapshot }))
            .await;
    }
}

async fn handle_chat(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &Option<PlayerId>,
    message: String,
) {
    let Some(pid) = player_id.clone() else { return };
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else { return };
    let Some(sender) = room.players.get(&pid).map(|p| p.name.clone()) else {
        return;
    };
    switch
        .broadcast(room_id.clone(), Outbound::Message(ServerMessage::Chat { sender, message }))
        .await;
}

async fn handle_position_updated(
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &Option<PlayerId>,
    row: usize,
    col: usize,
) {
    let Some(pid) = player_id.clone() else { return };
    switch
        .broadcast(
            room_id.clone(),
            Outbound::Message(ServerMessage::PositionUpdated { sender_id: pid, row, col }),
        )
        .await;
}

async fn synthesize_leave(
    state: &Arc<AppState>,
    switch: &SwitchHandle,
    room_id: &RoomId,
    player_id: &mut Option<PlayerId>,
) {
    let Some(pid) = player_id.take() else { return };
    let Some(room) = state.rooms.get(room_id).map(|r| r.clone()) else { return };
    room.connections.remove(&pid);
    if !room.players.contains_key(&pid) {
        return;
    }

    let was_host = room.settings.lock().unwrap().host_id == pid;
    room.remove_player(&pid);
    info!(room_id = %room_id, player_id = %pid, "connection dropped, treating as leave");

    switch
        .broadcast(
            room_id.clone(),
            Outbound::Message(ServerMessage::LeaveRoomBroadcast { id_player: pid.clone() }),
        )
        .await;

    if was_host && !room.is_empty() {
        if let Some(new_host) = room.pick_random_host() {
            switch
                .broadcast(room_id.clone(), Outbound::Message(ServerMessage::HostChanged { id_player: new_host }))
                .await;
        }
    }

    if room.is_empty() {
        teardown_room(state, room_id).await;
    }
}

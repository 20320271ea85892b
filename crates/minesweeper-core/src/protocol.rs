use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::player::Player;
use crate::settings::{Settings, SettingsPatch};

/// A rendered board: `rows` arrays of `cols` short strings, per
/// [`crate::board::Board::render`].
pub type WireBoard = Vec<Vec<String>>;

/// A point-in-time view of a room, sent on `create_room`/`join_room` success.
/// Mirrors the original server's `GameRoom` JSON shape, which never
/// serializes the board or the kick ballot either.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id_room: String,
    pub capacity: usize,
    pub id_host: String,
    pub is_started: bool,
    pub players: HashMap<String, Player>,
}

/// Messages a client sends to the server, one JSON object per inbound
/// frame, tagged by `event_type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum ClientMessage {
    CreateRoom {
        client_name: String,
        #[serde(default)]
        avatar_url: String,
    },
    JoinRoom {
        client_name: String,
        #[serde(default)]
        avatar_url: String,
    },
    LeaveRoom {},
    KickPlayer {
        #[serde(default)]
        id_player: String,
    },
    VoteKickPlayer {
        id_player: String,
        #[serde(default)]
        agree_to_kick: bool,
    },
    StartGame {},
    ChangeSettings {
        settings: SettingsPatch,
    },
    OpenCell {
        row: usize,
        col: usize,
    },
    FlagCell {
        row: usize,
        col: usize,
    },
    Chat {
        message: String,
    },
    PositionUpdated {
        row: usize,
        col: usize,
    },
}

/// Messages the server sends to one or more clients. Several event types
/// have distinct unicast and broadcast payloads (e.g. `vote_kick_player`);
/// those share a wire `event_type` but are separate variants here, since
/// this enum is only ever serialized, never parsed back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type")]
pub enum ServerMessage {
    #[serde(rename = "create_room")]
    CreateRoomResult {
        success: bool,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        game_room: Option<RoomSnapshot>,
    },
    #[serde(rename = "join_room")]
    JoinRoomResult {
        #[serde(skip_serializing_if = "Option::is_none")]
        game_room: Option<RoomSnapshot>,
        #[serde(skip_serializing_if = "Option::is_none")]
        id_player: Option<String>,
        detail: String,
    },
    #[serde(rename = "join_room_broadcast")]
    JoinRoomBroadcast { player: Player },
    #[serde(rename = "leave_room")]
    LeaveRoomAck { success: bool },
    #[serde(rename = "leave_room_broadcast")]
    LeaveRoomBroadcast { id_player: String },
    #[serde(rename = "host_changed")]
    HostChanged { id_player: String },
    #[serde(rename = "vote_kick_player")]
    VoteKickResult { success: bool },
    #[serde(rename = "vote_kick_player")]
    VoteKickBroadcast { id_player: String, id_issuer: String },
    #[serde(rename = "start_game")]
    StartGameResult { success: bool, detail: String },
    #[serde(rename = "start_game")]
    StartGameBroadcast {
        success: bool,
        detail: String,
        board: WireBoard,
    },
    #[serde(rename = "board_updated")]
    BoardUpdated { board: WireBoard },
    #[serde(rename = "mine_opened")]
    MineOpened {
        board: WireBoard,
        players: Vec<Player>,
    },
    #[serde(rename = "game_cleared")]
    GameCleared {
        board: WireBoard,
        players: Vec<Player>,
    },
    #[serde(rename = "score_updated")]
    ScoreUpdated {
        scoreboard: HashMap<String, i64>,
        tick: i64,
    },
    #[serde(rename = "settings_updated")]
    SettingsUpdatedResult { success: bool, detail: String },
    #[serde(rename = "settings_updated")]
    SettingsUpdatedBroadcast { settings: Settings },
    #[serde(rename = "notification")]
    Notification { message: String },
    #[serde(rename = "chat")]
    Chat { sender: String, message: String },
    #[serde(rename = "position_updated")]
    PositionUpdated {
        sender_id: String,
        row: usize,
        col: usize,
    },
}

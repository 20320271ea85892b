use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use dashmap::DashMap;
use rand::Rng;
use tokio::sync::{mpsc, oneshot};

use minesweeper_core::protocol::{RoomSnapshot, ServerMessage};
use minesweeper_core::{Board, Player, Settings};

use crate::errors::RoomError;
use crate::switch::SwitchHandle;

pub type RoomId = String;
pub type PlayerId = String;

const ROOM_ID_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_ID_LEN: usize = 5;
const PLAYER_ID_LEN: usize = 16;

/// A freshly generated room id, per component 6's `/game/create` contract.
pub fn generate_room_id() -> RoomId {
    random_alphanumeric(ROOM_ID_LEN)
}

/// A freshly generated, server-assigned player token.
pub fn generate_player_id() -> PlayerId {
    random_alphanumeric(PLAYER_ID_LEN)
}

fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ROOM_ID_CHARS[rng.random_range(0..ROOM_ID_CHARS.len())] as char)
        .collect()
}

/// Either a plain outbound payload, or one that must be written and then
/// followed by the connection's own teardown -- the concrete form the
/// "self-leave-unicast" detection takes here (see DESIGN.md): an explicit
/// variant, not a runtime type check on the payload.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(ServerMessage),
    CloseAfter(ServerMessage),
}

/// What the switch needs to deliver a payload to one connection's queue.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub player_id: PlayerId,
    pub tx: mpsc::Sender<Outbound>,
}

/// A room's mutable state. `players`/`connections` are `DashMap`s for
/// per-key atomic membership changes; `board` is mutated only while the
/// caller holds its lock, and score deltas are applied while that same
/// lock is held (see DESIGN.md on the stricter-than-required serialization
/// this buys for per-player score mutation).
pub struct Room {
    pub id: RoomId,
    pub started: AtomicBool,
    pub players: DashMap<PlayerId, Player>,
    pub connections: DashMap<PlayerId, ConnectionHandle>,
    pub join_order: Mutex<Vec<PlayerId>>,
    pub vote_ballot: Mutex<HashMap<PlayerId, HashSet<PlayerId>>>,
    pub settings: Mutex<Settings>,
    pub board: Mutex<Option<Board>>,
    pub score_ticker: Mutex<Option<oneshot::Sender<()>>>,
}

impl Room {
    pub fn new(id: RoomId, host_id: PlayerId, capacity: usize) -> Self {
        Room {
            id,
            started: AtomicBool::new(false),
            players: DashMap::new(),
            connections: DashMap::new(),
            join_order: Mutex::new(Vec::new()),
            vote_ballot: Mutex::new(HashMap::new()),
            settings: Mutex::new(Settings::new(host_id, capacity)),
            board: Mutex::new(None),
            score_ticker: Mutex::new(None),
        }
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub fn is_username_taken(&self, name: &str) -> bool {
        self.players.iter().any(|p| p.name == name)
    }

    pub fn add_player(&self, player: Player) {
        self.join_order.lock().unwrap().push(player.id.clone());
        self.players.insert(player.id.clone(), player);
    }

    /// Removes the player from room membership only. The connection entry
    /// is left intact so a pending unicast ack/eviction can still reach it;
    /// the writer loop's `unregister_connection` is the sole place that
    /// deletes it, after that payload is written (see DESIGN.md).
    pub fn remove_player(&self, player_id: &str) {
        self.players.remove(player_id);
        self.vote_ballot.lock().unwrap().remove(player_id);
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Choose the earliest-still-present joiner as the new host; mark it
    /// host in `settings` and return its id, or `None` if nobody remains.
    pub fn pick_random_host(&self) -> Option<PlayerId> {
        let join_order = self.join_order.lock().unwrap();
        let new_host = join_order.iter().find(|id| self.players.contains_key(*id))?.clone();
        self.settings.lock().unwrap().host_id = new_host.clone();
        if let Some(mut player) = self.players.get_mut(&new_host) {
            player.is_host = true;
        }
        Some(new_host)
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        let settings = self.settings.lock().unwrap();
        RoomSnapshot {
            id_room: self.id.clone(),
            capacity: settings.capacity,
            id_host: settings.host_id.clone(),
            is_started: self.is_started(),
            players: self
                .players
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        }
    }

    pub fn scoreboard(&self) -> HashMap<PlayerId, i64> {
        self.players.iter().map(|e| (e.key().clone(), e.value().score)).collect()
    }

    pub fn start(&self) -> Result<(), RoomError> {
        if self.is_started() {
            return Err(RoomError::AlreadyStarted);
        }
        if self.players.is_empty() {
            return Err(RoomError::TooFewPlayers);
        }
        let (rows, cols, mines, cell_score, mine_score, count_cold_open) = {
            let settings = self.settings.lock().unwrap();
            let (rows, cols, mines) = settings.board_dimensions();
            (
                rows,
                cols,
                mines,
                settings.cell_score,
                settings.mine_score,
                settings.count_cold_open,
            )
        };
        let board = Board::new(rows, cols, mines, cell_score, mine_score, count_cold_open)
            .map_err(|_| RoomError::InvalidSettings)?;
        *self.board.lock().unwrap() = Some(board);
        self.started.store(true, Ordering::Release);
        Ok(())
    }

    /// Clear `started` and hand back the score ticker's stop handle, if any,
    /// so the caller can signal it after releasing any locks it holds.
    pub fn end(&self) -> Option<oneshot::Sender<()>> {
        self.started.store(false, Ordering::Release);
        self.score_ticker.lock().unwrap().take()
    }
}

/// Process-wide registry of rooms, plus the server-wide room capacity read
/// from the `CAPACITY` environment variable at startup.
pub struct AppState {
    pub rooms: DashMap<RoomId, std::sync::Arc<Room>>,
    pub capacity: usize,
    /// Set once, right after construction, by `build_app` -- a `OnceLock`
    /// sidesteps the chicken-and-egg of the switch needing an `Arc<AppState>`
    /// to route through while `AppState` wants to hand that same switch to
    /// every connection.
    pub switch: OnceLock<SwitchHandle>,
}

impl AppState {
    pub fn new(capacity: usize) -> Self {
        AppState {
            rooms: DashMap::new(),
            capacity,
            switch: OnceLock::new(),
        }
    }

    pub fn switch(&self) -> SwitchHandle {
        self.switch.get().expect("switch initialized at startup").clone()
    }
}

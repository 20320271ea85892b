use serde::{Deserialize, Serialize};

/// Fixed palette a joining player's color is drawn from, indexed by the
/// room's player count at join time so assignment needs no extra state.
const PALETTE: &[&str] = &[
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
];

pub fn color_for_index(index: usize) -> &'static str {
    PALETTE[index % PALETTE.len()]
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub is_host: bool,
    pub score: i64,
    pub color: String,
}

impl Player {
    pub fn new(id: String, name: String, avatar: String, join_index: usize) -> Self {
        Player {
            id,
            name,
            avatar,
            is_host: false,
            score: 0,
            color: color_for_index(join_index).to_string(),
        }
    }
}

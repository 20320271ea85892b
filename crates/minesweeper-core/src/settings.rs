use serde::{Deserialize, Serialize};

use crate::difficulty::Difficulty;

pub const DEFAULT_ROWS: usize = 20;
pub const DEFAULT_COLS: usize = 40;
pub const DEFAULT_MINES: usize = 45;
pub const DEFAULT_CELL_SCORE: i64 = 1;
pub const DEFAULT_MINE_SCORE: i64 = -50;

/// Room configuration. `rows`/`cols`/`mines`, when present, override the
/// difficulty preset's dimensions independently of each other.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Settings {
    pub capacity: usize,
    pub host_id: String,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub rows: Option<usize>,
    #[serde(default)]
    pub cols: Option<usize>,
    #[serde(default)]
    pub mines: Option<usize>,
    #[serde(default = "default_cell_score")]
    pub cell_score: i64,
    #[serde(default = "default_mine_score")]
    pub mine_score: i64,
    #[serde(default)]
    pub count_cold_open: bool,
}

fn default_cell_score() -> i64 {
    DEFAULT_CELL_SCORE
}

fn default_mine_score() -> i64 {
    DEFAULT_MINE_SCORE
}

impl Settings {
    pub fn new(host_id: String, capacity: usize) -> Self {
        Settings {
            capacity,
            host_id,
            difficulty: None,
            rows: None,
            cols: None,
            mines: None,
            cell_score: DEFAULT_CELL_SCORE,
            mine_score: DEFAULT_MINE_SCORE,
            count_cold_open: false,
        }
    }

    /// The effective board dimensions once difficulty presets and explicit
    /// overrides are reconciled: explicit values win, the difficulty preset
    /// supplies whichever dimensions are left, and the hard-coded default
    /// fills in if neither was given.
    pub fn board_dimensions(&self) -> (usize, usize, usize) {
        let preset = self.difficulty.map(|d| d.dimensions());
        let (preset_rows, preset_cols, preset_mines) =
            preset.unwrap_or((DEFAULT_ROWS, DEFAULT_COLS, DEFAULT_MINES));
        (
            self.rows.unwrap_or(preset_rows),
            self.cols.unwrap_or(preset_cols),
            self.mines.unwrap_or(preset_mines),
        )
    }

    /// Merge a partial update (as sent by `change_settings`) into this one.
    pub fn merge(&mut self, patch: SettingsPatch) {
        if let Some(difficulty) = patch.difficulty {
            self.difficulty = Some(difficulty);
        }
        if let Some(rows) = patch.rows {
            self.rows = Some(rows);
        }
        if let Some(cols) = patch.cols {
            self.cols = Some(cols);
        }
        if let Some(mines) = patch.mines {
            self.mines = Some(mines);
        }
        if let Some(cell_score) = patch.cell_score {
            self.cell_score = cell_score;
        }
        if let Some(mine_score) = patch.mine_score {
            self.mine_score = mine_score;
        }
        if let Some(count_cold_open) = patch.count_cold_open {
            self.count_cold_open = count_cold_open;
        }
    }
}

/// The subset of Settings a client may change mid-lobby.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub rows: Option<usize>,
    #[serde(default)]
    pub cols: Option<usize>,
    #[serde(default)]
    pub mines: Option<usize>,
    #[serde(default)]
    pub cell_score: Option<i64>,
    #[serde(default)]
    pub mine_score: Option<i64>,
    #[serde(default)]
    pub count_cold_open: Option<bool>,
}

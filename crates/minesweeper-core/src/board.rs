use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single cell on the board.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub is_mine: bool,
    pub is_open: bool,
    pub is_flagged: bool,
    pub adjacent_mines: u8,
    pub opener_id: Option<String>,
    pub flagger_id: Option<String>,
}

impl Default for Cell {
    fn default() -> Self {
        Cell {
            is_mine: false,
            is_open: false,
            is_flagged: false,
            adjacent_mines: 0,
            opener_id: None,
            flagger_id: None,
        }
    }
}

impl Cell {
    /// Render this cell's value, revealing mines regardless of open state.
    fn value_bare(&self) -> String {
        if self.is_mine {
            "X".to_string()
        } else {
            self.adjacent_mines.to_string()
        }
    }

    /// Render this cell's value the way a player actually sees the board.
    fn value(&self) -> String {
        if self.is_open {
            if self.is_mine {
                return "X".to_string();
            }
            return self.adjacent_mines.to_string();
        }
        if self.is_flagged {
            return "F".to_string();
        }
        " ".to_string()
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardError {
    #[error("too many mines for this board size")]
    TooManyMines,
    #[error("cannot open a flagged cell")]
    OpenFlagged,
    #[error("cannot flag an opened cell")]
    FlagOpened,
    #[error("opened a mine")]
    OpenMine,
}

/// A rectangular Minesweeper board. Mines are placed lazily, on the first
/// open, using that open's coordinate as the center of a guaranteed-safe
/// neighborhood.
#[derive(Clone, Debug)]
pub struct Board {
    rows: usize,
    cols: usize,
    mine_count: usize,
    open_count: usize,
    started: bool,
    cells: Vec<Vec<Cell>>,
    cell_score: i64,
    mine_score: i64,
    count_cold_open: bool,
}

impl Board {
    pub fn new(
        rows: usize,
        cols: usize,
        mine_count: usize,
        cell_score: i64,
        mine_score: i64,
        count_cold_open: bool,
    ) -> Result<Self, BoardError> {
        if mine_count >= rows * cols {
            return Err(BoardError::TooManyMines);
        }
        Ok(Board {
            rows,
            cols,
            mine_count,
            open_count: 0,
            started: false,
            cells: vec![vec![Cell::default(); cols]; rows],
            cell_score,
            mine_score,
            count_cold_open,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_cleared(&self) -> bool {
        self.open_count == self.rows * self.cols - self.mine_count
    }

    /// Render every cell as the acting player would see it.
    pub fn render(&self, bare: bool) -> Vec<Vec<String>> {
        self.cells
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| if bare { cell.value_bare() } else { cell.value() })
                    .collect()
            })
            .collect()
    }

    /// Open the cell at (row, col) on behalf of `player_id`.
    ///
    /// Returns the point delta for this action (which may be zero or
    /// negative) together with any error. `BoardError::OpenMine` is not a
    /// failure in the usual sense: it signals the game has ended, and the
    /// cell remains open and attributed.
    pub fn open(&mut self, row: usize, col: usize, player_id: &str) -> (i64, Option<BoardError>) {
        let was_cold_open = self.open_count == 0;
        let was_open = self.cells[row][col].is_open;

        if self.cells[row][col].is_flagged {
            return (0, Some(BoardError::OpenFlagged));
        }

        self.cells[row][col].is_open = true;
        self.cells[row][col].opener_id = Some(player_id.to_string());

        if !self.started {
            self.started = true;
            self.place_mines(row, col);
            self.set_adjacent_mine_counts();
        }

        let mut points: i64 = 0;

        if self.cells[row][col].is_mine {
            points += self.mine_score;
            return (points, Some(BoardError::OpenMine));
        }

        if !was_open {
            self.open_count += 1;
            points += self.cell_score;
        }

        let adjacent_mines = self.cells[row][col].adjacent_mines;
        let adjacent_flags = self.adjacent_flag_count(row, col);

        let mut quick_open_error = None;
        if adjacent_mines as usize == adjacent_flags {
            let (quick_points, err) = self.quick_open(row, col, player_id);
            points += quick_points;
            quick_open_error = err;
        }

        if was_cold_open && !self.count_cold_open {
            return (0, quick_open_error);
        }
        (points, quick_open_error)
    }

    /// Flood-open every non-flagged cell reachable from (row, col)'s
    /// neighborhood, stopping (and reporting a mine) the moment one is hit.
    pub fn quick_open(&mut self, row: usize, col: usize, player_id: &str) -> (i64, Option<BoardError>) {
        let mut queue: Vec<(isize, isize)> = self.neighbors(row as isize, col as isize);

        let mut points: i64 = 0;
        let mut i = 0;
        while i < queue.len() {
            let (r, c) = queue[i];
            i += 1;

            if r < 0 || r >= self.rows as isize || c < 0 || c >= self.cols as isize {
                continue;
            }
            let (r, c) = (r as usize, c as usize);
            let (is_mine, is_flagged, is_open, adjacent_mines) = {
                let cell = &self.cells[r][c];
                (cell.is_mine, cell.is_flagged, cell.is_open, cell.adjacent_mines)
            };

            if is_mine && !is_flagged {
                return (self.mine_score, Some(BoardError::OpenMine));
            }
            if is_flagged || is_open {
                continue;
            }

            self.cells[r][c].is_open = true;
            self.cells[r][c].opener_id = Some(player_id.to_string());
            self.open_count += 1;
            points += self.cell_score;

            if adjacent_mines == 0 {
                queue.extend(self.neighbors(r as isize, c as isize));
            }
        }

        (points, None)
    }

    pub fn toggle_flag(&mut self, row: usize, col: usize, player_id: &str) -> Result<(), BoardError> {
        if self.cells[row][col].is_open {
            return Err(BoardError::FlagOpened);
        }
        let cell = &mut self.cells[row][col];
        cell.is_flagged = !cell.is_flagged;
        cell.flagger_id = Some(player_id.to_string());
        Ok(())
    }

    fn adjacent_flag_count(&self, row: usize, col: usize) -> usize {
        self.neighbors(row as isize, col as isize)
            .into_iter()
            .filter(|&(r, c)| self.in_bounds(r, c) && self.cells[r as usize][c as usize].is_flagged)
            .count()
    }

    fn adjacent_mine_count(&self, row: usize, col: usize) -> usize {
        self.neighbors(row as isize, col as isize)
            .into_iter()
            .filter(|&(r, c)| self.in_bounds(r, c) && self.cells[r as usize][c as usize].is_mine)
            .count()
    }

    fn in_bounds(&self, row: isize, col: isize) -> bool {
        row >= 0 && row < self.rows as isize && col >= 0 && col < self.cols as isize
    }

    fn neighbors(&self, row: isize, col: isize) -> Vec<(isize, isize)> {
        let mut result = Vec::with_capacity(8);
        for r in row - 1..=row + 1 {
            for c in col - 1..=col + 1 {
                if r == row && c == col {
                    continue;
                }
                result.push((r, c));
            }
        }
        result
    }

    fn set_adjacent_mine_counts(&mut self) {
        for r in 0..self.rows {
            for c in 0..self.cols {
                if self.cells[r][c].is_mine {
                    continue;
                }
                self.cells[r][c].adjacent_mines = self.adjacent_mine_count(r, c) as u8;
            }
        }
    }

    /// Place `mine_count` mines uniformly at random, excluding the genesis
    /// cell and its 8-neighborhood, via rejection sampling.
    fn place_mines(&mut self, genesis_row: usize, genesis_col: usize) {
        let cell_count = self.rows * self.cols;
        let mut forbidden: HashSet<usize> = HashSet::new();

        for r in genesis_row as isize - 1..=genesis_row as isize + 1 {
            for c in genesis_col as isize - 1..=genesis_col as isize + 1 {
                if self.in_bounds(r, c) {
                    forbidden.insert(r as usize * self.cols + c as usize);
                }
            }
        }

        let mut rng = rand::rng();
        let mut placed = 0;
        while placed < self.mine_count {
            let idx = rng.random_range(0..cell_count);
            if forbidden.contains(&idx) {
                continue;
            }
            forbidden.insert(idx);
            let (r, c) = (idx / self.cols, idx % self.cols);
            self.cells[r][c].is_mine = true;
            placed += 1;
        }
    }
}

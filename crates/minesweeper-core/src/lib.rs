pub mod board;
pub mod difficulty;
pub mod player;
pub mod protocol;
pub mod settings;

pub use board::{Board, BoardError, Cell};
pub use difficulty::Difficulty;
pub use player::Player;
pub use protocol::{ClientMessage, RoomSnapshot, ServerMessage, WireBoard};
pub use settings::{Settings, SettingsPatch};

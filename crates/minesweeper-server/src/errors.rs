use thiserror::Error;

/// Room-layer failures surfaced to a client as a human-readable `detail`
/// string on the relevant unicast response.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomError {
    #[error("server is at capacity")]
    ServerFull,
    #[error("room already exists")]
    RoomExists,
    #[error("room does not exist")]
    RoomAbsent,
    #[error("username already exist")]
    NameTaken,
    #[error("only the host may do this")]
    NotHost,
    #[error("game already started")]
    AlreadyStarted,
    #[error("not enough players")]
    TooFewPlayers,
    #[error("game has not started")]
    GameNotStarted,
    #[error("too many mines for the configured board size")]
    InvalidSettings,
}

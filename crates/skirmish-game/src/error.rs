//! Error types for the game layer.

use skirmish_protocol::SessionId;

use crate::{CharacterId, Phase};

/// Why a player action was rejected.
///
/// Rejections are expected and frequent. They are reported to the sender
/// only and never change the room state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("session {0} is not a participant")]
    UnknownParticipant(SessionId),

    #[error("the game has ended")]
    GameEnded,

    #[error("action requires phase {required:?}, current phase is {actual:?}")]
    WrongPhase { required: Phase, actual: Phase },

    #[error("character {0} is not offered in your shop")]
    NotInShop(CharacterId),

    #[error("unknown character {0}")]
    UnknownCharacter(CharacterId),

    #[error("not enough gold: need {needed}, have {available}")]
    InsufficientGold { needed: u32, available: u32 },

    #[error("bench is full")]
    BenchFull,

    #[error("bench index {0} is out of range")]
    InvalidBenchIndex(usize),

    #[error("bench slot {0} is empty")]
    EmptyBenchSlot(usize),

    #[error("cell ({row}, {col}) is outside the arena")]
    OutOfBounds { row: usize, col: usize },

    #[error("column {col} is not on your half of the arena")]
    OutsideOwnHalf { col: usize },

    #[error("cell ({row}, {col}) is occupied")]
    CellOccupied { row: usize, col: usize },

    #[error("cell ({row}, {col}) is empty")]
    CellEmpty { row: usize, col: usize },

    #[error("already at maximum level")]
    MaxLevel,

    #[error("debug actions are disabled")]
    DebugDisabled,

    #[error("no timed phase to skip")]
    NothingToSkip,
}

/// Why a new participant could not be added.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("the game has already started")]
    GameInProgress,

    #[error("room is full ({max} participants)")]
    RoomFull { max: usize },
}

/// Errors loading the character catalog. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("catalog is empty")]
    Empty,

    #[error("duplicate character id {0} in catalog")]
    DuplicateId(CharacterId),
}

//! Actions clients send inside `Payload::Game`.

use serde::{Deserialize, Serialize};

use crate::CharacterId;

/// Every action a participant can take.
///
/// Internally tagged with snake_case names and camelCase fields:
/// `{"type": "place_character", "benchIndex": 0, "row": 2, "col": 1}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GameAction {
    /// Buy a character offered in the shop onto the first free bench slot.
    BuyCharacter { character_id: CharacterId },

    /// Sell a bench unit for its full cost.
    SellCharacter { bench_index: usize },

    RerollShop,

    /// Spend gold on experience.
    BuyExperience,

    /// Bench → board. Preparation only.
    PlaceCharacter {
        bench_index: usize,
        row: usize,
        col: usize,
    },

    /// Board → bench, into `target_bench_index` if that slot is free.
    /// Preparation only.
    RemoveFromBoard {
        row: usize,
        col: usize,
        #[serde(default)]
        target_bench_index: Option<usize>,
    },

    /// Relocate a board unit. Preparation only.
    MoveOnBoard {
        from_row: usize,
        from_col: usize,
        to_row: usize,
        to_col: usize,
    },

    SwapBench { from_index: usize, to_index: usize },

    /// Toggle the ready flag. Starts the game from WAITING once everyone
    /// is ready.
    Ready,

    CancelGame,

    DebugTogglePause,

    /// Fire the pending phase transition immediately.
    DebugSkipPhase,
}

impl GameAction {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BuyCharacter { .. } => "buy_character",
            Self::SellCharacter { .. } => "sell_character",
            Self::RerollShop => "reroll_shop",
            Self::BuyExperience => "buy_experience",
            Self::PlaceCharacter { .. } => "place_character",
            Self::RemoveFromBoard { .. } => "remove_from_board",
            Self::MoveOnBoard { .. } => "move_on_board",
            Self::SwapBench { .. } => "swap_bench",
            Self::Ready => "ready",
            Self::CancelGame => "cancel_game",
            Self::DebugTogglePause => "debug_toggle_pause",
            Self::DebugSkipPhase => "debug_skip_phase",
        }
    }
}

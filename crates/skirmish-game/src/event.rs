//! Events the server sends to clients inside `Payload::Game`.

use serde::{Deserialize, Serialize};
use skirmish_protocol::SessionId;

use crate::{Matchup, RoomState, StateDelta};

/// Outbound game traffic.
///
/// Internally tagged: `{"type": "Matchups", "round": 3, ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum GameEvent {
    /// Full state, sent on join and resume.
    State { state: RoomState },

    /// Changes since the previous replication.
    StatePatch { patch: StateDelta },

    /// The pairings for a combat round.
    Matchups {
        round: u32,
        matchups: Vec<Matchup>,
        bye: Option<SessionId>,
    },

    /// An action from this client was refused. Sent to the sender only.
    ActionRejected { reason: String },

    /// The game was cancelled; connections close shortly.
    GameCancelled { reason: String },

    /// One participant (or none) is left standing.
    GameOver { winner: Option<SessionId> },
}

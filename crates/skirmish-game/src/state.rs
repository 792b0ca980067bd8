//! The replicated room state.
//!
//! Everything here is plain data: it serializes to the JSON blob stored in
//! snapshots and sent to clients in `State` events. Game rules live in
//! [`Game`](crate::Game); this module only knows how to look things up.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skirmish_protocol::{AccountId, SessionId};
use skirmish_session::{Identity, Roster};

use crate::{CharacterId, GameRules, UnitTemplate};

/// The room's phase.
///
/// ```text
/// WAITING ──(all ready)──→ PREPARATION ⇄ COMBAT
///    │                          │          │
///    └──────────(cancel / last one standing)──→ GAME_END
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Waiting,
    Preparation,
    Combat,
    GameEnd,
}

impl Phase {
    /// Phases in which the timer counts down.
    pub fn is_timed(self) -> bool {
        matches!(self, Self::Preparation | Self::Combat)
    }
}

/// A purchased unit: a full copy of its template plus instance data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    pub template: UnitTemplate,
    pub current_hp: u32,
    pub stars: u8,
}

impl Unit {
    pub fn from_template(template: &UnitTemplate) -> Self {
        Self {
            template: template.clone(),
            current_hp: template.hp,
            stars: 1,
        }
    }
}

/// A unit standing on an arena cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedUnit {
    pub row: usize,
    pub col: usize,
    pub unit: Unit,
}

/// One player's game data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub session_id: SessionId,
    pub account_id: AccountId,
    pub username: String,
    pub display_name: String,
    pub health: u32,
    pub gold: u32,
    pub xp: u32,
    pub level: u32,
    pub ready: bool,
    pub eliminated: bool,
    /// Whether a connection is attached right now. Informational only:
    /// liveness decisions probe the transport instead.
    pub connected: bool,
    /// Fixed number of slots; `None` is an empty slot.
    pub bench: Vec<Option<Unit>>,
    pub board: Vec<PlacedUnit>,
    pub shop: Vec<CharacterId>,
}

impl Participant {
    /// A fresh participant with the starting economy and an empty shop.
    pub fn new(session_id: SessionId, identity: &Identity, rules: &GameRules) -> Self {
        Self {
            session_id,
            account_id: identity.account_id.clone(),
            username: identity.username.clone(),
            display_name: identity.display_name.clone(),
            health: rules.starting_health,
            gold: rules.starting_gold,
            xp: 0,
            level: 1,
            ready: false,
            eliminated: false,
            connected: true,
            bench: vec![None; rules.bench_size],
            board: Vec::new(),
            shop: Vec::new(),
        }
    }

    /// Index of the first empty bench slot.
    pub fn first_free_slot(&self) -> Option<usize> {
        self.bench.iter().position(Option::is_none)
    }

    /// Number of occupied bench slots.
    pub fn bench_count(&self) -> usize {
        self.bench.iter().filter(|slot| slot.is_some()).count()
    }

    /// Index into `board` of the unit at `(row, col)`.
    pub fn unit_at(&self, row: usize, col: usize) -> Option<usize> {
        self.board.iter().position(|p| p.row == row && p.col == col)
    }
}

/// A 1:1 combat pairing for the current round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matchup {
    pub a: SessionId,
    pub b: SessionId,
    pub name_a: String,
    pub name_b: String,
}

impl Matchup {
    pub fn involves(&self, session: &SessionId) -> bool {
        self.a == *session || self.b == *session
    }

    /// The other side of the matchup, if `session` is in it.
    pub fn opponent_of(&self, session: &SessionId) -> Option<&SessionId> {
        if self.a == *session {
            Some(&self.b)
        } else if self.b == *session {
            Some(&self.a)
        } else {
            None
        }
    }
}

/// The full replicated state of one room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub phase: Phase,
    /// 0 while waiting, 1 on the first preparation phase.
    pub round: u32,
    /// Whole seconds left in the current timed phase.
    pub timer: u32,
    /// Debug pause: the timer holds while set.
    pub paused: bool,
    pub participants: BTreeMap<SessionId, Participant>,
    pub matchups: Vec<Matchup>,
    pub bye: Option<SessionId>,
    /// Participant count when the game started; 0 before that.
    pub started_with: usize,
}

impl Default for RoomState {
    fn default() -> Self {
        Self {
            phase: Phase::Waiting,
            round: 0,
            timer: 0,
            paused: false,
            participants: BTreeMap::new(),
            matchups: Vec::new(),
            bye: None,
            started_with: 0,
        }
    }
}

impl RoomState {
    pub fn participant(&self, session: &SessionId) -> Option<&Participant> {
        self.participants.get(session)
    }

    /// Participants still in the game.
    pub fn active(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values().filter(|p| !p.eliminated)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }
}

impl Roster for RoomState {
    fn account_of(&self, session: &SessionId) -> Option<&AccountId> {
        self.participants.get(session).map(|p| &p.account_id)
    }

    fn session_for_account(&self, account: &AccountId) -> Option<&SessionId> {
        self.participants
            .values()
            .find(|p| p.account_id == *account)
            .map(|p| &p.session_id)
    }
}

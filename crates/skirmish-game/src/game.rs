//! One room's game instance.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use skirmish_protocol::{AccountId, Recipient, SessionId};
use skirmish_session::Identity;
use skirmish_tick::SecondAccumulator;

use crate::phase::grant_xp;
use crate::shop::roll_offer;
use crate::{
    ActionError, CharacterCatalog, CharacterId, GameAction, GameEvent, GameRules, JoinError,
    OpponentHistory, Participant, Phase, PlacedUnit, RoomState, Unit,
};

/// Events produced by one step, each with its audience.
pub type Outbound = Vec<(Recipient, GameEvent)>;

/// The game running inside one room.
///
/// Owns the replicated [`RoomState`] plus everything that is *not*
/// replicated: opponent history, the sub-second clock remainder, and the
/// random generator used for shops and pairing.
pub struct Game {
    pub(crate) state: RoomState,
    pub(crate) rules: Arc<GameRules>,
    pub(crate) catalog: Arc<CharacterCatalog>,
    pub(crate) history: OpponentHistory<AccountId>,
    pub(crate) clock: SecondAccumulator,
    pub(crate) rng: StdRng,
}

fn participant_mut<'a>(
    state: &'a mut RoomState,
    session: &SessionId,
) -> Result<&'a mut Participant, ActionError> {
    state
        .participants
        .get_mut(session)
        .ok_or_else(|| ActionError::UnknownParticipant(session.clone()))
}

impl Game {
    pub fn new(rules: Arc<GameRules>, catalog: Arc<CharacterCatalog>) -> Self {
        Self::with_rng(rules, catalog, StdRng::from_rng(&mut rand::rng()))
    }

    /// A game with a caller-supplied generator, for deterministic tests.
    pub fn with_rng(rules: Arc<GameRules>, catalog: Arc<CharacterCatalog>, rng: StdRng) -> Self {
        Self {
            state: RoomState::default(),
            rules,
            catalog,
            history: OpponentHistory::new(),
            clock: SecondAccumulator::new(),
            rng,
        }
    }

    /// Rebuilds a game from a recovered state. Opponent history starts
    /// empty.
    pub fn restore(state: RoomState, rules: Arc<GameRules>, catalog: Arc<CharacterCatalog>) -> Self {
        Self {
            state,
            ..Self::new(rules, catalog)
        }
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn participant_count(&self) -> usize {
        self.state.participants.len()
    }

    pub fn is_finished(&self) -> bool {
        self.state.phase == Phase::GameEnd
    }

    /// Whether a new participant could be added right now.
    pub fn can_admit(&self) -> Result<(), JoinError> {
        if self.state.phase != Phase::Waiting {
            return Err(JoinError::GameInProgress);
        }
        if self.state.participants.len() >= self.rules.max_participants {
            return Err(JoinError::RoomFull {
                max: self.rules.max_participants,
            });
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Participant lifecycle
    // -----------------------------------------------------------------

    /// Creates a participant with the starting economy and a fresh shop.
    ///
    /// # Errors
    /// [`JoinError::GameInProgress`] outside WAITING,
    /// [`JoinError::RoomFull`] at the participant cap.
    pub fn add_participant(&mut self, session: SessionId, identity: &Identity) -> Result<(), JoinError> {
        self.can_admit()?;
        let mut participant = Participant::new(session.clone(), identity, &self.rules);
        participant.shop = roll_offer(&self.catalog, 1, self.rules.shop_size, &mut self.rng);
        tracing::info!(%session, account = %identity.account_id, "participant added");
        self.state.participants.insert(session, participant);
        Ok(())
    }

    /// Re-keys the participant under `from` to `to`, keeping all game data.
    ///
    /// Matchup and bye references are rewritten in the same step. In
    /// COMBAT the transferred participant's opponents receive the
    /// corrected matchups.
    pub fn transfer(&mut self, from: &SessionId, to: &SessionId) -> Outbound {
        let Some(mut participant) = self.state.participants.remove(from) else {
            return Vec::new();
        };
        participant.session_id = to.clone();
        participant.connected = true;
        self.state.participants.insert(to.clone(), participant);

        for matchup in &mut self.state.matchups {
            if matchup.a == *from {
                matchup.a = to.clone();
            }
            if matchup.b == *from {
                matchup.b = to.clone();
            }
        }
        if self.state.bye.as_ref() == Some(from) {
            self.state.bye = Some(to.clone());
        }

        tracing::info!(%from, %to, "participant identity transferred");

        if self.state.phase != Phase::Combat {
            return Vec::new();
        }
        let event = self.matchups_event();
        self.state
            .matchups
            .iter()
            .filter_map(|m| m.opponent_of(to))
            .map(|opponent| (Recipient::Session(opponent.clone()), event.clone()))
            .collect()
    }

    /// Removes a participant (consented leave or grace expiry).
    ///
    /// Any matchup involving the removed session is dropped. The opponent
    /// left behind sits out the rest of the round unpaired and, in COMBAT,
    /// receives the corrected matchups.
    pub fn remove_participant(&mut self, session: &SessionId) -> Outbound {
        let Some(participant) = self.state.participants.remove(session) else {
            return Vec::new();
        };
        self.history.forget(&participant.account_id);
        if self.state.bye.as_ref() == Some(session) {
            self.state.bye = None;
        }
        let orphaned: Vec<SessionId> = self
            .state
            .matchups
            .iter()
            .filter_map(|m| m.opponent_of(session).cloned())
            .collect();
        self.state.matchups.retain(|m| !m.involves(session));
        tracing::info!(%session, account = %participant.account_id, "participant removed");

        let mut out = Vec::new();
        if self.state.phase == Phase::Combat && !orphaned.is_empty() {
            let event = self.matchups_event();
            out.extend(
                orphaned
                    .into_iter()
                    .map(|opponent| (Recipient::Session(opponent), event.clone())),
            );
        }
        out.extend(self.check_last_standing());
        out
    }

    pub fn set_connected(&mut self, session: &SessionId, connected: bool) {
        if let Some(participant) = self.state.participants.get_mut(session) {
            participant.connected = connected;
        }
    }

    /// Marks a participant as out of the game.
    pub fn eliminate(&mut self, session: &SessionId) -> Outbound {
        let Some(participant) = self.state.participants.get_mut(session) else {
            return Vec::new();
        };
        if participant.eliminated {
            return Vec::new();
        }
        participant.eliminated = true;
        participant.ready = false;
        let account = participant.account_id.clone();
        self.history.clear(&account);
        tracing::info!(%session, "participant eliminated");
        self.check_last_standing()
    }

    /// What a (re)attaching client needs: the full state and, during
    /// combat, the current matchups.
    pub fn resume_events(&self, session: &SessionId) -> Outbound {
        let mut out = vec![(
            Recipient::Session(session.clone()),
            GameEvent::State {
                state: self.state.clone(),
            },
        )];
        if self.state.phase == Phase::Combat {
            out.push((Recipient::Session(session.clone()), self.matchups_event()));
        }
        out
    }

    /// Ends the game immediately.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Outbound {
        if self.is_finished() {
            return Vec::new();
        }
        let reason = reason.into();
        self.enter_game_end();
        tracing::info!(%reason, "game cancelled");
        vec![(Recipient::All, GameEvent::GameCancelled { reason })]
    }

    // -----------------------------------------------------------------
    // Actions
    // -----------------------------------------------------------------

    /// Applies one player action.
    ///
    /// On `Err` the state is unchanged.
    pub fn apply(&mut self, sender: &SessionId, action: GameAction) -> Result<Outbound, ActionError> {
        if !self.state.participants.contains_key(sender) {
            return Err(ActionError::UnknownParticipant(sender.clone()));
        }
        if self.is_finished() {
            return Err(ActionError::GameEnded);
        }

        match action {
            GameAction::BuyCharacter { character_id } => self.buy_character(sender, character_id),
            GameAction::SellCharacter { bench_index } => self.sell_character(sender, bench_index),
            GameAction::RerollShop => self.reroll_shop(sender),
            GameAction::BuyExperience => self.buy_experience(sender),
            GameAction::PlaceCharacter {
                bench_index,
                row,
                col,
            } => self.place_character(sender, bench_index, row, col),
            GameAction::RemoveFromBoard {
                row,
                col,
                target_bench_index,
            } => self.remove_from_board(sender, row, col, target_bench_index),
            GameAction::MoveOnBoard {
                from_row,
                from_col,
                to_row,
                to_col,
            } => self.move_on_board(sender, (from_row, from_col), (to_row, to_col)),
            GameAction::SwapBench {
                from_index,
                to_index,
            } => self.swap_bench(sender, from_index, to_index),
            GameAction::Ready => self.toggle_ready(sender),
            GameAction::CancelGame => {
                let name = self
                    .state
                    .participant(sender)
                    .map(|p| p.display_name.clone())
                    .unwrap_or_default();
                Ok(self.cancel(format!("cancelled by {name}")))
            }
            GameAction::DebugTogglePause => {
                self.require_debug()?;
                self.state.paused = !self.state.paused;
                self.clock.reset();
                tracing::info!(paused = self.state.paused, "debug pause toggled");
                Ok(Vec::new())
            }
            GameAction::DebugSkipPhase => {
                self.require_debug()?;
                if !self.state.phase.is_timed() {
                    return Err(ActionError::NothingToSkip);
                }
                self.clock.reset();
                Ok(self.fire_transition())
            }
        }
    }

    fn require_phase(&self, required: Phase) -> Result<(), ActionError> {
        if self.state.phase != required {
            return Err(ActionError::WrongPhase {
                required,
                actual: self.state.phase,
            });
        }
        Ok(())
    }

    fn require_debug(&self) -> Result<(), ActionError> {
        if self.rules.debug_actions {
            Ok(())
        } else {
            Err(ActionError::DebugDisabled)
        }
    }

    fn require_cell(&self, row: usize, col: usize) -> Result<(), ActionError> {
        if !self.rules.in_arena(row, col) {
            return Err(ActionError::OutOfBounds { row, col });
        }
        Ok(())
    }

    fn require_own_half(&self, row: usize, col: usize) -> Result<(), ActionError> {
        self.require_cell(row, col)?;
        if !self.rules.in_own_half(col) {
            return Err(ActionError::OutsideOwnHalf { col });
        }
        Ok(())
    }

    fn buy_character(&mut self, sender: &SessionId, id: CharacterId) -> Result<Outbound, ActionError> {
        let template = self.catalog.get(id)?;
        let p = participant_mut(&mut self.state, sender)?;

        let offer = p
            .shop
            .iter()
            .position(|offered| *offered == id)
            .ok_or(ActionError::NotInShop(id))?;
        let slot = p.first_free_slot().ok_or(ActionError::BenchFull)?;
        if p.gold < template.cost {
            return Err(ActionError::InsufficientGold {
                needed: template.cost,
                available: p.gold,
            });
        }

        p.gold -= template.cost;
        p.shop.remove(offer);
        p.bench[slot] = Some(Unit::from_template(template));
        Ok(Vec::new())
    }

    fn sell_character(&mut self, sender: &SessionId, index: usize) -> Result<Outbound, ActionError> {
        let p = participant_mut(&mut self.state, sender)?;
        let slot = p
            .bench
            .get_mut(index)
            .ok_or(ActionError::InvalidBenchIndex(index))?;
        let unit = slot.take().ok_or(ActionError::EmptyBenchSlot(index))?;
        p.gold += unit.template.cost;
        Ok(Vec::new())
    }

    fn reroll_shop(&mut self, sender: &SessionId) -> Result<Outbound, ActionError> {
        let cost = self.rules.reroll_cost;
        let p = participant_mut(&mut self.state, sender)?;
        if p.gold < cost {
            return Err(ActionError::InsufficientGold {
                needed: cost,
                available: p.gold,
            });
        }
        p.gold -= cost;
        p.shop = roll_offer(&self.catalog, p.level, self.rules.shop_size, &mut self.rng);
        Ok(Vec::new())
    }

    fn buy_experience(&mut self, sender: &SessionId) -> Result<Outbound, ActionError> {
        let rules = &self.rules;
        let p = participant_mut(&mut self.state, sender)?;
        if p.level >= rules.max_level() {
            return Err(ActionError::MaxLevel);
        }
        if p.gold < rules.xp_cost {
            return Err(ActionError::InsufficientGold {
                needed: rules.xp_cost,
                available: p.gold,
            });
        }
        p.gold -= rules.xp_cost;
        grant_xp(p, rules.xp_gain, rules);
        Ok(Vec::new())
    }

    fn place_character(
        &mut self,
        sender: &SessionId,
        index: usize,
        row: usize,
        col: usize,
    ) -> Result<Outbound, ActionError> {
        self.require_own_half(row, col)?;
        self.require_phase(Phase::Preparation)?;
        let p = participant_mut(&mut self.state, sender)?;

        if index >= p.bench.len() {
            return Err(ActionError::InvalidBenchIndex(index));
        }
        if p.unit_at(row, col).is_some() {
            return Err(ActionError::CellOccupied { row, col });
        }
        let unit = p.bench[index]
            .take()
            .ok_or(ActionError::EmptyBenchSlot(index))?;
        p.board.push(PlacedUnit { row, col, unit });
        Ok(Vec::new())
    }

    fn remove_from_board(
        &mut self,
        sender: &SessionId,
        row: usize,
        col: usize,
        target: Option<usize>,
    ) -> Result<Outbound, ActionError> {
        self.require_cell(row, col)?;
        self.require_phase(Phase::Preparation)?;
        let p = participant_mut(&mut self.state, sender)?;

        let at = p.unit_at(row, col).ok_or(ActionError::CellEmpty { row, col })?;
        let slot = target
            .filter(|&t| p.bench.get(t).is_some_and(Option::is_none))
            .or_else(|| p.first_free_slot())
            .ok_or(ActionError::BenchFull)?;

        let placed = p.board.remove(at);
        p.bench[slot] = Some(placed.unit);
        Ok(Vec::new())
    }

    fn move_on_board(
        &mut self,
        sender: &SessionId,
        (from_row, from_col): (usize, usize),
        (to_row, to_col): (usize, usize),
    ) -> Result<Outbound, ActionError> {
        self.require_cell(from_row, from_col)?;
        self.require_own_half(to_row, to_col)?;
        self.require_phase(Phase::Preparation)?;
        let p = participant_mut(&mut self.state, sender)?;

        let at = p.unit_at(from_row, from_col).ok_or(ActionError::CellEmpty {
            row: from_row,
            col: from_col,
        })?;
        if p.unit_at(to_row, to_col).is_some() {
            return Err(ActionError::CellOccupied {
                row: to_row,
                col: to_col,
            });
        }
        let placed = &mut p.board[at];
        placed.row = to_row;
        placed.col = to_col;
        Ok(Vec::new())
    }

    fn swap_bench(&mut self, sender: &SessionId, from: usize, to: usize) -> Result<Outbound, ActionError> {
        let p = participant_mut(&mut self.state, sender)?;
        for index in [from, to] {
            if index >= p.bench.len() {
                return Err(ActionError::InvalidBenchIndex(index));
            }
        }
        p.bench.swap(from, to);
        Ok(Vec::new())
    }

    fn toggle_ready(&mut self, sender: &SessionId) -> Result<Outbound, ActionError> {
        let p = participant_mut(&mut self.state, sender)?;
        p.ready = !p.ready;

        let state = &self.state;
        let all_ready = state.participants.values().all(|p| p.ready);
        if state.phase == Phase::Waiting
            && all_ready
            && state.participants.len() >= self.rules.min_participants
        {
            return Ok(self.start_game());
        }
        Ok(Vec::new())
    }
}

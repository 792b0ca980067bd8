//! Phase transitions and the whole-second phase clock.

use std::collections::HashMap;
use std::time::Duration;

use skirmish_protocol::{AccountId, Recipient, SessionId};

use crate::game::{Game, Outbound};
use crate::shop::roll_offer;
use crate::{GameEvent, GameRules, Matchup, Participant, Phase, pair};

/// Adds experience and recomputes the level. Capped at the max level.
pub(crate) fn grant_xp(participant: &mut Participant, amount: u32, rules: &GameRules) {
    if participant.level >= rules.max_level() {
        return;
    }
    participant.xp += amount;
    participant.level = rules.level_for(participant.xp);
}

impl Game {
    /// Feeds elapsed time into the phase clock.
    ///
    /// Whole seconds decrement the timer (several at once after a slow
    /// tick). Reaching 0 fires the pending transition exactly once; any
    /// surplus time is dropped. Outside timed phases, or while paused,
    /// elapsed time is discarded.
    pub fn advance(&mut self, dt: Duration) -> Outbound {
        if !self.state.phase.is_timed() || self.state.paused {
            self.clock.reset();
            return Vec::new();
        }

        let seconds = self.clock.accumulate(dt);
        if seconds == 0 && self.state.timer > 0 {
            return Vec::new();
        }

        self.state.timer = self.state.timer.saturating_sub(seconds);
        if self.state.timer > 0 {
            return Vec::new();
        }
        self.clock.reset();
        self.fire_transition()
    }

    /// Runs the transition the current timed phase is counting towards.
    pub(crate) fn fire_transition(&mut self) -> Outbound {
        match self.state.phase {
            Phase::Preparation => self.enter_combat(),
            Phase::Combat => self.enter_preparation(),
            Phase::Waiting | Phase::GameEnd => Vec::new(),
        }
    }

    /// WAITING → PREPARATION, round 1.
    pub(crate) fn start_game(&mut self) -> Outbound {
        let state = &mut self.state;
        state.phase = Phase::Preparation;
        state.round = 1;
        state.timer = self.rules.preparation_seconds;
        state.started_with = state.participants.len();
        state.matchups.clear();
        state.bye = None;
        for participant in state.participants.values_mut() {
            participant.ready = false;
        }
        self.clock.reset();

        tracing::info!(participants = state.started_with, "game started");
        Vec::new()
    }

    /// PREPARATION → COMBAT: pair everyone still in the game.
    pub(crate) fn enter_combat(&mut self) -> Outbound {
        let active: Vec<&Participant> = self.state.active().collect();
        let accounts: Vec<AccountId> = active.iter().map(|p| p.account_id.clone()).collect();
        let by_account: HashMap<AccountId, (SessionId, String)> = active
            .iter()
            .map(|p| {
                (
                    p.account_id.clone(),
                    (p.session_id.clone(), p.display_name.clone()),
                )
            })
            .collect();

        let pairing = pair(&accounts, self.state.round, &mut self.history, &mut self.rng);

        let mut matchups = Vec::with_capacity(pairing.pairs.len());
        for (a, b) in &pairing.pairs {
            if let (Some((sa, na)), Some((sb, nb))) = (by_account.get(a), by_account.get(b)) {
                matchups.push(Matchup {
                    a: sa.clone(),
                    b: sb.clone(),
                    name_a: na.clone(),
                    name_b: nb.clone(),
                });
            }
        }
        let bye = pairing
            .bye
            .and_then(|account| by_account.get(&account).map(|(s, _)| s.clone()));

        let state = &mut self.state;
        state.phase = Phase::Combat;
        state.timer = self.rules.combat_seconds;
        state.matchups = matchups;
        state.bye = bye;

        tracing::info!(
            round = state.round,
            matchups = state.matchups.len(),
            bye = ?state.bye,
            "combat phase started"
        );
        vec![(Recipient::All, self.matchups_event())]
    }

    /// COMBAT → PREPARATION: next round, income, experience, new shops.
    pub(crate) fn enter_preparation(&mut self) -> Outbound {
        let rules = &self.rules;
        let state = &mut self.state;
        state.phase = Phase::Preparation;
        state.round += 1;
        state.timer = rules.preparation_seconds;
        state.matchups.clear();
        state.bye = None;

        for participant in state.participants.values_mut() {
            if !participant.eliminated {
                participant.gold += rules.income;
                grant_xp(participant, rules.round_xp, rules);
            }
            participant.shop = roll_offer(
                &self.catalog,
                participant.level,
                rules.shop_size,
                &mut self.rng,
            );
        }

        tracing::info!(round = state.round, "preparation phase started");
        Vec::new()
    }

    /// Ends the game if it started with two or more participants and at
    /// most one is left standing.
    pub(crate) fn check_last_standing(&mut self) -> Outbound {
        let state = &self.state;
        if state.started_with < 2 || !state.phase.is_timed() || state.active_count() > 1 {
            return Vec::new();
        }
        let winner = state.active().next().map(|p| p.session_id.clone());
        self.enter_game_end();
        tracing::info!(winner = ?winner, "game over");
        vec![(Recipient::All, GameEvent::GameOver { winner })]
    }

    pub(crate) fn enter_game_end(&mut self) {
        self.state.phase = Phase::GameEnd;
        self.state.timer = 0;
        self.state.paused = false;
        self.clock.reset();
    }

    pub(crate) fn matchups_event(&self) -> GameEvent {
        GameEvent::Matchups {
            round: self.state.round,
            matchups: self.state.matchups.clone(),
            bye: self.state.bye.clone(),
        }
    }
}

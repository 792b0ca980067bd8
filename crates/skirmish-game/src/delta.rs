//! State diffs for replication.
//!
//! The room actor keeps the last state it broadcast. After every command
//! or tick it computes [`StateDelta::between`] that copy and the live state
//! and sends the delta if it is not empty. Clients apply it with
//! [`StateDelta::apply`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use skirmish_protocol::SessionId;

use crate::{Matchup, Participant, Phase, RoomState};

/// Matchups and bye always travel together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingPatch {
    pub matchups: Vec<Matchup>,
    pub bye: Option<SessionId>,
}

/// The fields of [`RoomState`] that changed. Unchanged fields are `None`
/// and omitted from the JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_with: Option<usize>,
    /// Added or changed participants, in full.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub participants: BTreeMap<SessionId, Participant>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing: Option<PairingPatch>,
}

fn changed<T: PartialEq + Clone>(old: &T, new: &T) -> Option<T> {
    (old != new).then(|| new.clone())
}

impl StateDelta {
    /// What must be applied to `old` to obtain `new`.
    pub fn between(old: &RoomState, new: &RoomState) -> Self {
        let participants = new
            .participants
            .iter()
            .filter(|(id, p)| old.participants.get(*id) != Some(*p))
            .map(|(id, p)| (id.clone(), p.clone()))
            .collect();
        let removed = old
            .participants
            .keys()
            .filter(|id| !new.participants.contains_key(*id))
            .cloned()
            .collect();
        let pairing = (old.matchups != new.matchups || old.bye != new.bye).then(|| PairingPatch {
            matchups: new.matchups.clone(),
            bye: new.bye.clone(),
        });

        Self {
            phase: changed(&old.phase, &new.phase),
            round: changed(&old.round, &new.round),
            timer: changed(&old.timer, &new.timer),
            paused: changed(&old.paused, &new.paused),
            started_with: changed(&old.started_with, &new.started_with),
            participants,
            removed,
            pairing,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the delta in place.
    pub fn apply(&self, state: &mut RoomState) {
        if let Some(phase) = self.phase {
            state.phase = phase;
        }
        if let Some(round) = self.round {
            state.round = round;
        }
        if let Some(timer) = self.timer {
            state.timer = timer;
        }
        if let Some(paused) = self.paused {
            state.paused = paused;
        }
        if let Some(started_with) = self.started_with {
            state.started_with = started_with;
        }
        for id in &self.removed {
            state.participants.remove(id);
        }
        for (id, participant) in &self.participants {
            state.participants.insert(id.clone(), participant.clone());
        }
        if let Some(pairing) = &self.pairing {
            state.matchups = pairing.matchups.clone();
            state.bye = pairing.bye.clone();
        }
    }
}

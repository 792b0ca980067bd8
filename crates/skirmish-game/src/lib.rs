//! Game rules for Skirmish rooms.
//!
//! Everything in this crate is synchronous and owned by exactly one room
//! actor. The room feeds it player actions and elapsed time; it mutates
//! the [`RoomState`] and returns the events that must go out, each paired
//! with a [`Recipient`](skirmish_protocol::Recipient).
//!
//! # Key types
//!
//! - [`Game`]: one room's game instance (state, rules, history, rng)
//! - [`RoomState`]: the replicated state
//! - [`GameAction`] / [`GameEvent`]: what clients send and receive
//! - [`CharacterCatalog`]: immutable unit templates shared by all rooms
//! - [`pair`]: the matchup algorithm
//! - [`StateDelta`]: the replication diff

mod action;
mod catalog;
mod delta;
mod error;
mod event;
mod game;
mod pairing;
mod phase;
mod rules;
mod shop;
mod state;

pub use action::GameAction;
pub use catalog::{CharacterCatalog, CharacterId, Rarity, UnitTemplate};
pub use delta::{PairingPatch, StateDelta};
pub use error::{ActionError, CatalogError, JoinError};
pub use event::GameEvent;
pub use game::{Game, Outbound};
pub use pairing::{OpponentHistory, Pairing, history_cap, pair};
pub use rules::GameRules;
pub use state::{Matchup, Participant, Phase, PlacedUnit, RoomState, Unit};

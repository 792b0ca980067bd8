//! Wire protocol for Skirmish.
//!
//! This crate defines what travels between a game client and the server:
//!
//! - **Identifiers** ([`SessionId`], [`AccountId`], [`RoomId`]) shared by
//!   every other layer.
//! - **Envelopes** ([`Envelope`], [`Payload`], [`SystemMessage`]) that wrap
//!   framework traffic and game traffic.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) that turns them into
//!   transport frames and back.
//!
//! ```text
//! Transport (frames) → Protocol (Envelope) → Session / Room
//! ```
//!
//! The game vocabulary itself (actions and events) lives in
//! `skirmish-game`; [`Payload`] is generic over it so this crate stays
//! ignorant of game rules.

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    AccountId, Envelope, Payload, Recipient, ResumeTicket, RoomId, SessionId,
    SystemMessage, PROTOCOL_VERSION,
};

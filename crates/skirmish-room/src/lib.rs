//! Room lifecycle management for Skirmish.
//!
//! Each room runs as an isolated Tokio task (actor model) owning one
//! [`Game`](skirmish_game::Game), its connections, grace windows, phase
//! clock, and snapshot timer.
//!
//! # Key types
//!
//! - [`RoomManager`]: creates, recovers, and routes joins to rooms
//! - [`RoomHandle`]: send commands to a running room actor
//! - [`RoomOutbound`]: what a room sends to a connection
//! - [`RoomConfig`]: tick rate, snapshot timing, grace window

mod config;
mod error;
mod manager;
mod room;

pub use config::RoomConfig;
pub use error::RoomError;
pub use manager::RoomManager;
pub use room::{
    JoinAccepted, JoinKind, JoinRequest, ParticipantSender, RoomHandle, RoomInfo, RoomOutbound,
};

//! # Skirmish
//!
//! Lobby and game server for a round-based auto-battler.
//!
//! Players connect over WebSocket, authenticate, and join a room. Each room
//! runs its own phase clock (WAITING → PREPARATION ⇄ COMBAT → GAME_END),
//! pairs opponents every combat round, and holds dropped players for a
//! grace window. Running rooms are snapshotted; after a restart they come
//! back under new ids and old ids redirect to them.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use skirmish::{ServerAuth, ServerConfig, ServerStore, SkirmishServerBuilder};
//!
//! # async fn start() -> Result<(), skirmish::SkirmishError> {
//! let config = ServerConfig::from_env();
//! let auth = ServerAuth::from_config(&config)?;
//! let store = Arc::new(ServerStore::from_config(&config).await?);
//! let server = SkirmishServerBuilder::from_config(&config)?
//!     .build(auth, store)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::SkirmishError;
pub use server::{ServerAuth, ServerStore, SkirmishServer, SkirmishServerBuilder};

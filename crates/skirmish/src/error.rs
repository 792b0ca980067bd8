//! Unified error type for the Skirmish server.

use skirmish_game::CatalogError;
use skirmish_protocol::ProtocolError;
use skirmish_room::RoomError;
use skirmish_session::SessionError;
use skirmish_snapshot::StoreError;
use skirmish_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors, so the
/// handler and `main` deal with this one type.
#[derive(Debug, thiserror::Error)]
pub enum SkirmishError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Authentication or join resolution failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Room(#[from] RoomError),

    /// The snapshot store could not be opened or read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The character catalog file is unusable.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Neither a token table nor development auth is configured.
    #[error("no authenticator configured: set SKIRMISH_TOKENS or SKIRMISH_DEV_AUTH=true")]
    NoAuthenticator,
}

//! Error types for the room layer.

use skirmish_game::JoinError;
use skirmish_protocol::RoomId;
use skirmish_session::SessionError;
use skirmish_snapshot::StoreError;

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// The room does not exist (it may have been recovered under a new id).
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room is at its participant cap.
    #[error("room {room_id} is full ({max} participants)")]
    RoomFull { room_id: RoomId, max: usize },

    /// New participants are only admitted while the room is waiting.
    #[error("room {0} has already started")]
    GameInProgress(RoomId),

    /// The game has ended and the room is closing.
    #[error("room {0} is closing")]
    Closing(RoomId),

    /// Join resolution refused the connection.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A snapshot store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The room's command channel is closed.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}

impl RoomError {
    pub(crate) fn from_join(room_id: &RoomId, error: JoinError) -> Self {
        match error {
            JoinError::GameInProgress => Self::GameInProgress(room_id.clone()),
            JoinError::RoomFull { max } => Self::RoomFull {
                room_id: room_id.clone(),
                max,
            },
        }
    }

    /// Whether another room might accept the same join.
    pub fn is_room_specific(&self) -> bool {
        matches!(
            self,
            Self::RoomFull { .. } | Self::GameInProgress(_) | Self::Closing(_) | Self::Unavailable(_)
        )
    }
}

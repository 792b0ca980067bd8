//! Error types for the snapshot layer.

use std::path::PathBuf;

use skirmish_protocol::RoomId;

/// Errors raised by snapshot stores and the state codec.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("snapshot store i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A stored record could not be read back.
    #[error("corrupt record {path}: {source}")]
    CorruptRecord {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The room state could not be serialized.
    #[error("failed to encode state of room {room_id}: {source}")]
    Encode {
        room_id: RoomId,
        #[source]
        source: serde_json::Error,
    },

    /// The state blob of a record is not a valid room state.
    #[error("failed to decode state of room {room_id}: {source}")]
    Decode {
        room_id: RoomId,
        #[source]
        source: serde_json::Error,
    },

    /// The room id cannot be used as a storage key.
    #[error("room id {0} is not a valid storage key")]
    InvalidKey(RoomId),
}

//! Room state ⇄ snapshot blob.

use skirmish_game::RoomState;
use skirmish_protocol::RoomId;

use crate::{SnapshotRecord, StoreError};

/// Serializes a room state for storage.
pub fn encode_state(room_id: &RoomId, state: &RoomState) -> Result<String, StoreError> {
    serde_json::to_string(state).map_err(|source| StoreError::Encode {
        room_id: room_id.clone(),
        source,
    })
}

/// Decodes the state stored in `record`.
///
/// Session and account ids come back verbatim. Nobody is connected to a
/// freshly decoded state, so every participant's `connected` flag is
/// cleared.
pub fn decode_state(record: &SnapshotRecord) -> Result<RoomState, StoreError> {
    let mut state: RoomState =
        serde_json::from_str(&record.state).map_err(|source| StoreError::Decode {
            room_id: record.room_id.clone(),
            source,
        })?;
    for participant in state.participants.values_mut() {
        participant.connected = false;
    }
    Ok(state)
}

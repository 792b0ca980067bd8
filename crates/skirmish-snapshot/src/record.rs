//! Persisted records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use skirmish_protocol::RoomId;

/// One room's latest durable snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRecord {
    pub room_id: RoomId,
    /// The room state as a JSON document.
    pub state: String,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Cleared once the record has been recovered into a new room.
    pub active: bool,
    /// The room this one was recovered from, if any.
    #[serde(default)]
    pub previous_room_id: Option<RoomId>,
}

impl SnapshotRecord {
    /// A fresh active record written at `now` that lives for `ttl`.
    pub fn new(room_id: RoomId, state: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            room_id,
            state,
            updated_at: now,
            expires_at: now + ttl,
            active: true,
            previous_room_id: None,
        }
    }

    pub fn with_previous(mut self, previous: Option<RoomId>) -> Self {
        self.previous_room_id = previous;
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether recovery should pick this record up.
    pub fn is_recoverable(&self, now: DateTime<Utc>) -> bool {
        self.active && !self.is_expired(now)
    }
}

/// Where a recovered room went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRemap {
    pub old_room_id: RoomId,
    pub new_room_id: RoomId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RoomRemap {
    pub fn new(old: RoomId, new: RoomId, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            old_room_id: old,
            new_room_id: new,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

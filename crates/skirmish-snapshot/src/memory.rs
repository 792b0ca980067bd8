//! In-memory store for tests and ephemeral deployments.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use skirmish_protocol::RoomId;
use tokio::sync::Mutex;

use crate::{RoomRemap, SnapshotRecord, SnapshotStore, StoreError};

#[derive(Debug, Default)]
struct Tables {
    records: HashMap<RoomId, SnapshotRecord>,
    remaps: HashMap<RoomId, RoomRemap>,
}

/// A [`SnapshotStore`] that forgets everything when dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored record for `room_id`, active or not.
    pub async fn get(&self, room_id: &RoomId) -> Option<SnapshotRecord> {
        self.tables.lock().await.records.get(room_id).cloned()
    }

    pub async fn record_count(&self) -> usize {
        self.tables.lock().await.records.len()
    }
}

impl SnapshotStore for MemoryStore {
    async fn upsert(&self, record: SnapshotRecord) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        if let Some(existing) = tables.records.get(&record.room_id) {
            if existing.updated_at > record.updated_at {
                tracing::debug!(room_id = %record.room_id, "discarding stale snapshot");
                return Ok(false);
            }
        }
        tables.records.insert(record.room_id.clone(), record);
        Ok(true)
    }

    async fn delete(&self, room_id: &RoomId) -> Result<(), StoreError> {
        self.tables.lock().await.records.remove(room_id);
        Ok(())
    }

    async fn load_active(&self, now: DateTime<Utc>) -> Result<Vec<SnapshotRecord>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .records
            .values()
            .filter(|r| r.is_recoverable(now))
            .cloned()
            .collect())
    }

    async fn deactivate(&self, room_id: &RoomId) -> Result<(), StoreError> {
        if let Some(record) = self.tables.lock().await.records.get_mut(room_id) {
            record.active = false;
        }
        Ok(())
    }

    async fn put_remap(&self, remap: RoomRemap) -> Result<(), StoreError> {
        self.tables
            .lock()
            .await
            .remaps
            .insert(remap.old_room_id.clone(), remap);
        Ok(())
    }

    async fn remap(&self, old: &RoomId) -> Result<Option<RoomRemap>, StoreError> {
        Ok(self.tables.lock().await.remaps.get(old).cloned())
    }

    async fn prune(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut tables = self.tables.lock().await;
        let before = tables.records.len() + tables.remaps.len();
        tables.records.retain(|_, r| !r.is_expired(now));
        tables.remaps.retain(|_, m| !m.is_expired(now));
        Ok(before - tables.records.len() - tables.remaps.len())
    }
}

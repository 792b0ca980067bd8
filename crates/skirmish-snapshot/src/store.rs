//! The storage abstraction.

use std::future::Future;

use chrono::{DateTime, Utc};
use skirmish_protocol::RoomId;

use crate::{RoomRemap, SnapshotRecord, StoreError};

/// Durable storage for room snapshots and room id remaps.
///
/// One store is shared by every room (behind an `Arc`); implementations
/// must be safe to call concurrently. Rooms never wait on a write: they
/// spawn it and log failures.
pub trait SnapshotStore: Send + Sync + 'static {
    /// Inserts or replaces the record for `record.room_id`.
    ///
    /// Last write wins on `updated_at`: a record older than the stored one
    /// is discarded and `Ok(false)` is returned.
    fn upsert(&self, record: SnapshotRecord) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Removes the record for `room_id`. Missing records are not an error.
    fn delete(&self, room_id: &RoomId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every record that is active and not expired at `now`.
    fn load_active(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<SnapshotRecord>, StoreError>> + Send;

    /// Marks the record for `room_id` inactive so it is never recovered
    /// again.
    fn deactivate(&self, room_id: &RoomId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Records where an old room id now points.
    fn put_remap(&self, remap: RoomRemap) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// The remap registered for `old`, expired or not.
    fn remap(
        &self,
        old: &RoomId,
    ) -> impl Future<Output = Result<Option<RoomRemap>, StoreError>> + Send;

    /// Deletes expired records and remaps. Returns how many were removed.
    fn prune(&self, now: DateTime<Utc>) -> impl Future<Output = Result<usize, StoreError>> + Send;
}

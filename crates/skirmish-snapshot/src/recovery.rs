//! Startup recovery and room id lookup.

use chrono::{DateTime, Duration, Utc};
use skirmish_game::RoomState;
use skirmish_protocol::RoomId;

use crate::{RoomRemap, SnapshotRecord, SnapshotStore, StoreError, decode_state};

/// Longest remap chain [`locate`] will follow.
pub const MAX_REMAP_HOPS: usize = 8;

/// What a recovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// `(old, new)` for every room rebuilt.
    pub recovered: Vec<(RoomId, RoomId)>,
    /// Records whose state could not be decoded. They are deactivated.
    pub failed: Vec<RoomId>,
}

/// Rebuilds every recoverable room found in `store`.
///
/// For each active, unexpired record the state is decoded and handed to
/// `restore`, which creates the new room and returns its id. A remap
/// `old → new` valid for `remap_ttl` is stored and the old record is
/// deactivated. A record that fails to decode is deactivated and skipped.
///
/// # Errors
/// Only a failure to list the records aborts the pass.
pub async fn recover<S, F>(
    store: &S,
    now: DateTime<Utc>,
    remap_ttl: Duration,
    mut restore: F,
) -> Result<RecoveryReport, StoreError>
where
    S: SnapshotStore + ?Sized,
    F: FnMut(&SnapshotRecord, RoomState) -> RoomId,
{
    let records = store.load_active(now).await?;
    tracing::info!(records = records.len(), "recovering rooms from snapshots");

    let mut report = RecoveryReport::default();
    for record in records {
        let old = record.room_id.clone();
        match decode_state(&record) {
            Ok(state) => {
                let new = restore(&record, state);
                if let Err(e) = store.put_remap(RoomRemap::new(old.clone(), new.clone(), now, remap_ttl)).await {
                    tracing::warn!(room_id = %old, error = %e, "failed to store room remap");
                }
                tracing::info!(previous = %old, current = %new, "room recovered");
                report.recovered.push((old.clone(), new));
            }
            Err(e) => {
                tracing::warn!(room_id = %old, error = %e, "snapshot unreadable, deactivating");
                report.failed.push(old.clone());
            }
        }
        if let Err(e) = store.deactivate(&old).await {
            tracing::warn!(room_id = %old, error = %e, "failed to deactivate snapshot");
        }
    }
    Ok(report)
}

/// Follows unexpired remaps from `room_id` to the newest room.
///
/// Returns `None` when no unexpired remap starts at `room_id`. Chains are
/// cut after [`MAX_REMAP_HOPS`].
pub async fn locate<S>(
    store: &S,
    room_id: &RoomId,
    now: DateTime<Utc>,
) -> Result<Option<RoomId>, StoreError>
where
    S: SnapshotStore + ?Sized,
{
    let mut current = room_id.clone();
    for _ in 0..MAX_REMAP_HOPS {
        match store.remap(&current).await? {
            Some(remap) if !remap.is_expired(now) => current = remap.new_room_id,
            _ => break,
        }
    }
    Ok((current != *room_id).then_some(current))
}

//! Store behavior (shared by both backends) and the recovery pass.

use std::path::PathBuf;

use chrono::{Duration, Utc};
use skirmish_game::{GameRules, Participant, Phase, RoomState};
use skirmish_protocol::{AccountId, RoomId, SessionId};
use skirmish_session::Identity;
use skirmish_snapshot::{
    FileStore, MemoryStore, RoomRemap, SnapshotRecord, SnapshotStore, encode_state, locate, recover,
};

// =========================================================================
// Helpers
// =========================================================================

fn rid(id: &str) -> RoomId {
    RoomId::new(id)
}

fn running_state(sessions: &[&str]) -> RoomState {
    let mut state = RoomState {
        phase: Phase::Preparation,
        round: 2,
        timer: 17,
        started_with: sessions.len(),
        ..RoomState::default()
    };
    for session in sessions {
        let identity = Identity {
            account_id: AccountId::new(format!("acc-{session}")),
            username: (*session).into(),
            display_name: (*session).into(),
        };
        let p = Participant::new(SessionId::new(*session), &identity, &GameRules::default());
        state.participants.insert(p.session_id.clone(), p);
    }
    state
}

fn record(room: &str, state: &RoomState, age: Duration) -> SnapshotRecord {
    let room = rid(room);
    let blob = encode_state(&room, state).unwrap();
    SnapshotRecord::new(room, blob, Utc::now() - age, Duration::minutes(30))
}

/// A fresh, empty directory under the system temp dir.
async fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("skirmish-snapshot-{name}-{}", std::process::id()));
    let _ = tokio::fs::remove_dir_all(&dir).await;
    dir
}

// =========================================================================
// Shared store checks
// =========================================================================

async fn check_last_write_wins<S: SnapshotStore>(store: &S) {
    let state = running_state(&["a"]);
    let newer = record("r1", &state, Duration::seconds(1));
    let older = record("r1", &running_state(&["b"]), Duration::seconds(10));

    assert!(store.upsert(newer.clone()).await.unwrap());
    assert!(!store.upsert(older).await.unwrap(), "older write must be discarded");

    let active = store.load_active(Utc::now()).await.unwrap();
    assert_eq!(active, vec![newer]);
}

async fn check_load_active_filters<S: SnapshotStore>(store: &S) {
    let state = running_state(&["a"]);
    let live = record("live", &state, Duration::zero());
    let mut expired = record("expired", &state, Duration::hours(2));
    expired.expires_at = Utc::now() - Duration::minutes(1);
    let deactivated = record("done", &state, Duration::zero());

    for r in [live.clone(), expired, deactivated] {
        store.upsert(r).await.unwrap();
    }
    store.deactivate(&rid("done")).await.unwrap();

    let active = store.load_active(Utc::now()).await.unwrap();
    assert_eq!(active, vec![live]);
}

async fn check_delete_and_prune<S: SnapshotStore>(store: &S) {
    let state = running_state(&["a"]);
    let mut expired = record("old", &state, Duration::hours(2));
    expired.expires_at = Utc::now() - Duration::minutes(1);
    store.upsert(expired).await.unwrap();
    store.upsert(record("keep", &state, Duration::zero())).await.unwrap();
    store.upsert(record("gone", &state, Duration::zero())).await.unwrap();

    store.delete(&rid("gone")).await.unwrap();
    store.delete(&rid("never-existed")).await.unwrap();
    let removed = store.prune(Utc::now()).await.unwrap();

    assert_eq!(removed, 1);
    let active = store.load_active(Utc::now()).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].room_id, rid("keep"));
}

#[tokio::test]
async fn test_memory_store_upsert_older_record_is_discarded() {
    check_last_write_wins(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_store_load_active_skips_expired_and_inactive() {
    check_load_active_filters(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_memory_store_delete_and_prune_remove_records() {
    check_delete_and_prune(&MemoryStore::new()).await;
}

#[tokio::test]
async fn test_file_store_upsert_older_record_is_discarded() {
    let dir = scratch_dir("lww").await;
    check_last_write_wins(&FileStore::open(&dir).await.unwrap()).await;
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_file_store_load_active_skips_expired_and_inactive() {
    let dir = scratch_dir("active").await;
    check_load_active_filters(&FileStore::open(&dir).await.unwrap()).await;
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_file_store_delete_and_prune_remove_records() {
    let dir = scratch_dir("prune").await;
    check_delete_and_prune(&FileStore::open(&dir).await.unwrap()).await;
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_file_store_survives_reopen_and_skips_corrupt_files() {
    let dir = scratch_dir("reopen").await;
    let live = record("r1", &running_state(&["a"]), Duration::zero());
    {
        let store = FileStore::open(&dir).await.unwrap();
        store.upsert(live.clone()).await.unwrap();
        tokio::fs::write(dir.join("snapshots").join("broken.json"), b"{oops")
            .await
            .unwrap();
    }

    let store = FileStore::open(&dir).await.unwrap();
    let active = store.load_active(Utc::now()).await.unwrap();

    assert_eq!(active, vec![live]);
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_file_store_rejects_unsafe_room_id() {
    let dir = scratch_dir("key").await;
    let store = FileStore::open(&dir).await.unwrap();

    let result = store.delete(&rid("../escape")).await;

    assert!(result.is_err());
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

// =========================================================================
// Recovery
// =========================================================================

#[tokio::test]
async fn test_recover_rebuilds_rooms_and_isolates_bad_records() {
    let store = MemoryStore::new();
    let first = record("old-a", &running_state(&["s1", "s2"]), Duration::zero());
    let mut bad = record("old-bad", &running_state(&["x"]), Duration::zero());
    bad.state = "{\"phase\":42".into();
    let second = record("old-b", &running_state(&["t1", "t2", "t3"]), Duration::zero());
    for r in [first, bad, second] {
        store.upsert(r).await.unwrap();
    }

    let mut rebuilt = Vec::new();
    let report = recover(&store, Utc::now(), Duration::minutes(10), |record, state| {
        rebuilt.push((record.room_id.clone(), state));
        rid(&record.room_id.as_str().replace("old-", "new-"))
    })
    .await
    .unwrap();

    // The corrupt record does not stop the pass, whatever order records come in.
    let mut recovered = report.recovered.clone();
    recovered.sort();
    assert_eq!(
        recovered,
        vec![(rid("old-a"), rid("new-a")), (rid("old-b"), rid("new-b"))]
    );
    assert_eq!(report.failed, vec![rid("old-bad")]);
    assert_eq!(rebuilt.len(), 2);

    // Ids preserved verbatim, nobody connected.
    let (_, state) = rebuilt.iter().find(|(id, _)| *id == rid("old-a")).unwrap();
    assert!(state.participant(&SessionId::new("s1")).is_some());
    assert!(state.participants.values().all(|p| !p.connected));
    assert_eq!(state.timer, 17);
    let (_, state) = rebuilt.iter().find(|(id, _)| *id == rid("old-b")).unwrap();
    assert_eq!(state.participants.len(), 3);

    // Every record is spent.
    assert!(store.load_active(Utc::now()).await.unwrap().is_empty());
    assert!(!store.get(&rid("old-bad")).await.unwrap().active);

    for (old, new) in [("old-a", "new-a"), ("old-b", "new-b")] {
        let located = locate(&store, &rid(old), Utc::now()).await.unwrap();
        assert_eq!(located, Some(rid(new)));
    }
}

#[tokio::test]
async fn test_recover_twice_does_not_rebuild_the_same_room() {
    let store = MemoryStore::new();
    store
        .upsert(record("r1", &running_state(&["s1"]), Duration::zero()))
        .await
        .unwrap();

    let first = recover(&store, Utc::now(), Duration::minutes(10), |_, _| rid("r2"))
        .await
        .unwrap();
    let second = recover(&store, Utc::now(), Duration::minutes(10), |_, _| rid("r3"))
        .await
        .unwrap();

    assert_eq!(first.recovered.len(), 1);
    assert!(second.recovered.is_empty());
}

#[tokio::test]
async fn test_locate_follows_chain_to_newest_room() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let ttl = Duration::minutes(10);
    store.put_remap(RoomRemap::new(rid("a"), rid("b"), now, ttl)).await.unwrap();
    store.put_remap(RoomRemap::new(rid("b"), rid("c"), now, ttl)).await.unwrap();

    assert_eq!(locate(&store, &rid("a"), now).await.unwrap(), Some(rid("c")));
    assert_eq!(locate(&store, &rid("b"), now).await.unwrap(), Some(rid("c")));
    assert_eq!(locate(&store, &rid("c"), now).await.unwrap(), None);
}

#[tokio::test]
async fn test_locate_ignores_expired_remap() {
    let store = MemoryStore::new();
    let created = Utc::now() - Duration::hours(1);
    store
        .put_remap(RoomRemap::new(rid("a"), rid("b"), created, Duration::minutes(10)))
        .await
        .unwrap();

    assert_eq!(locate(&store, &rid("a"), Utc::now()).await.unwrap(), None);
}

#[tokio::test]
async fn test_locate_stops_on_cycles() {
    let store = MemoryStore::new();
    let now = Utc::now();
    let ttl = Duration::minutes(10);
    store.put_remap(RoomRemap::new(rid("a"), rid("b"), now, ttl)).await.unwrap();
    store.put_remap(RoomRemap::new(rid("b"), rid("a"), now, ttl)).await.unwrap();

    // Terminates; the exact landing point depends on the hop limit.
    let located = locate(&store, &rid("a"), now).await.unwrap();
    assert!(located.is_none() || located == Some(rid("b")));
}

//! Room actor behavior: join resolution, grace windows, replication,
//! snapshots, and recovery.
//!
//! All tests run on Tokio's paused clock; sleeping auto-advances time, so
//! a 300 second grace window takes no real time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use skirmish_game::{CharacterCatalog, GameAction, GameEvent, GameRules, Participant, Phase, RoomState};
use skirmish_protocol::{AccountId, ResumeTicket, RoomId, SessionId};
use skirmish_room::{
    JoinAccepted, JoinKind, JoinRequest, RoomConfig, RoomError, RoomHandle, RoomInfo, RoomManager,
    RoomOutbound,
};
use skirmish_session::{Identity, SessionError};
use skirmish_snapshot::{MemoryStore, SnapshotRecord, SnapshotStore, decode_state, encode_state};
use tokio::sync::mpsc;

// =========================================================================
// Helpers
// =========================================================================

const GRACE: Duration = Duration::from_secs(300);

type Inbox = mpsc::UnboundedReceiver<RoomOutbound>;

fn identity(account: &str) -> Identity {
    Identity {
        account_id: AccountId::new(account),
        username: account.into(),
        display_name: format!("{account}-name"),
    }
}

fn request(account: &str, resume: Option<ResumeTicket>) -> (JoinRequest, Inbox) {
    let (sender, inbox) = mpsc::unbounded_channel();
    (
        JoinRequest {
            identity: identity(account),
            resume,
            sender,
        },
        inbox,
    )
}

fn ticket(accepted: &JoinAccepted) -> ResumeTicket {
    ResumeTicket {
        session_id: accepted.session_id.clone(),
        reconnect_token: accepted.reconnect_token.clone(),
    }
}

fn manager_with(store: Arc<MemoryStore>) -> RoomManager<MemoryStore> {
    RoomManager::new(
        RoomConfig::default(),
        Arc::new(GameRules::default()),
        Arc::new(CharacterCatalog::builtin()),
        store,
    )
}

fn manager() -> (RoomManager<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (manager_with(Arc::clone(&store)), store)
}

async fn join(room: &RoomHandle, account: &str) -> (JoinAccepted, Inbox) {
    let (req, inbox) = request(account, None);
    let accepted = room.join(req).await.unwrap();
    (accepted, inbox)
}

/// Waits (in paused time) for the first event matching `pred`.
async fn next_event(inbox: &mut Inbox, pred: impl Fn(&GameEvent) -> bool) -> GameEvent {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(120), inbox.recv())
            .await
            .expect("no matching event within 120s")
            .expect("room closed the channel");
        if let RoomOutbound::Event(event) = message {
            if pred(&event) {
                return event;
            }
        }
    }
}

/// Waits for the room to ask this connection to close.
async fn next_close(inbox: &mut Inbox) -> String {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(120), inbox.recv())
            .await
            .expect("no close within 120s")
            .expect("channel dropped without a close");
        if let RoomOutbound::Close { reason } = message {
            return reason;
        }
    }
}

async fn info(room: &RoomHandle) -> RoomInfo {
    room.info().await.unwrap()
}

async fn start_game(room: &RoomHandle, players: &[&JoinAccepted]) {
    for p in players {
        room.action(p.session_id.clone(), p.attachment, GameAction::Ready)
            .await
            .unwrap();
    }
}

// =========================================================================
// Joining
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_join_new_participant_receives_full_state() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();

    let (accepted, mut inbox) = join(&room, "a1").await;

    assert_eq!(accepted.kind, JoinKind::Created);
    assert_eq!(accepted.reconnect_token.len(), 32);
    let GameEvent::State { state } = next_event(&mut inbox, |_| true).await else {
        panic!("first event must be the full state");
    };
    let p = state.participant(&accepted.session_id).unwrap();
    assert_eq!(p.gold, 10);
    assert_eq!(p.shop.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_join_same_account_while_live_is_rejected() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (_first, _inbox) = join(&room, "a1").await;

    let (req, _second_inbox) = request("a1", None);
    let result = room.join(req).await;

    assert!(matches!(
        result,
        Err(RoomError::Session(SessionError::AlreadyConnected(_)))
    ));
    assert_eq!(info(&room).await.participants, 1);
}

#[tokio::test(start_paused = true)]
async fn test_join_after_game_started_is_rejected_for_new_accounts() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (a1, _i1) = join(&room, "a1").await;
    let (a2, _i2) = join(&room, "a2").await;
    start_game(&room, &[&a1, &a2]).await;

    let (req, _inbox) = request("late", None);
    let result = room.join(req).await;

    assert!(matches!(result, Err(RoomError::GameInProgress(_))));
}

#[tokio::test(start_paused = true)]
async fn test_join_or_create_fills_waiting_room_first() {
    let (mut rooms, _) = manager();

    let (req1, _i1) = request("a1", None);
    let (room1, _) = rooms.join_or_create(req1).await.unwrap();
    let (req2, _i2) = request("a2", None);
    let (room2, _) = rooms.join_or_create(req2).await.unwrap();

    assert_eq!(room1.room_id(), room2.room_id());
    assert_eq!(rooms.room_count(), 1);
}

// =========================================================================
// Reconnection
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_resume_within_grace_keeps_session_and_data() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (a1, inbox) = join(&room, "a1").await;
    room.action(
        a1.session_id.clone(),
        a1.attachment,
        GameAction::BuyExperience,
    )
    .await
    .unwrap();

    drop(inbox);
    room.disconnected(a1.session_id.clone(), a1.attachment)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(100)).await;

    let (req, mut inbox) = request("a1", Some(ticket(&a1)));
    let resumed = room.join(req).await.unwrap();

    assert_eq!(resumed.kind, JoinKind::Resumed);
    assert_eq!(resumed.session_id, a1.session_id);
    let GameEvent::State { state } = next_event(&mut inbox, |e| matches!(e, GameEvent::State { .. })).await
    else {
        unreachable!()
    };
    let p = state.participant(&a1.session_id).unwrap();
    assert_eq!(p.gold, 6);
    assert!(p.connected);

    // The window was closed by the rejoin: nothing happens at the old deadline.
    tokio::time::sleep(GRACE).await;
    assert_eq!(info(&room).await.participants, 1);
}

#[tokio::test(start_paused = true)]
async fn test_grace_expiry_removes_participant_and_replicates() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (a1, inbox1) = join(&room, "a1").await;
    let (_a2, mut inbox2) = join(&room, "a2").await;

    drop(inbox1);
    room.disconnected(a1.session_id.clone(), a1.attachment)
        .await
        .unwrap();

    tokio::time::sleep(GRACE - Duration::from_secs(1)).await;
    assert_eq!(info(&room).await.participants, 2, "still inside the window");

    let removed = a1.session_id.clone();
    next_event(&mut inbox2, |e| {
        matches!(e, GameEvent::StatePatch { patch } if patch.removed.contains(&removed))
    })
    .await;
    assert_eq!(info(&room).await.participants, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transfer_rekeys_participant_without_ticket() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (a1, inbox) = join(&room, "a1").await;
    let (_a2, _inbox2) = join(&room, "a2").await;
    drop(inbox);
    room.disconnected(a1.session_id.clone(), a1.attachment)
        .await
        .unwrap();

    let (req, mut inbox) = request("a1", None);
    let moved = room.join(req).await.unwrap();

    assert_eq!(moved.kind, JoinKind::Transferred);
    assert_ne!(moved.session_id, a1.session_id);
    let GameEvent::State { state } = next_event(&mut inbox, |e| matches!(e, GameEvent::State { .. })).await
    else {
        unreachable!()
    };
    assert!(state.participant(&a1.session_id).is_none());
    assert_eq!(
        state.participant(&moved.session_id).unwrap().account_id,
        AccountId::new("a1")
    );

    // The old session's grace window was cancelled by the transfer.
    tokio::time::sleep(GRACE + Duration::from_secs(1)).await;
    assert_eq!(info(&room).await.participants, 2);
}

#[tokio::test(start_paused = true)]
async fn test_transfer_during_combat_keeps_matchups_consistent() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (a1, inbox1) = join(&room, "a1").await;
    let (a2, mut inbox2) = join(&room, "a2").await;
    start_game(&room, &[&a1, &a2]).await;
    next_event(&mut inbox2, |e| matches!(e, GameEvent::Matchups { .. })).await;

    drop(inbox1);
    room.disconnected(a1.session_id.clone(), a1.attachment)
        .await
        .unwrap();
    let (req, mut inbox) = request("a1", None);
    let moved = room.join(req).await.unwrap();

    // The rejoining client gets the matchups with its new id ...
    let GameEvent::Matchups { matchups, .. } =
        next_event(&mut inbox, |e| matches!(e, GameEvent::Matchups { .. })).await
    else {
        unreachable!()
    };
    assert!(matchups[0].involves(&moved.session_id));
    // ... and so does the opponent.
    let GameEvent::Matchups { matchups, .. } =
        next_event(&mut inbox2, |e| matches!(e, GameEvent::Matchups { .. })).await
    else {
        unreachable!()
    };
    assert_eq!(matchups[0].opponent_of(&a2.session_id), Some(&moved.session_id));
}

#[tokio::test(start_paused = true)]
async fn test_stale_disconnect_after_resume_is_ignored() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (a1, inbox) = join(&room, "a1").await;
    drop(inbox);
    room.disconnected(a1.session_id.clone(), a1.attachment)
        .await
        .unwrap();
    let (req, _inbox) = request("a1", Some(ticket(&a1)));
    let resumed = room.join(req).await.unwrap();
    assert_ne!(resumed.attachment, a1.attachment);

    // A late report from the old connection.
    room.disconnected(a1.session_id.clone(), a1.attachment)
        .await
        .unwrap();
    tokio::time::sleep(GRACE + Duration::from_secs(1)).await;

    let info = info(&room).await;
    assert_eq!(info.participants, 1);
    assert_eq!(info.connected, 1);
}

#[tokio::test(start_paused = true)]
async fn test_forged_resume_ticket_falls_back_to_transfer() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (a1, inbox) = join(&room, "a1").await;
    drop(inbox);

    let forged = ResumeTicket {
        session_id: a1.session_id.clone(),
        reconnect_token: "0".repeat(32),
    };
    let (req, _inbox) = request("a1", Some(forged));
    let accepted = room.join(req).await.unwrap();

    assert_eq!(accepted.kind, JoinKind::Transferred);
    assert_ne!(accepted.session_id, a1.session_id);
}

#[tokio::test(start_paused = true)]
async fn test_leave_removes_immediately_and_disposes_empty_room() {
    let (mut rooms, store) = manager();
    let room = rooms.create_room();
    let (a1, _inbox) = join(&room, "a1").await;

    room.leave(a1.session_id.clone(), a1.attachment).await.unwrap();
    room.closed().await;

    assert!(rooms.get(room.room_id()).is_none());
    assert_eq!(rooms.prune(), 1);
    assert!(store.get(room.room_id()).await.is_none());
}

// =========================================================================
// Actions and phases
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_invalid_action_is_rejected_to_sender_only() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (a1, mut inbox1) = join(&room, "a1").await;
    let (_a2, mut inbox2) = join(&room, "a2").await;

    room.action(
        a1.session_id.clone(),
        a1.attachment,
        GameAction::SellCharacter { bench_index: 0 },
    )
    .await
    .unwrap();

    next_event(&mut inbox1, |e| matches!(e, GameEvent::ActionRejected { .. })).await;
    // a2 sees only state traffic; no rejection ever arrives there.
    let rejected = tokio::time::timeout(
        Duration::from_secs(5),
        next_event(&mut inbox2, |e| matches!(e, GameEvent::ActionRejected { .. })),
    )
    .await;
    assert!(rejected.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_phase_clock_runs_preparation_then_combat() {
    let (mut rooms, _) = manager();
    let room = rooms.create_room();
    let (a1, mut inbox) = join(&room, "a1").await;
    let (a2, _inbox2) = join(&room, "a2").await;

    start_game(&room, &[&a1, &a2]).await;
    next_event(&mut inbox, |e| {
        matches!(e, GameEvent::StatePatch { patch } if patch.phase == Some(Phase::Preparation))
    })
    .await;

    let GameEvent::Matchups { round, matchups, bye } =
        next_event(&mut inbox, |e| matches!(e, GameEvent::Matchups { .. })).await
    else {
        unreachable!()
    };
    assert_eq!(round, 1);
    assert_eq!(matchups.len(), 1);
    assert_eq!(bye, None);
    assert_eq!(info(&room).await.phase, Phase::Combat);

    next_event(&mut inbox, |e| {
        matches!(e, GameEvent::StatePatch { patch } if patch.round == Some(2))
    })
    .await;
}

// =========================================================================
// Snapshots and game end
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_running_room_writes_snapshot_and_game_end_deletes_it() {
    let (mut rooms, store) = manager();
    let room = rooms.create_room();
    let (a1, mut inbox1) = join(&room, "a1").await;
    let (a2, mut inbox2) = join(&room, "a2").await;
    start_game(&room, &[&a1, &a2]).await;

    tokio::time::sleep(Duration::from_secs(6)).await;
    let record = store.get(room.room_id()).await.expect("snapshot written");
    assert!(record.active);
    let state = decode_state(&record).unwrap();
    assert_eq!(state.participants.len(), 2);
    assert_eq!(state.phase, Phase::Preparation);

    room.action(a1.session_id.clone(), a1.attachment, GameAction::CancelGame)
        .await
        .unwrap();
    next_event(&mut inbox2, |e| matches!(e, GameEvent::GameCancelled { .. })).await;
    next_close(&mut inbox1).await;
    next_close(&mut inbox2).await;
    room.closed().await;

    assert!(store.get(room.room_id()).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_waiting_room_is_never_snapshotted() {
    let (mut rooms, store) = manager();
    let room = rooms.create_room();
    let (_a1, _inbox) = join(&room, "a1").await;

    tokio::time::sleep(Duration::from_secs(20)).await;

    assert_eq!(store.record_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_keeps_snapshot_for_recovery() {
    let (mut rooms, store) = manager();
    let room = rooms.create_room();
    let (a1, _i1) = join(&room, "a1").await;
    let (a2, _i2) = join(&room, "a2").await;
    start_game(&room, &[&a1, &a2]).await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    rooms.shutdown_all().await;

    let record = store.get(room.room_id()).await.expect("final snapshot");
    assert!(record.active);
}

// =========================================================================
// Recovery
// =========================================================================

fn saved_state() -> RoomState {
    let rules = GameRules::default();
    let mut state = RoomState {
        phase: Phase::Preparation,
        round: 1,
        timer: 25,
        started_with: 2,
        ..RoomState::default()
    };
    for (session, account) in [("old-s1", "a1"), ("old-s2", "a2")] {
        let p = Participant::new(SessionId::new(session), &identity(account), &rules);
        state.participants.insert(p.session_id.clone(), p);
    }
    state
}

async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let old = RoomId::new("oldroom");
    let blob = encode_state(&old, &saved_state()).unwrap();
    store
        .upsert(SnapshotRecord::new(old, blob, Utc::now(), chrono::Duration::minutes(30)))
        .await
        .unwrap();
    store
}

#[tokio::test(start_paused = true)]
async fn test_recover_rebuilds_room_under_new_id_with_remap() {
    let store = seeded_store().await;
    let mut rooms = manager_with(Arc::clone(&store));

    let report = rooms.recover().await.unwrap();

    assert_eq!(report.recovered.len(), 1);
    let (old, new) = report.recovered[0].clone();
    assert_eq!(old, RoomId::new("oldroom"));
    assert_ne!(new, old);
    assert_eq!(rooms.locate(&old).await.unwrap(), Some(new.clone()));
    assert!(!store.get(&old).await.unwrap().active);

    let room = rooms.get(&new).unwrap();
    let info = info(&room).await;
    assert_eq!(info.participants, 2);
    assert_eq!(info.connected, 0);
    assert_eq!(info.previous_room_id, Some(old));
}

#[tokio::test(start_paused = true)]
async fn test_recovered_participant_rejoins_by_account() {
    let store = seeded_store().await;
    let mut rooms = manager_with(store);
    let report = rooms.recover().await.unwrap();
    let room = rooms.get(&report.recovered[0].1).unwrap();

    let (req, mut inbox) = request("a1", None);
    let accepted = room.join(req).await.unwrap();

    assert_eq!(accepted.kind, JoinKind::Transferred);
    let GameEvent::State { state } = next_event(&mut inbox, |e| matches!(e, GameEvent::State { .. })).await
    else {
        unreachable!()
    };
    assert_eq!(state.round, 1);
    assert!(state.participant(&SessionId::new("old-s1")).is_none());
    assert!(state.participant(&SessionId::new("old-s2")).is_some());
}

#[tokio::test(start_paused = true)]
async fn test_recovered_room_without_rejoins_expires_and_closes() {
    let store = seeded_store().await;
    let mut rooms = manager_with(Arc::clone(&store));
    let report = rooms.recover().await.unwrap();
    let new = report.recovered[0].1.clone();
    let room = rooms.get(&new).unwrap();

    tokio::time::sleep(GRACE + Duration::from_secs(5)).await;
    room.closed().await;

    assert!(rooms.get(&new).is_none());
    assert!(store.get(&new).await.is_none());
}

//! End-to-end tests: real WebSocket clients against a running server.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use skirmish::SkirmishServerBuilder;
use skirmish_game::{GameRules, Participant, Phase, RoomState};
use skirmish_protocol::{AccountId, RoomId, SessionId};
use skirmish_session::{DevAuthenticator, Identity};
use skirmish_snapshot::{MemoryStore, SnapshotRecord, SnapshotStore, encode_state};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Starts a server on a random port and returns the address.
async fn start_server(store: Arc<MemoryStore>) -> String {
    let server = SkirmishServerBuilder::new()
        .bind("127.0.0.1:0")
        .build(DevAuthenticator, store)
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    addr
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, payload: Value) {
    let envelope = json!({ "seq": 0, "timestamp": 0, "payload": payload });
    ws.send(Message::Text(envelope.to_string().into()))
        .await
        .expect("send should succeed");
}

async fn send_system(ws: &mut ClientWs, data: Value) {
    send(ws, json!({ "type": "System", "data": data })).await;
}

async fn send_game(ws: &mut ClientWs, data: Value) {
    send(ws, json!({ "type": "Game", "data": data })).await;
}

/// Next payload from the server; `None` once the socket closes.
async fn recv(ws: &mut ClientWs) -> Option<Value> {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("server should answer within 5s")?;
        match msg.ok()? {
            Message::Text(text) => {
                let envelope: Value = serde_json::from_str(&text).expect("server sends JSON");
                return Some(envelope["payload"].clone());
            }
            Message::Close(_) => return None,
            _ => continue,
        }
    }
}

/// Skips payloads until one matches `kind` (`"System"`/`"Game"`) and
/// `data.type`.
async fn recv_kind(ws: &mut ClientWs, kind: &str, data_type: &str) -> Value {
    loop {
        let payload = recv(ws).await.expect("socket closed while waiting");
        if payload["type"] == kind && payload["data"]["type"] == data_type {
            return payload["data"].clone();
        }
    }
}

async fn handshake(ws: &mut ClientWs, token: &str, extra: Value) -> Value {
    let mut data = json!({ "type": "Handshake", "version": 1, "token": token });
    if let (Some(data), Some(extra)) = (data.as_object_mut(), extra.as_object()) {
        data.extend(extra.clone());
    }
    send_system(ws, data).await;
    recv(ws).await.expect("handshake answer")["data"].clone()
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_valid_token_returns_ack_then_state() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;

    let ack = handshake(&mut ws, "a1:Alice", json!({})).await;

    assert_eq!(ack["type"], "HandshakeAck");
    assert_eq!(ack["accountId"], "a1");
    assert_eq!(ack["reconnectToken"].as_str().unwrap().len(), 32);
    let session = ack["sessionId"].as_str().unwrap().to_string();

    let state = recv_kind(&mut ws, "Game", "State").await;
    assert_eq!(state["state"]["phase"], "WAITING");
    assert_eq!(state["state"]["participants"][&session]["displayName"], "Alice");
    assert_eq!(state["state"]["participants"][&session]["gold"], 10);
}

#[tokio::test]
async fn test_handshake_bad_token_returns_401_and_closes() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;

    let reply = handshake(&mut ws, ":nobody", json!({})).await;

    assert_eq!(reply["type"], "Error");
    assert_eq!(reply["code"], 401);
    assert!(recv(&mut ws).await.is_none());
}

#[tokio::test]
async fn test_handshake_wrong_version_returns_400() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;

    send_system(&mut ws, json!({ "type": "Handshake", "version": 99, "token": "a1" })).await;
    let reply = recv(&mut ws).await.unwrap();

    assert_eq!(reply["data"]["type"], "Error");
    assert_eq!(reply["data"]["code"], 400);
}

#[tokio::test]
async fn test_handshake_non_handshake_first_returns_400() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;

    send_system(&mut ws, json!({ "type": "Heartbeat", "clientTime": 1 })).await;
    let reply = recv(&mut ws).await.unwrap();

    assert_eq!(reply["data"]["code"], 400);
}

#[tokio::test]
async fn test_handshake_duplicate_live_account_returns_409() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut first = connect(&addr).await;
    let ack = handshake(&mut first, "a1", json!({})).await;
    let room = ack["roomId"].clone();

    let mut second = connect(&addr).await;
    let reply = handshake(&mut second, "a1", json!({ "roomId": room })).await;

    assert_eq!(reply["type"], "Error");
    assert_eq!(reply["code"], 409);
    // The first connection is untouched.
    send_system(&mut first, json!({ "type": "Heartbeat", "clientTime": 3 })).await;
    recv_kind(&mut first, "System", "HeartbeatAck").await;
}

#[tokio::test]
async fn test_handshake_unknown_room_returns_404() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;

    let reply = handshake(&mut ws, "a1", json!({ "roomId": "nowhere" })).await;

    assert_eq!(reply["type"], "Error");
    assert_eq!(reply["code"], 404);
}

// =========================================================================
// In-room traffic
// =========================================================================

#[tokio::test]
async fn test_heartbeat_echoes_client_time() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, "a1", json!({})).await;

    send_system(&mut ws, json!({ "type": "Heartbeat", "clientTime": 4242 })).await;
    let ack = recv_kind(&mut ws, "System", "HeartbeatAck").await;

    assert_eq!(ack["clientTime"], 4242);
}

#[tokio::test]
async fn test_second_player_without_room_joins_same_waiting_room() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;

    let ack_a = handshake(&mut a, "a1", json!({})).await;
    let ack_b = handshake(&mut b, "a2", json!({})).await;

    assert_eq!(ack_a["roomId"], ack_b["roomId"]);
    // a sees b arrive as a patch.
    let session_b = ack_b["sessionId"].as_str().unwrap().to_string();
    loop {
        let patch = recv_kind(&mut a, "Game", "StatePatch").await;
        if patch["patch"]["participants"].get(&session_b).is_some() {
            break;
        }
    }
}

#[tokio::test]
async fn test_game_action_updates_state_and_rejection_reaches_sender() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;
    let ack = handshake(&mut ws, "a1", json!({})).await;
    let session = ack["sessionId"].as_str().unwrap().to_string();

    send_game(&mut ws, json!({ "type": "buy_experience" })).await;
    loop {
        let patch = recv_kind(&mut ws, "Game", "StatePatch").await;
        if patch["patch"]["participants"][&session]["gold"] == 6 {
            break;
        }
    }

    send_game(&mut ws, json!({ "type": "sell_character", "benchIndex": 0 })).await;
    let rejected = recv_kind(&mut ws, "Game", "ActionRejected").await;
    assert!(rejected["reason"].is_string());
}

#[tokio::test]
async fn test_malformed_game_message_returns_400_and_keeps_connection() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, "a1", json!({})).await;

    send_game(&mut ws, json!({ "type": "teleport" })).await;
    let error = recv_kind(&mut ws, "System", "Error").await;
    assert_eq!(error["code"], 400);

    send_system(&mut ws, json!({ "type": "Heartbeat", "clientTime": 1 })).await;
    recv_kind(&mut ws, "System", "HeartbeatAck").await;
}

// =========================================================================
// Reconnection and leaving
// =========================================================================

#[tokio::test]
async fn test_reconnect_with_resume_ticket_keeps_session() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;
    let ack = handshake(&mut ws, "a1", json!({})).await;
    ws.close(None).await.unwrap();
    drop(ws);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut again = connect(&addr).await;
    let resumed = handshake(
        &mut again,
        "a1",
        json!({
            "roomId": ack["roomId"],
            "resume": {
                "sessionId": ack["sessionId"],
                "reconnectToken": ack["reconnectToken"],
            },
        }),
    )
    .await;

    assert_eq!(resumed["type"], "HandshakeAck");
    assert_eq!(resumed["sessionId"], ack["sessionId"]);
    assert_ne!(resumed["reconnectToken"], ack["reconnectToken"]);
}

#[tokio::test]
async fn test_reconnect_without_ticket_transfers_identity() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;
    let ack = handshake(&mut ws, "a1", json!({})).await;
    ws.close(None).await.unwrap();
    drop(ws);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut again = connect(&addr).await;
    let moved = handshake(&mut again, "a1", json!({ "roomId": ack["roomId"] })).await;

    assert_eq!(moved["type"], "HandshakeAck");
    assert_ne!(moved["sessionId"], ack["sessionId"]);
    let state = recv_kind(&mut again, "Game", "State").await;
    let participants = state["state"]["participants"].as_object().unwrap();
    assert_eq!(participants.len(), 1);
    assert!(participants.contains_key(moved["sessionId"].as_str().unwrap()));
}

#[tokio::test]
async fn test_leave_removes_participant_immediately() {
    let addr = start_server(Arc::new(MemoryStore::new())).await;
    let mut a = connect(&addr).await;
    let mut b = connect(&addr).await;
    let ack_a = handshake(&mut a, "a1", json!({})).await;
    handshake(&mut b, "a2", json!({})).await;

    send_system(&mut a, json!({ "type": "Leave" })).await;

    loop {
        let patch = recv_kind(&mut b, "Game", "StatePatch").await;
        let removed = patch["patch"]["removed"].as_array().cloned().unwrap_or_default();
        if removed.contains(&ack_a["sessionId"]) {
            break;
        }
    }
}

// =========================================================================
// Recovery
// =========================================================================

async fn seeded_store() -> Arc<MemoryStore> {
    let rules = GameRules::default();
    let mut state = RoomState {
        phase: Phase::Preparation,
        round: 2,
        timer: 25,
        started_with: 2,
        ..RoomState::default()
    };
    for (session, account) in [("s-one", "a1"), ("s-two", "a2")] {
        let identity = Identity {
            account_id: AccountId::new(account),
            username: account.into(),
            display_name: account.into(),
        };
        let p = Participant::new(SessionId::new(session), &identity, &rules);
        state.participants.insert(p.session_id.clone(), p);
    }
    let old = RoomId::new("oldroom");
    let blob = encode_state(&old, &state).unwrap();
    let store = Arc::new(MemoryStore::new());
    store
        .upsert(SnapshotRecord::new(old, blob, Utc::now(), chrono::Duration::minutes(30)))
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_handshake_for_recovered_room_redirects() {
    let addr = start_server(seeded_store().await).await;
    let mut ws = connect(&addr).await;

    let moved = handshake(&mut ws, "a1", json!({ "roomId": "oldroom" })).await;

    assert_eq!(moved["type"], "RoomMoved");
    assert_eq!(moved["previous"], "oldroom");
    let current = moved["current"].clone();
    assert!(current.is_string());

    let mut again = connect(&addr).await;
    let ack = handshake(&mut again, "a1", json!({ "roomId": current })).await;
    assert_eq!(ack["type"], "HandshakeAck");
    let state = recv_kind(&mut again, "Game", "State").await;
    assert_eq!(state["state"]["round"], 2);
}

#[tokio::test]
async fn test_locate_room_reports_current_id() {
    let addr = start_server(seeded_store().await).await;
    let mut ws = connect(&addr).await;
    handshake(&mut ws, "a9", json!({})).await;

    send_system(&mut ws, json!({ "type": "LocateRoom", "roomId": "oldroom" })).await;
    let located = recv_kind(&mut ws, "System", "RoomLocated").await;
    assert_eq!(located["previous"], "oldroom");
    assert!(located["current"].is_string());

    send_system(&mut ws, json!({ "type": "LocateRoom", "roomId": "never" })).await;
    let located = recv_kind(&mut ws, "System", "RoomLocated").await;
    assert!(located["current"].is_null());
}

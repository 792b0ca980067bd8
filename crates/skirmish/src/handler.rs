//! Per-connection handler: handshake, join, and message routing.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version
//!   2. Authenticate token → get Identity
//!   3. Join the named room (or any joinable one) → send HandshakeAck
//!   4. Loop: client envelopes go to the room, room events go to the client

use std::sync::Arc;
use std::time::Instant;

use skirmish_game::{GameAction, GameEvent};
use skirmish_protocol::{
    Codec, Envelope, Payload, ProtocolError, ResumeTicket, RoomId, SessionId, SystemMessage,
    PROTOCOL_VERSION,
};
use skirmish_room::{JoinAccepted, JoinRequest, RoomError, RoomHandle, RoomOutbound};
use skirmish_session::{Authenticator, SessionError};
use skirmish_snapshot::SnapshotStore;
use skirmish_transport::{Connection, Frame, WebSocketConnection};
use tokio::sync::mpsc;

use crate::server::ServerState;
use crate::SkirmishError;

type Inbound = Envelope<Payload<GameAction>>;

/// Reports the connection's departure to its room when the handler exits.
///
/// A consented leave has already been delivered, so it sends nothing.
/// Since `Drop` is synchronous, the report is a fire-and-forget task.
struct DepartureGuard {
    room: RoomHandle,
    session: SessionId,
    attachment: u64,
    consented: bool,
}

impl Drop for DepartureGuard {
    fn drop(&mut self) {
        if self.consented {
            return;
        }
        let room = self.room.clone();
        let session = self.session.clone();
        let attachment = self.attachment;
        tokio::spawn(async move {
            // The room may already be gone; nothing to report then.
            let _ = room.disconnected(session, attachment).await;
        });
    }
}

/// Stamps and sends envelopes for one connection.
struct Outbox<'a, C: Codec> {
    conn: &'a WebSocketConnection,
    codec: &'a C,
    seq: u64,
    start: Instant,
}

impl<C: Codec> Outbox<'_, C> {
    fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn send<G: serde::Serialize>(&mut self, payload: Payload<G>) -> Result<(), SkirmishError> {
        let envelope = Envelope {
            seq: self.seq,
            timestamp: self.elapsed_ms(),
            payload,
        };
        self.seq += 1;
        let frame = self.codec.encode(&envelope)?;
        self.conn.send(frame).await?;
        Ok(())
    }

    async fn system(&mut self, message: SystemMessage) -> Result<(), SkirmishError> {
        self.send::<()>(Payload::System(message)).await
    }

    async fn game(&mut self, event: GameEvent) -> Result<(), SkirmishError> {
        self.send(Payload::Game(event)).await
    }

    async fn error(&mut self, code: u16, message: impl Into<String>) -> Result<(), SkirmishError> {
        self.system(SystemMessage::Error {
            code,
            message: message.into(),
        })
        .await
    }
}

/// Maps a refused join to the code sent in `SystemMessage::Error`.
fn join_error_code(error: &RoomError) -> u16 {
    match error {
        RoomError::NotFound(_) => 404,
        RoomError::Session(SessionError::AlreadyConnected(_)) => 409,
        RoomError::Session(SessionError::InvalidResumeTicket) => 403,
        RoomError::Session(_) => 401,
        RoomError::RoomFull { .. } | RoomError::GameInProgress(_) | RoomError::Closing(_) => 403,
        RoomError::Store(_) | RoomError::Unavailable(_) => 503,
    }
}

struct Hello {
    token: String,
    room_id: Option<RoomId>,
    resume: Option<ResumeTicket>,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<A, S, C>(
    conn: WebSocketConnection,
    state: Arc<ServerState<A, S, C>>,
) -> Result<(), SkirmishError>
where
    A: Authenticator,
    S: SnapshotStore,
    C: Codec,
{
    let state: &ServerState<A, S, C> = &state;
    let mut out = Outbox {
        conn: &conn,
        codec: &state.codec,
        seq: 0,
        start: Instant::now(),
    };

    // --- Step 1: Handshake ---
    let hello = match receive_handshake(&conn, state, &mut out).await {
        Ok(hello) => hello,
        Err(e) => {
            let _ = conn.close("handshake failed").await;
            return Err(e);
        }
    };

    // --- Step 2: Authenticate ---
    let identity = match state.auth.authenticate(&hello.token).await {
        Ok(identity) => identity,
        Err(e) => {
            out.error(401, "unauthorized").await?;
            let _ = conn.close("unauthorized").await;
            return Err(e.into());
        }
    };
    let account = identity.account_id.clone();

    // --- Step 3: Join ---
    let (sender, mut events) = mpsc::unbounded_channel();
    let request = JoinRequest {
        identity,
        resume: hello.resume,
        sender,
    };
    let joined = match &hello.room_id {
        Some(room_id) => {
            let handle = state.rooms.lock().await.get(room_id);
            match handle {
                Some(handle) => handle.join(request).await.map(|accepted| (handle, accepted)),
                None => Err(RoomError::NotFound(room_id.clone())),
            }
        }
        None => state.rooms.lock().await.join_or_create(request).await,
    };

    let (room, accepted) = match joined {
        Ok(joined) => joined,
        Err(RoomError::NotFound(previous)) => {
            let current = locate(state, &previous).await;
            match current {
                Some(current) if current != previous => {
                    tracing::info!(%account, %previous, %current, "room moved, redirecting");
                    out.system(SystemMessage::RoomMoved { previous, current }).await?;
                    let _ = conn.close("room moved").await;
                }
                _ => {
                    out.error(404, format!("room {previous} not found")).await?;
                    let _ = conn.close("room not found").await;
                }
            }
            return Ok(());
        }
        Err(e) => {
            tracing::info!(%account, error = %e, "join refused");
            out.error(join_error_code(&e), e.to_string()).await?;
            let _ = conn.close("join refused").await;
            return Err(e.into());
        }
    };

    let JoinAccepted {
        room_id,
        session_id,
        reconnect_token,
        attachment,
        kind,
    } = accepted;
    let mut guard = DepartureGuard {
        room: room.clone(),
        session: session_id.clone(),
        attachment,
        consented: false,
    };
    tracing::info!(%account, %session_id, %room_id, ?kind, "joined");

    let server_time = out.elapsed_ms();
    out.system(SystemMessage::HandshakeAck {
        session_id: session_id.clone(),
        account_id: account,
        room_id,
        reconnect_token,
        server_time,
    })
    .await?;

    // --- Step 4: Message loop ---
    let mut deadline = tokio::time::Instant::now() + state.idle_timeout;
    loop {
        tokio::select! {
            incoming = tokio::time::timeout_at(deadline, conn.recv()) => {
                let frame = match incoming {
                    Ok(Ok(Some(frame))) => frame,
                    Ok(Ok(None)) => {
                        tracing::info!(%session_id, "connection closed");
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::debug!(%session_id, error = %e, "recv error");
                        break;
                    }
                    Err(_) => {
                        tracing::info!(%session_id, "connection idle, dropping");
                        break;
                    }
                };
                deadline = tokio::time::Instant::now() + state.idle_timeout;

                match handle_frame(&frame, state, &room, &mut guard, &mut out).await? {
                    Step::Continue => {}
                    Step::Close => break,
                }
            }
            outbound = events.recv() => match outbound {
                Some(RoomOutbound::Event(event)) => out.game(event).await?,
                Some(RoomOutbound::Close { reason }) => {
                    out.system(SystemMessage::Disconnect { reason: reason.clone() }).await?;
                    let _ = conn.close(&reason).await;
                    break;
                }
                None => {
                    // The room let go of this connection (another socket took
                    // the session over, or the room stopped).
                    tracing::debug!(%session_id, "room released the connection");
                    let _ = conn.close("superseded").await;
                    break;
                }
            },
        }
    }

    // guard drops here → the room hears about an unconsented departure.
    Ok(())
}

/// Reads and validates the first message.
async fn receive_handshake<A, S, C>(
    conn: &WebSocketConnection,
    state: &ServerState<A, S, C>,
    out: &mut Outbox<'_, C>,
) -> Result<Hello, SkirmishError>
where
    A: Authenticator,
    S: SnapshotStore,
    C: Codec,
{
    let frame = match tokio::time::timeout(state.handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(frame))) => frame,
        Ok(Ok(None)) => {
            return Err(ProtocolError::InvalidMessage("connection closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => {
            return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
        }
    };

    let envelope: Inbound = match state.codec.decode(&frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            out.error(400, "expected Handshake").await?;
            return Err(e.into());
        }
    };

    let Payload::System(SystemMessage::Handshake {
        version,
        token,
        room_id,
        resume,
    }) = envelope.payload
    else {
        out.error(400, "expected Handshake").await?;
        return Err(ProtocolError::InvalidMessage("first message must be Handshake".into()).into());
    };

    if version != PROTOCOL_VERSION {
        out.error(
            400,
            format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
        )
        .await?;
        return Err(ProtocolError::InvalidMessage("protocol version mismatch".into()).into());
    }

    Ok(Hello {
        token,
        room_id,
        resume,
    })
}

enum Step {
    Continue,
    Close,
}

/// Routes one client frame.
async fn handle_frame<A, S, C>(
    frame: &Frame,
    state: &ServerState<A, S, C>,
    room: &RoomHandle,
    guard: &mut DepartureGuard,
    out: &mut Outbox<'_, C>,
) -> Result<Step, SkirmishError>
where
    A: Authenticator,
    S: SnapshotStore,
    C: Codec,
{
    let envelope: Inbound = match state.codec.decode(frame) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!(session_id = %guard.session, error = %e, "undecodable frame");
            out.error(400, format!("invalid message: {e}")).await?;
            return Ok(Step::Continue);
        }
    };

    match envelope.payload {
        Payload::Game(action) => {
            if room
                .action(guard.session.clone(), guard.attachment, action)
                .await
                .is_err()
            {
                out.error(503, "room unavailable").await?;
                return Ok(Step::Close);
            }
        }

        Payload::System(SystemMessage::Heartbeat { client_time }) => {
            let server_time = out.elapsed_ms();
            out.system(SystemMessage::HeartbeatAck {
                client_time,
                server_time,
            })
            .await?;
        }

        Payload::System(SystemMessage::LocateRoom { room_id }) => {
            let current = locate(state, &room_id).await;
            out.system(SystemMessage::RoomLocated {
                previous: room_id,
                current,
            })
            .await?;
        }

        Payload::System(SystemMessage::Leave) => {
            if let Err(e) = room.leave(guard.session.clone(), guard.attachment).await {
                tracing::debug!(session_id = %guard.session, error = %e, "leave after room stopped");
            }
            guard.consented = true;
            tracing::info!(session_id = %guard.session, "left");
            let _ = out.conn.close("left").await;
            return Ok(Step::Close);
        }

        Payload::System(SystemMessage::Disconnect { reason }) => {
            tracing::info!(session_id = %guard.session, %reason, "client disconnecting");
            return Ok(Step::Close);
        }

        Payload::System(_) => {
            tracing::debug!(session_id = %guard.session, "ignoring unexpected system message");
        }
    }

    Ok(Step::Continue)
}

/// Where `room_id` lives now, or `None`. Store failures count as `None`.
async fn locate<A, S, C>(state: &ServerState<A, S, C>, room_id: &RoomId) -> Option<RoomId>
where
    A: Authenticator,
    S: SnapshotStore,
    C: Codec,
{
    match state.rooms.lock().await.locate(room_id).await {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(%room_id, error = %e, "room lookup failed");
            None
        }
    }
}

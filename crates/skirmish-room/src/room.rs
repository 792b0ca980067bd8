//! Room actor: an isolated Tokio task that owns one game.
//!
//! Everything that touches a room (joins, actions, disconnects, grace
//! expiries, clock ticks, snapshot timer) goes through one `select!` loop,
//! so the game itself needs no locks. After every step the actor diffs the
//! game state against the last copy it broadcast and sends a `StatePatch`
//! if anything changed.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use skirmish_game::{Game, GameAction, GameEvent, Outbound, Phase, RoomState, StateDelta};
use skirmish_protocol::{Recipient, ResumeTicket, RoomId, SessionId};
use skirmish_session::{
    Identity, JoinResolution, LivenessProbe, ReconnectOutcome, ReconnectionManager, ResumeTokens,
    generate_session_id, resolve_join,
};
use skirmish_snapshot::{SnapshotRecord, SnapshotStore, encode_state};
use skirmish_tick::TickScheduler;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::config::wall_clock;
use crate::{RoomConfig, RoomError};

/// An outbound message from the room actor to a connection handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomOutbound {
    /// A game event to forward to the client.
    Event(GameEvent),
    /// The room is done with this connection; close it.
    Close { reason: String },
}

/// Channel for delivering outbound messages to one connection.
///
/// Unbounded so a slow client can never stall the room. Whether it is
/// still open is also the room's liveness signal for the session.
pub type ParticipantSender = mpsc::UnboundedSender<RoomOutbound>;

/// An authenticated connection asking to enter a room.
#[derive(Debug, Clone)]
pub struct JoinRequest {
    pub identity: Identity,
    /// Present when the client is coming back after a drop.
    pub resume: Option<ResumeTicket>,
    pub sender: ParticipantSender,
}

/// How a successful join attached to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Created,
    Resumed,
    Transferred,
}

/// The result of a successful join.
#[derive(Debug, Clone)]
pub struct JoinAccepted {
    pub room_id: RoomId,
    pub session_id: SessionId,
    /// Goes back to the client inside its resume ticket.
    pub reconnect_token: String,
    /// Identifies this connection's attachment to the session. Actions,
    /// leaves and disconnects carrying an older attachment are ignored.
    pub attachment: u64,
    pub kind: JoinKind,
}

/// Room metadata (not the game state itself).
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    /// The room this one was recovered from, if any.
    pub previous_room_id: Option<RoomId>,
    pub phase: Phase,
    pub round: u32,
    pub participants: usize,
    /// Participants with an open connection right now.
    pub connected: usize,
    pub max_participants: usize,
}

impl RoomInfo {
    /// Whether a new participant could be admitted.
    pub fn is_joinable(&self) -> bool {
        self.phase == Phase::Waiting && self.participants < self.max_participants
    }
}

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        request: JoinRequest,
        reply: oneshot::Sender<Result<JoinAccepted, RoomError>>,
    },
    Action {
        session: SessionId,
        attachment: u64,
        action: GameAction,
    },
    /// Consented leave: remove immediately.
    Leave { session: SessionId, attachment: u64 },
    /// The connection dropped without a leave: open a grace window.
    Disconnected { session: SessionId, attachment: u64 },
    GraceExpired { session: SessionId, generation: u64 },
    Info { reply: oneshot::Sender<RoomInfo> },
    /// Server shutdown: keep the snapshot for recovery.
    Shutdown,
}

/// Handle to a running room actor. Cheap to clone.
#[derive(Clone)]
pub struct RoomHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Resolves once the actor has stopped and its last store write has
    /// finished.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }

    async fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    /// Asks the room to admit a connection.
    ///
    /// On success the room has already queued the full state (and, in
    /// COMBAT, the matchups) on `request.sender`.
    pub async fn join(&self, request: JoinRequest) -> Result<JoinAccepted, RoomError> {
        let (reply, response) = oneshot::channel();
        self.send(RoomCommand::Join { request, reply }).await?;
        response
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))?
    }

    /// Delivers a player action (fire-and-forget; rejections come back
    /// as `ActionRejected` events).
    pub async fn action(
        &self,
        session: SessionId,
        attachment: u64,
        action: GameAction,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Action {
            session,
            attachment,
            action,
        })
        .await
    }

    /// Consented leave.
    pub async fn leave(&self, session: SessionId, attachment: u64) -> Result<(), RoomError> {
        self.send(RoomCommand::Leave { session, attachment }).await
    }

    /// Reports that a connection dropped without leaving.
    pub async fn disconnected(
        &self,
        session: SessionId,
        attachment: u64,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Disconnected { session, attachment }).await
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply, response) = oneshot::channel();
        self.send(RoomCommand::Info { reply }).await?;
        response
            .await
            .map_err(|_| RoomError::Unavailable(self.room_id.clone()))
    }

    /// Stops the room without deleting its snapshot.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown).await
    }
}

struct Attached {
    sender: ParticipantSender,
    attachment: u64,
}

/// Liveness straight from the outbound channels.
struct OpenChannels<'a>(&'a HashMap<SessionId, Attached>);

impl LivenessProbe for OpenChannels<'_> {
    fn is_live(&self, session: &SessionId) -> bool {
        self.0
            .get(session)
            .is_some_and(|attached| !attached.sender.is_closed())
    }
}

/// What the loop does after a step.
enum Flow {
    Continue,
    /// Clean end: delete the snapshot and stop.
    Dispose,
    /// Server shutdown: persist and stop.
    Shutdown,
}

/// The internal room actor state. Runs inside a Tokio task.
struct RoomActor<S: SnapshotStore> {
    room_id: RoomId,
    previous_room_id: Option<RoomId>,
    config: RoomConfig,
    game: Game,
    /// The state as of the last broadcast.
    replicated: RoomState,
    senders: HashMap<SessionId, Attached>,
    next_attachment: u64,
    tokens: ResumeTokens,
    reconnect: ReconnectionManager,
    scheduler: TickScheduler,
    store: Arc<S>,
    /// The latest spawned store write; each write waits for the previous.
    pending_write: Option<JoinHandle<()>>,
    /// Set on entering GAME_END.
    close_at: Option<Instant>,
    receiver: mpsc::Receiver<RoomCommand>,
    /// Grace timers send their expiry back through this.
    commands: mpsc::WeakSender<RoomCommand>,
}

impl<S: SnapshotStore> RoomActor<S> {
    async fn run(mut self) {
        tracing::info!(
            participants = self.game.participant_count(),
            previous = ?self.previous_room_id,
            "room actor started"
        );

        let period = self.config.snapshot_interval;
        let mut snapshots = tokio::time::interval_at(Instant::now() + period, period);
        snapshots.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let close_at = self.close_at;
            let flow = tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => Flow::Shutdown,
                },
                tick = self.scheduler.wait_for_tick() => {
                    let out = self.game.advance(tick.dt);
                    self.dispatch(out);
                    self.scheduler.record_tick_end();
                    Flow::Continue
                }
                _ = snapshots.tick() => {
                    self.write_snapshot();
                    Flow::Continue
                }
                () = tokio::time::sleep_until(close_at.unwrap_or_else(Instant::now)), if close_at.is_some() => {
                    Flow::Dispose
                }
            };

            self.after_step();
            match flow {
                Flow::Continue => {}
                Flow::Dispose => {
                    self.close_all("room closed");
                    self.delete_snapshot();
                    break;
                }
                Flow::Shutdown => {
                    self.write_snapshot();
                    self.close_all("server shutting down");
                    break;
                }
            }
        }

        self.reconnect.cancel_all();
        if let Some(write) = self.pending_write.take() {
            let _ = write.await;
        }
        tracing::info!("room actor stopped");
    }

    fn handle_command(&mut self, command: RoomCommand) -> Flow {
        match command {
            RoomCommand::Join { request, reply } => {
                let result = self.handle_join(request);
                let _ = reply.send(result);
                Flow::Continue
            }
            RoomCommand::Action {
                session,
                attachment,
                action,
            } => {
                self.handle_action(&session, attachment, action);
                Flow::Continue
            }
            RoomCommand::Leave { session, attachment } => self.handle_leave(&session, attachment),
            RoomCommand::Disconnected { session, attachment } => {
                self.handle_disconnect(&session, attachment);
                Flow::Continue
            }
            RoomCommand::GraceExpired {
                session,
                generation,
            } => self.handle_expiry(&session, generation),
            RoomCommand::Info { reply } => {
                let _ = reply.send(self.info());
                Flow::Continue
            }
            RoomCommand::Shutdown => Flow::Shutdown,
        }
    }

    // -----------------------------------------------------------------
    // Joins and departures
    // -----------------------------------------------------------------

    fn handle_join(&mut self, request: JoinRequest) -> Result<JoinAccepted, RoomError> {
        if self.close_at.is_some() {
            return Err(RoomError::Closing(self.room_id.clone()));
        }
        let JoinRequest {
            identity,
            resume,
            sender,
        } = request;

        // An unverifiable ticket is dropped; the account can still be
        // matched by identity transfer.
        let incoming = match resume {
            Some(ticket) if self.tokens.verify(&ticket) => ticket.session_id,
            Some(ticket) => {
                tracing::debug!(session = %ticket.session_id, "resume ticket not recognised");
                generate_session_id()
            }
            None => generate_session_id(),
        };

        let resolution = resolve_join(
            &incoming,
            &identity.account_id,
            self.game.state(),
            &OpenChannels(&self.senders),
        )
        .inspect_err(|e| tracing::info!(account = %identity.account_id, error = %e, "join refused"))?;

        let (session, kind, out) = match resolution {
            JoinResolution::Resume(session) => {
                self.reconnect.rejoin(&session);
                self.game.set_connected(&session, true);
                (session, JoinKind::Resumed, Vec::new())
            }
            JoinResolution::Transfer { from, to } => {
                self.reconnect.rejoin(&from);
                self.tokens.revoke(&from);
                self.senders.remove(&from);
                let out = self.game.transfer(&from, &to);
                (to, JoinKind::Transferred, out)
            }
            JoinResolution::Create(session) => {
                self.game
                    .add_participant(session.clone(), &identity)
                    .map_err(|e| RoomError::from_join(&self.room_id, e))?;
                (session, JoinKind::Created, Vec::new())
            }
        };

        self.next_attachment += 1;
        let attachment = self.next_attachment;
        self.senders.insert(session.clone(), Attached { sender, attachment });
        let reconnect_token = self.tokens.issue(&session);

        let welcome = self.game.resume_events(&session);
        self.dispatch(welcome);
        self.dispatch(out);

        tracing::info!(
            %session,
            account = %identity.account_id,
            ?kind,
            participants = self.game.participant_count(),
            "participant joined"
        );
        Ok(JoinAccepted {
            room_id: self.room_id.clone(),
            session_id: session,
            reconnect_token,
            attachment,
            kind,
        })
    }

    fn is_current(&self, session: &SessionId, attachment: u64) -> bool {
        self.senders
            .get(session)
            .is_some_and(|attached| attached.attachment == attachment)
    }

    fn handle_action(&mut self, session: &SessionId, attachment: u64, action: GameAction) {
        if !self.is_current(session, attachment) {
            tracing::debug!(%session, "action from a detached connection, ignoring");
            return;
        }
        let name = action.name();
        match self.game.apply(session, action) {
            Ok(out) => self.dispatch(out),
            Err(error) => {
                tracing::debug!(%session, action = name, %error, "action rejected");
                self.dispatch(vec![(
                    Recipient::Session(session.clone()),
                    GameEvent::ActionRejected {
                        reason: error.to_string(),
                    },
                )]);
            }
        }
    }

    fn handle_leave(&mut self, session: &SessionId, attachment: u64) -> Flow {
        if !self.is_current(session, attachment) {
            return Flow::Continue;
        }
        self.senders.remove(session);
        self.reconnect.cancel(session);
        self.tokens.revoke(session);
        let out = self.game.remove_participant(session);
        self.dispatch(out);
        tracing::info!(%session, "participant left");
        self.dispose_if_empty()
    }

    fn handle_disconnect(&mut self, session: &SessionId, attachment: u64) {
        if !self.is_current(session, attachment) {
            tracing::debug!(%session, attachment, "stale disconnect, ignoring");
            return;
        }
        self.senders.remove(session);
        self.game.set_connected(session, false);
        if self.game.is_finished() {
            return;
        }
        self.open_grace(session);
    }

    fn open_grace(&mut self, session: &SessionId) {
        let Some(account) = self
            .game
            .state()
            .participant(session)
            .map(|p| p.account_id.clone())
        else {
            return;
        };
        let Some(commands) = self.commands.upgrade() else {
            tracing::debug!(%session, "room has no handles left, skipping grace window");
            return;
        };
        self.reconnect
            .open(session.clone(), account, commands, |session, generation| {
                RoomCommand::GraceExpired {
                    session,
                    generation,
                }
            });
    }

    fn handle_expiry(&mut self, session: &SessionId, generation: u64) -> Flow {
        let Some(ReconnectOutcome::Expired { session, account }) =
            self.reconnect.expire(session, generation)
        else {
            return Flow::Continue;
        };
        self.tokens.revoke(&session);
        let out = self.game.remove_participant(&session);
        self.dispatch(out);
        tracing::info!(%session, %account, "participant removed after grace window");
        self.dispose_if_empty()
    }

    fn dispose_if_empty(&self) -> Flow {
        if self.game.participant_count() == 0 {
            tracing::info!("room is empty");
            Flow::Dispose
        } else {
            Flow::Continue
        }
    }

    // -----------------------------------------------------------------
    // Replication and delivery
    // -----------------------------------------------------------------

    fn after_step(&mut self) {
        let delta = StateDelta::between(&self.replicated, self.game.state());
        if !delta.is_empty() {
            self.replicated = self.game.state().clone();
            self.dispatch(vec![(
                Recipient::All,
                GameEvent::StatePatch { patch: delta },
            )]);
        }

        if self.game.is_finished() && self.close_at.is_none() {
            self.close_at = Some(Instant::now() + self.config.close_delay);
            self.reconnect.cancel_all();
            self.delete_snapshot();
            tracing::info!(delay = ?self.config.close_delay, "game ended, closing room");
        }
    }

    fn dispatch(&self, out: Outbound) {
        for (recipient, event) in out {
            for (session, attached) in &self.senders {
                if recipient.includes(session) {
                    let _ = attached.sender.send(RoomOutbound::Event(event.clone()));
                }
            }
        }
    }

    fn close_all(&mut self, reason: &str) {
        for (_, attached) in self.senders.drain() {
            let _ = attached.sender.send(RoomOutbound::Close {
                reason: reason.to_string(),
            });
        }
    }

    fn info(&self) -> RoomInfo {
        let state = self.game.state();
        RoomInfo {
            room_id: self.room_id.clone(),
            previous_room_id: self.previous_room_id.clone(),
            phase: state.phase,
            round: state.round,
            participants: state.participants.len(),
            connected: self
                .senders
                .values()
                .filter(|attached| !attached.sender.is_closed())
                .count(),
            max_participants: self.game.rules().max_participants,
        }
    }

    // -----------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------

    /// Queues `write` behind the previous store write.
    fn chain_write<F>(&mut self, write: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let previous = self.pending_write.take();
        self.pending_write = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            write.await;
        }));
    }

    fn write_snapshot(&mut self) {
        let state = self.game.state();
        if !state.phase.is_timed() || state.participants.is_empty() {
            return;
        }
        let blob = match encode_state(&self.room_id, state) {
            Ok(blob) => blob,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode snapshot");
                return;
            }
        };
        let record = SnapshotRecord::new(
            self.room_id.clone(),
            blob,
            Utc::now(),
            wall_clock(self.config.snapshot_ttl),
        )
        .with_previous(self.previous_room_id.clone());

        let store = Arc::clone(&self.store);
        self.chain_write(async move {
            let room_id = record.room_id.clone();
            match store.upsert(record).await {
                Ok(true) => tracing::trace!(%room_id, "snapshot written"),
                Ok(false) => tracing::debug!(%room_id, "snapshot superseded"),
                Err(e) => tracing::warn!(%room_id, error = %e, "snapshot write failed"),
            }
        });
    }

    fn delete_snapshot(&mut self) {
        let store = Arc::clone(&self.store);
        let room_id = self.room_id.clone();
        self.chain_write(async move {
            if let Err(e) = store.delete(&room_id).await {
                tracing::warn!(%room_id, error = %e, "snapshot delete failed");
            }
        });
    }
}

/// Spawns a room actor for `game` and returns a handle to it.
///
/// A room with a `previous_room_id` is a recovered one: nobody is
/// connected to it yet, so every participant starts inside a grace window.
pub(crate) fn spawn_room<S: SnapshotStore>(
    room_id: RoomId,
    previous_room_id: Option<RoomId>,
    game: Game,
    config: RoomConfig,
    store: Arc<S>,
) -> RoomHandle {
    let (tx, rx) = mpsc::channel(config.channel_size);

    let mut actor = RoomActor {
        room_id: room_id.clone(),
        previous_room_id,
        replicated: game.state().clone(),
        game,
        senders: HashMap::new(),
        next_attachment: 0,
        tokens: ResumeTokens::new(),
        reconnect: ReconnectionManager::new(config.session.reconnect_grace),
        scheduler: TickScheduler::new(config.tick.clone()),
        store,
        pending_write: None,
        close_at: None,
        receiver: rx,
        commands: tx.downgrade(),
        config,
    };

    if actor.previous_room_id.is_some() {
        let sessions: Vec<SessionId> = actor.game.state().participants.keys().cloned().collect();
        for session in &sessions {
            actor.open_grace(session);
        }
    }

    let span = tracing::info_span!("room", room_id = %room_id);
    tokio::spawn(actor.run().instrument(span));

    RoomHandle {
        room_id,
        sender: tx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_info_joinable_only_while_waiting_with_space() {
        let mut info = RoomInfo {
            room_id: RoomId::new("r"),
            previous_room_id: None,
            phase: Phase::Waiting,
            round: 0,
            participants: 7,
            connected: 7,
            max_participants: 8,
        };
        assert!(info.is_joinable());

        info.participants = 8;
        assert!(!info.is_joinable());

        info.participants = 2;
        info.phase = Phase::Combat;
        assert!(!info.is_joinable());
    }
}

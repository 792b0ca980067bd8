//! Room manager: creates, tracks, recovers, and routes joins to rooms.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use skirmish_game::{CharacterCatalog, Game, GameRules, RoomState};
use skirmish_protocol::RoomId;
use skirmish_snapshot::{RecoveryReport, SnapshotStore, StoreError};

use crate::config::wall_clock;
use crate::room::spawn_room;
use crate::{JoinAccepted, JoinRequest, RoomConfig, RoomError, RoomHandle, RoomInfo};

const ROOM_ID_LEN: usize = 8;

fn generate_room_id() -> RoomId {
    let id: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(ROOM_ID_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    RoomId::new(id)
}

/// Tracks every running room.
///
/// Holds only handles; each room's state lives in its own actor task.
/// Rooms stop by themselves when they empty out or their game ends, and
/// [`prune`](Self::prune) forgets their handles.
pub struct RoomManager<S: SnapshotStore> {
    rooms: HashMap<RoomId, RoomHandle>,
    config: RoomConfig,
    rules: Arc<GameRules>,
    catalog: Arc<CharacterCatalog>,
    store: Arc<S>,
}

impl<S: SnapshotStore> RoomManager<S> {
    pub fn new(
        config: RoomConfig,
        rules: Arc<GameRules>,
        catalog: Arc<CharacterCatalog>,
        store: Arc<S>,
    ) -> Self {
        Self {
            rooms: HashMap::new(),
            config: config.validated(),
            rules,
            catalog,
            store,
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    fn fresh_room_id(&self) -> RoomId {
        loop {
            let id = generate_room_id();
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }

    /// Spawns an empty room in WAITING.
    pub fn create_room(&mut self) -> RoomHandle {
        let room_id = self.fresh_room_id();
        let game = Game::new(Arc::clone(&self.rules), Arc::clone(&self.catalog));
        let handle = spawn_room(
            room_id.clone(),
            None,
            game,
            self.config.clone(),
            Arc::clone(&self.store),
        );
        self.rooms.insert(room_id.clone(), handle.clone());
        tracing::info!(%room_id, "room created");
        handle
    }

    /// Spawns a room under a new id from a recovered state.
    pub fn restore_room(&mut self, previous: RoomId, state: RoomState) -> RoomHandle {
        let room_id = self.fresh_room_id();
        let game = Game::restore(state, Arc::clone(&self.rules), Arc::clone(&self.catalog));
        let handle = spawn_room(
            room_id.clone(),
            Some(previous.clone()),
            game,
            self.config.clone(),
            Arc::clone(&self.store),
        );
        self.rooms.insert(room_id.clone(), handle.clone());
        tracing::info!(%room_id, %previous, "room restored");
        handle
    }

    /// The handle for a running room.
    pub fn get(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms
            .get(room_id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// Joins a specific room.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] if no such room is running; otherwise
    /// whatever the room refuses the join with.
    pub async fn join(
        &self,
        room_id: &RoomId,
        request: JoinRequest,
    ) -> Result<(RoomHandle, JoinAccepted), RoomError> {
        let handle = self
            .get(room_id)
            .ok_or_else(|| RoomError::NotFound(room_id.clone()))?;
        let accepted = handle.join(request).await?;
        Ok((handle, accepted))
    }

    /// Joins the first waiting room with space, creating one if none
    /// accepts.
    pub async fn join_or_create(
        &mut self,
        request: JoinRequest,
    ) -> Result<(RoomHandle, JoinAccepted), RoomError> {
        self.prune();

        // A room can fill up between `info` and `join`; keep looking then.
        for handle in self.rooms.values() {
            let Ok(info) = handle.info().await else {
                continue;
            };
            if !info.is_joinable() {
                continue;
            }
            match handle.join(request.clone()).await {
                Ok(accepted) => return Ok((handle.clone(), accepted)),
                Err(e) if e.is_room_specific() => continue,
                Err(e) => return Err(e),
            }
        }

        let handle = self.create_room();
        let accepted = handle.join(request).await?;
        Ok((handle, accepted))
    }

    /// Rebuilds every room with a recoverable snapshot.
    ///
    /// # Errors
    /// Only if the store cannot list its records. Individual bad records
    /// are reported in [`RecoveryReport::failed`].
    pub async fn recover(&mut self) -> Result<RecoveryReport, StoreError> {
        let store = Arc::clone(&self.store);
        let remap_ttl = wall_clock(self.config.remap_ttl);
        let report = skirmish_snapshot::recover(&*store, Utc::now(), remap_ttl, |record, state| {
            self.restore_room(record.room_id.clone(), state)
                .room_id()
                .clone()
        })
        .await?;
        tracing::info!(
            recovered = report.recovered.len(),
            failed = report.failed.len(),
            "recovery complete"
        );
        Ok(report)
    }

    /// Where `room_id` lives now: itself if it is running, the newest
    /// room it was recovered into if that one is running, else `None`.
    pub async fn locate(&self, room_id: &RoomId) -> Result<Option<RoomId>, StoreError> {
        if self.get(room_id).is_some() {
            return Ok(Some(room_id.clone()));
        }
        let found = skirmish_snapshot::locate(&*self.store, room_id, Utc::now()).await?;
        Ok(found.filter(|current| self.get(current).is_some()))
    }

    /// Forgets handles of rooms that have stopped. Returns how many.
    pub fn prune(&mut self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|room_id, handle| {
            let closed = handle.is_closed();
            if closed {
                tracing::debug!(%room_id, "forgetting stopped room");
            }
            !closed
        });
        before - self.rooms.len()
    }

    /// Drops expired snapshot records and remaps from the store.
    pub async fn prune_store(&self) -> Result<usize, StoreError> {
        let pruned = self.store.prune(Utc::now()).await?;
        if pruned > 0 {
            tracing::info!(pruned, "expired snapshots and remaps removed");
        }
        Ok(pruned)
    }

    /// Info for every running room. Rooms that fail to answer are skipped.
    pub async fn list(&self) -> Vec<RoomInfo> {
        let mut infos = Vec::with_capacity(self.rooms.len());
        for handle in self.rooms.values() {
            if let Ok(info) = handle.info().await {
                infos.push(info);
            }
        }
        infos
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    /// Stops every room, keeping their snapshots for the next start, and
    /// waits for them to finish.
    pub async fn shutdown_all(&mut self) {
        let handles: Vec<RoomHandle> = self.rooms.drain().map(|(_, handle)| handle).collect();
        for handle in &handles {
            let _ = handle.shutdown().await;
        }
        for handle in &handles {
            handle.closed().await;
        }
        tracing::info!(rooms = handles.len(), "all rooms stopped");
    }
}

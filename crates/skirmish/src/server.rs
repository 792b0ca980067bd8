//! `SkirmishServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → session → room.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use skirmish_game::{CharacterCatalog, GameRules};
use skirmish_protocol::{Codec, JsonCodec, RoomId};
use skirmish_room::{RoomConfig, RoomManager};
use skirmish_session::{Authenticator, DevAuthenticator, Identity, SessionError, TokenTable};
use skirmish_snapshot::{
    FileStore, MemoryStore, RecoveryReport, RoomRemap, SnapshotRecord, SnapshotStore, StoreError,
};
use skirmish_transport::{Connection, Transport, WebSocketTransport};
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::ServerConfig;
use crate::handler::handle_connection;
use crate::SkirmishError;

/// How long a new connection has to send its handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How often stopped rooms are forgotten and expired records pruned.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared server state passed to each connection handler task.
pub(crate) struct ServerState<A: Authenticator, S: SnapshotStore, C: Codec> {
    pub(crate) rooms: Mutex<RoomManager<S>>,
    pub(crate) auth: A,
    pub(crate) codec: C,
    pub(crate) handshake_timeout: Duration,
    pub(crate) idle_timeout: Duration,
}

// ---------------------------------------------------------------------------
// Authenticator selection
// ---------------------------------------------------------------------------

/// The authenticator picked by [`ServerConfig`].
#[derive(Debug)]
pub enum ServerAuth {
    Tokens(TokenTable),
    Dev(DevAuthenticator),
}

impl ServerAuth {
    /// A token file wins over dev auth.
    ///
    /// # Errors
    /// [`SkirmishError::NoAuthenticator`] if neither is configured, or the
    /// token file's read/parse error.
    pub fn from_config(config: &ServerConfig) -> Result<Self, SkirmishError> {
        if let Some(path) = &config.token_file {
            let table = TokenTable::from_json_file(path)?;
            tracing::info!(path = %path.display(), tokens = table.len(), "token table loaded");
            return Ok(Self::Tokens(table));
        }
        if config.dev_auth {
            tracing::warn!("development authentication enabled; tokens are trusted as-is");
            return Ok(Self::Dev(DevAuthenticator));
        }
        Err(SkirmishError::NoAuthenticator)
    }
}

impl Authenticator for ServerAuth {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        match self {
            Self::Tokens(table) => table.authenticate(token).await,
            Self::Dev(dev) => dev.authenticate(token).await,
        }
    }
}

/// The snapshot store picked by [`ServerConfig`].
#[derive(Debug)]
pub enum ServerStore {
    File(FileStore),
    Memory(MemoryStore),
}

impl ServerStore {
    pub async fn from_config(config: &ServerConfig) -> Result<Self, SkirmishError> {
        match &config.data_dir {
            Some(dir) => Ok(Self::File(FileStore::open(dir).await?)),
            None => {
                tracing::warn!("no data directory; snapshots will not survive a restart");
                Ok(Self::Memory(MemoryStore::new()))
            }
        }
    }
}

macro_rules! delegate_store {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            ServerStore::File($store) => $call.await,
            ServerStore::Memory($store) => $call.await,
        }
    };
}

impl SnapshotStore for ServerStore {
    async fn upsert(&self, record: SnapshotRecord) -> Result<bool, StoreError> {
        delegate_store!(self, store => store.upsert(record))
    }

    async fn delete(&self, room_id: &RoomId) -> Result<(), StoreError> {
        delegate_store!(self, store => store.delete(room_id))
    }

    async fn load_active(&self, now: DateTime<Utc>) -> Result<Vec<SnapshotRecord>, StoreError> {
        delegate_store!(self, store => store.load_active(now))
    }

    async fn deactivate(&self, room_id: &RoomId) -> Result<(), StoreError> {
        delegate_store!(self, store => store.deactivate(room_id))
    }

    async fn put_remap(&self, remap: RoomRemap) -> Result<(), StoreError> {
        delegate_store!(self, store => store.put_remap(remap))
    }

    async fn remap(&self, old: &RoomId) -> Result<Option<RoomRemap>, StoreError> {
        delegate_store!(self, store => store.remap(old))
    }

    async fn prune(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        delegate_store!(self, store => store.prune(now))
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring and starting a Skirmish server.
///
/// ```rust,ignore
/// let server = SkirmishServer::builder()
///     .bind("0.0.0.0:8080")
///     .build(DevAuthenticator, Arc::new(MemoryStore::new()))
///     .await?;
/// server.run().await
/// ```
pub struct SkirmishServerBuilder {
    bind_addr: String,
    rules: GameRules,
    catalog: CharacterCatalog,
    room_config: RoomConfig,
}

impl SkirmishServerBuilder {
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            rules: GameRules::default(),
            catalog: CharacterCatalog::builtin(),
            room_config: RoomConfig::default(),
        }
    }

    /// Starts from a loaded [`ServerConfig`], reading its catalog file if
    /// one is set.
    pub fn from_config(config: &ServerConfig) -> Result<Self, SkirmishError> {
        let catalog = match &config.catalog_file {
            Some(path) => {
                let catalog = CharacterCatalog::from_json_file(path)?;
                tracing::info!(path = %path.display(), characters = catalog.len(), "catalog loaded");
                catalog
            }
            None => CharacterCatalog::builtin(),
        };
        Ok(Self {
            bind_addr: config.bind_addr.clone(),
            rules: config.rules.clone(),
            catalog,
            room_config: config.room.clone(),
        })
    }

    /// Sets the address to bind to. Port 0 lets the OS pick.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    pub fn rules(mut self, rules: GameRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn catalog(mut self, catalog: CharacterCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.room_config = config;
        self
    }

    /// Binds the listener and rebuilds rooms from the store's snapshots.
    ///
    /// Uses `JsonCodec` over `WebSocketTransport`.
    pub async fn build<A, S>(
        self,
        auth: A,
        store: Arc<S>,
    ) -> Result<SkirmishServer<A, S, JsonCodec>, SkirmishError>
    where
        A: Authenticator,
        S: SnapshotStore,
    {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;

        let room_config = self.room_config.validated();
        let idle_timeout = room_config.session.idle_timeout;
        let mut rooms = RoomManager::new(
            room_config,
            Arc::new(self.rules.validated()),
            Arc::new(self.catalog),
            store,
        );
        let recovery = rooms.recover().await?;

        let state = Arc::new(ServerState {
            rooms: Mutex::new(rooms),
            auth,
            codec: JsonCodec,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            idle_timeout,
        });

        Ok(SkirmishServer {
            transport,
            state,
            recovery,
        })
    }
}

impl Default for SkirmishServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A bound Skirmish server. Call [`run`](Self::run) to accept connections.
pub struct SkirmishServer<A: Authenticator, S: SnapshotStore, C: Codec> {
    transport: WebSocketTransport,
    state: Arc<ServerState<A, S, C>>,
    recovery: RecoveryReport,
}

impl<A, S, C> SkirmishServer<A, S, C>
where
    A: Authenticator,
    S: SnapshotStore,
    C: Codec,
{
    pub fn builder() -> SkirmishServerBuilder {
        SkirmishServerBuilder::new()
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// What startup recovery rebuilt.
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), SkirmishError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then stops every
    /// room. Their snapshots are kept so the next start recovers them.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), SkirmishError> {
        tracing::info!("Skirmish server running");
        tokio::pin!(shutdown);

        let mut maintenance = tokio::time::interval(MAINTENANCE_INTERVAL);
        maintenance.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = maintenance.tick() => self.maintain().await,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let span = tracing::info_span!("conn", conn_id = %conn.id(), peer = %conn.peer_addr());
                        let state = Arc::clone(&self.state);
                        tokio::spawn(
                            async move {
                                if let Err(e) = handle_connection(conn, state).await {
                                    tracing::debug!(error = %e, "connection ended with error");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
            }
        }

        tracing::info!("shutting down");
        self.state.rooms.lock().await.shutdown_all().await;
        Ok(())
    }

    async fn maintain(&self) {
        let mut rooms = self.state.rooms.lock().await;
        rooms.prune();
        if let Err(e) = rooms.prune_store().await {
            tracing::warn!(error = %e, "pruning the snapshot store failed");
        }
    }
}

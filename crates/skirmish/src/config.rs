//! Server configuration loaded from the environment.
//!
//! Every setting has a default. A variable that is set but does not parse
//! is logged at `warn` and the default is kept, so a typo never stops the
//! server from starting.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use skirmish_game::GameRules;
use skirmish_room::RoomConfig;

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_DATA_DIR: &str = "data";

/// Everything the server binary needs to start.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `SKIRMISH_BIND`
    pub bind_addr: String,
    /// `SKIRMISH_DATA_DIR`: snapshot store root. `None` keeps snapshots
    /// in memory only (`SKIRMISH_DATA_DIR=` set to empty).
    pub data_dir: Option<PathBuf>,
    /// `SKIRMISH_CATALOG`: JSON catalog file; the built-in catalog when unset.
    pub catalog_file: Option<PathBuf>,
    /// `SKIRMISH_TOKENS`: JSON token table.
    pub token_file: Option<PathBuf>,
    /// `SKIRMISH_DEV_AUTH`: accept `account:Display` tokens. Development only.
    pub dev_auth: bool,
    pub rules: GameRules,
    pub room: RoomConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND.to_string(),
            data_dir: Some(PathBuf::from(DEFAULT_DATA_DIR)),
            catalog_file: None,
            token_file: None,
            dev_auth: false,
            rules: GameRules::default(),
            room: RoomConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads from the process environment. Call `dotenvy::dotenv()` first
    /// to honour a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let vars = Vars(&lookup);
        let mut config = Self::default();

        if let Some(bind) = vars.string("SKIRMISH_BIND") {
            config.bind_addr = bind;
        }
        if let Some(dir) = lookup("SKIRMISH_DATA_DIR") {
            config.data_dir = (!dir.trim().is_empty()).then(|| PathBuf::from(dir.trim()));
        }
        config.catalog_file = vars.string("SKIRMISH_CATALOG").map(PathBuf::from);
        config.token_file = vars.string("SKIRMISH_TOKENS").map(PathBuf::from);
        config.dev_auth = vars.parse("SKIRMISH_DEV_AUTH", config.dev_auth);

        let rules = &mut config.rules;
        rules.min_participants = vars.parse("SKIRMISH_MIN_PLAYERS", rules.min_participants);
        rules.max_participants = vars.parse("SKIRMISH_MAX_PLAYERS", rules.max_participants);
        rules.preparation_seconds = vars.parse("SKIRMISH_PREPARATION_SECS", rules.preparation_seconds);
        rules.combat_seconds = vars.parse("SKIRMISH_COMBAT_SECS", rules.combat_seconds);
        rules.debug_actions = vars.parse("SKIRMISH_DEBUG_ACTIONS", rules.debug_actions);

        let room = &mut config.room;
        room.tick.tick_rate_hz = vars.parse("SKIRMISH_TICK_RATE", room.tick.tick_rate_hz);
        room.snapshot_interval = vars.secs("SKIRMISH_SNAPSHOT_INTERVAL_SECS", room.snapshot_interval);
        room.snapshot_ttl = vars.secs("SKIRMISH_SNAPSHOT_TTL_SECS", room.snapshot_ttl);
        room.remap_ttl = vars.secs("SKIRMISH_REMAP_TTL_SECS", room.remap_ttl);
        room.session.reconnect_grace =
            vars.secs("SKIRMISH_RECONNECT_GRACE_SECS", room.session.reconnect_grace);
        room.session.idle_timeout = vars.secs("SKIRMISH_IDLE_TIMEOUT_SECS", room.session.idle_timeout);

        config.rules = config.rules.validated();
        config.room = config.room.validated();
        config
    }
}

struct Vars<'a, F>(&'a F);

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: FromStr + Copy + std::fmt::Debug>(&self, name: &str, default: T) -> T {
        let Some(raw) = self.string(name) else {
            return default;
        };
        match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(var = name, value = %raw, ?default, "invalid value, using default");
                default
            }
        }
    }

    fn secs(&self, name: &str, default: Duration) -> Duration {
        Duration::from_secs(self.parse(name, default.as_secs()))
    }
}

//! Room configuration.

use std::time::Duration;

use skirmish_session::SessionConfig;
use skirmish_tick::TickConfig;

/// Settings shared by every room a manager spawns.
#[derive(Debug, Clone)]
pub struct RoomConfig {
    /// Phase clock tick rate. Default: 20 Hz.
    pub tick: TickConfig,

    /// How often a running room persists its state. Default: 5 seconds.
    pub snapshot_interval: Duration,

    /// How long a persisted snapshot stays recoverable. Default: 30 minutes.
    pub snapshot_ttl: Duration,

    /// How long an `old → new` room mapping is served after recovery.
    /// Default: 1 hour.
    pub remap_ttl: Duration,

    /// Delay between entering GAME_END and closing every connection.
    /// Default: 2 seconds.
    pub close_delay: Duration,

    /// Bounded command queue size per room. Default: 64.
    pub channel_size: usize,

    /// Reconnection grace and idle timeout.
    pub session: SessionConfig,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::default(),
            snapshot_interval: Duration::from_secs(5),
            snapshot_ttl: Duration::from_secs(30 * 60),
            remap_ttl: Duration::from_secs(60 * 60),
            close_delay: Duration::from_secs(2),
            channel_size: 64,
            session: SessionConfig::default(),
        }
    }
}

const MIN_SNAPSHOT_INTERVAL: Duration = Duration::from_millis(100);

impl RoomConfig {
    /// Returns a copy with every setting in a usable range.
    pub fn validated(mut self) -> Self {
        self.tick = self.tick.validated();
        self.session = self.session.validated();
        if self.snapshot_interval < MIN_SNAPSHOT_INTERVAL {
            tracing::warn!(
                interval = ?self.snapshot_interval,
                "snapshot interval too short, clamping"
            );
            self.snapshot_interval = MIN_SNAPSHOT_INTERVAL;
        }
        if self.channel_size == 0 {
            tracing::warn!("room channel size 0, using 1");
            self.channel_size = 1;
        }
        self
    }
}

/// Converts a configured span to a wall-clock delta for persisted
/// timestamps.
pub(crate) fn wall_clock(span: Duration) -> chrono::Duration {
    // Only absurd configured values are out of range.
    chrono::Duration::from_std(span).unwrap_or_else(|_| chrono::Duration::days(365))
}

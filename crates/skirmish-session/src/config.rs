//! Session timing configuration.

use std::time::Duration;

/// Timeouts governing dropped connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// How long a participant whose connection dropped without a `Leave`
    /// is kept before being removed.
    ///
    /// Default: 300 seconds.
    pub reconnect_grace: Duration,

    /// How long a connection may stay silent before the server declares it
    /// dead. Clients are expected to heartbeat well within this.
    ///
    /// Default: 30 seconds.
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_grace: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionConfig {
    /// Returns a copy whose grace window is at least the idle timeout.
    ///
    /// A grace window shorter than the idle timeout would let a
    /// half-open connection outlive its own participant.
    pub fn validated(mut self) -> Self {
        if self.reconnect_grace < self.idle_timeout {
            tracing::warn!(
                grace = ?self.reconnect_grace,
                idle_timeout = ?self.idle_timeout,
                "reconnect grace shorter than idle timeout, raising it"
            );
            self.reconnect_grace = self.idle_timeout;
        }
        self
    }
}

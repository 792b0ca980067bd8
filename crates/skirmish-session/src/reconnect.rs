//! Reconnection grace windows.
//!
//! When a participant's connection drops without a `Leave`, the room opens
//! a grace window instead of deleting the participant. A window is a
//! spawned sleep task; it never blocks the room. When it fires it sends a
//! command back into the room's queue, and the room asks
//! [`ReconnectionManager::expire`] whether that command is still current.
//!
//! ```text
//! open() ──→ [pending] ──rejoin()──→ Rejoined   (timer aborted)
//!                │
//!                └──(grace elapses)──→ command ──→ expire() ──→ Expired
//! ```
//!
//! Every window carries a generation number. A rejoin that races with an
//! already-fired timer leaves a stale command in the queue; its generation
//! no longer matches and `expire` ignores it.

use std::collections::HashMap;
use std::time::Duration;

use skirmish_protocol::{AccountId, SessionId};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

/// How a grace window ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// The participant came back in time.
    Rejoined { session: SessionId, away: Duration },
    /// The window elapsed. The participant should be removed.
    Expired { session: SessionId, account: AccountId },
}

struct GraceWindow {
    account: AccountId,
    opened_at: Instant,
    generation: u64,
    timer: AbortHandle,
}

/// Tracks open grace windows for one room.
///
/// Dropping the manager aborts every outstanding timer, so a disposed room
/// leaves no sleeping tasks behind.
pub struct ReconnectionManager {
    grace: Duration,
    windows: HashMap<SessionId, GraceWindow>,
    next_generation: u64,
}

impl ReconnectionManager {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            windows: HashMap::new(),
            next_generation: 0,
        }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Opens a grace window for `session`.
    ///
    /// After the grace period, `make(session, generation)` is sent on `tx`.
    /// Pass both values back to [`expire`](Self::expire). An existing
    /// window for the same session is replaced.
    pub fn open<C, F>(&mut self, session: SessionId, account: AccountId, tx: mpsc::Sender<C>, make: F)
    where
        C: Send + 'static,
        F: FnOnce(SessionId, u64) -> C + Send + 'static,
    {
        self.next_generation += 1;
        let generation = self.next_generation;
        let grace = self.grace;

        let command_session = session.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            // The room may already be gone; nothing to do then.
            let _ = tx.send(make(command_session, generation)).await;
        })
        .abort_handle();

        tracing::info!(%session, %account, ?grace, "grace window opened");

        if let Some(previous) = self.windows.insert(
            session,
            GraceWindow {
                account,
                opened_at: Instant::now(),
                generation,
                timer,
            },
        ) {
            previous.timer.abort();
        }
    }

    /// Closes the window early because the participant came back.
    ///
    /// Returns `None` if no window was open for `session`.
    pub fn rejoin(&mut self, session: &SessionId) -> Option<ReconnectOutcome> {
        let window = self.windows.remove(session)?;
        window.timer.abort();
        let away = window.opened_at.elapsed();
        tracing::info!(%session, ?away, "participant rejoined within grace window");
        Some(ReconnectOutcome::Rejoined {
            session: session.clone(),
            away,
        })
    }

    /// Resolves a fired timer.
    ///
    /// Returns `Some(Expired)` only if the window identified by
    /// `generation` is still the open one for `session`.
    pub fn expire(&mut self, session: &SessionId, generation: u64) -> Option<ReconnectOutcome> {
        match self.windows.get(session) {
            Some(window) if window.generation == generation => {}
            _ => {
                tracing::debug!(%session, generation, "ignoring stale grace expiry");
                return None;
            }
        }
        let window = self.windows.remove(session)?;
        tracing::info!(%session, account = %window.account, "grace window expired");
        Some(ReconnectOutcome::Expired {
            session: session.clone(),
            account: window.account,
        })
    }

    /// Cancels the window for `session` without an outcome (consented
    /// leave). Returns `true` if one was open.
    pub fn cancel(&mut self, session: &SessionId) -> bool {
        match self.windows.remove(session) {
            Some(window) => {
                window.timer.abort();
                true
            }
            None => false,
        }
    }

    /// Cancels every open window.
    pub fn cancel_all(&mut self) {
        for (_, window) in self.windows.drain() {
            window.timer.abort();
        }
    }

    pub fn is_pending(&self, session: &SessionId) -> bool {
        self.windows.contains_key(session)
    }

    /// Number of open windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

impl Drop for ReconnectionManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

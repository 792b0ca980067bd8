//! Join resolution: deciding what an authenticated connection attaches to.
//!
//! ```text
//!                     participant under incoming id?
//!                    ┌──────────yes──────────┴──────────no──────────┐
//!             same account?                          participant for account?
//!          no ─┴─ yes                                 ┌──yes──┴──no──┐
//!   InvalidResume   live? ── yes → AlreadyConnected  live?          Create
//!                    │ no                         yes ─┴─ no
//!                  Resume               AlreadyConnected   Transfer
//! ```
//!
//! Liveness always comes from a [`LivenessProbe`] over the room's
//! transport handles, never from the participant's stored `connected`
//! flag, which may be stale.

use skirmish_protocol::{AccountId, SessionId};

use crate::SessionError;

/// Read access to the participants a room currently tracks.
pub trait Roster {
    /// The account owning `session`, if a participant exists under it.
    fn account_of(&self, session: &SessionId) -> Option<&AccountId>;

    /// The session id of the participant owned by `account`, if any.
    fn session_for_account(&self, account: &AccountId) -> Option<&SessionId>;
}

/// Answers whether a session still has an open outbound channel.
pub trait LivenessProbe {
    fn is_live(&self, session: &SessionId) -> bool;
}

/// What a join should do to the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinResolution {
    /// Reattach to the existing participant under the same id.
    Resume(SessionId),
    /// Re-key the participant `from` (not live) to the incoming id `to`.
    Transfer { from: SessionId, to: SessionId },
    /// No participant for the account yet.
    Create(SessionId),
}

/// Resolves a join attempt for `account` arriving under `incoming`.
///
/// Pure: nothing is mutated, so a rejected join leaves the room exactly
/// as it was.
///
/// # Errors
/// - [`SessionError::AlreadyConnected`] if the account's participant is live
/// - [`SessionError::InvalidResumeTicket`] if `incoming` belongs to
///   another account
pub fn resolve_join<R, P>(
    incoming: &SessionId,
    account: &AccountId,
    roster: &R,
    probe: &P,
) -> Result<JoinResolution, SessionError>
where
    R: Roster + ?Sized,
    P: LivenessProbe + ?Sized,
{
    if let Some(owner) = roster.account_of(incoming) {
        if owner != account {
            return Err(SessionError::InvalidResumeTicket);
        }
        if probe.is_live(incoming) {
            return Err(SessionError::AlreadyConnected(account.clone()));
        }
        return Ok(JoinResolution::Resume(incoming.clone()));
    }

    match roster.session_for_account(account) {
        Some(existing) if probe.is_live(existing) => {
            Err(SessionError::AlreadyConnected(account.clone()))
        }
        Some(existing) => Ok(JoinResolution::Transfer {
            from: existing.clone(),
            to: incoming.clone(),
        }),
        None => Ok(JoinResolution::Create(incoming.clone())),
    }
}

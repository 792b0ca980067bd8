//! Player session handling for Skirmish.
//!
//! This crate decides *who* a connection is and *what* happens to a
//! participant when its connection goes away:
//!
//! 1. **Authentication**: turning an opaque credential into an
//!    [`Identity`] ([`Authenticator`] trait).
//! 2. **Join resolution**: resume, identity transfer, rejection, or a new
//!    participant ([`resolve_join`]).
//! 3. **Reconnection windows**: holding a dropped participant for a
//!    bounded time ([`ReconnectionManager`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Room Layer (above)   ← owns participants, asks this crate what to do
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← SessionId, AccountId, ResumeTicket
//! ```

mod auth;
mod config;
mod error;
mod reconnect;
mod resolver;
mod token;

pub use auth::{Authenticator, DevAuthenticator, Identity, TokenTable};
pub use config::SessionConfig;
pub use error::SessionError;
pub use reconnect::{ReconnectOutcome, ReconnectionManager};
pub use resolver::{JoinResolution, LivenessProbe, Roster, resolve_join};
pub use token::{ResumeTokens, generate_session_id, generate_token};

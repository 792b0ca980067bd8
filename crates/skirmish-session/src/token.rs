//! Session ids and reconnect tokens.

use std::collections::HashMap;

use rand::Rng;
use rand::distr::Alphanumeric;
use skirmish_protocol::{ResumeTicket, SessionId};

/// Length of a generated session id.
const SESSION_ID_LEN: usize = 9;

/// Generates a random 32-character hex string (128 bits of entropy).
pub fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generates a short alphanumeric session id, e.g. `"aZ3kQ9bX1"`.
pub fn generate_session_id() -> SessionId {
    let id: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect();
    SessionId::new(id)
}

/// Reconnect tokens issued by one room, keyed by session.
///
/// Tokens live only in memory. After a restart the resume tickets held by
/// clients no longer verify and those clients fall back to identity
/// transfer by account.
#[derive(Debug, Default)]
pub struct ResumeTokens {
    tokens: HashMap<SessionId, String>,
}

impl ResumeTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh token for `session`, replacing any previous one.
    pub fn issue(&mut self, session: &SessionId) -> String {
        let token = generate_token();
        self.tokens.insert(session.clone(), token.clone());
        token
    }

    /// Returns `true` if the ticket's token is the one issued for its
    /// session.
    pub fn verify(&self, ticket: &ResumeTicket) -> bool {
        self.tokens
            .get(&ticket.session_id)
            .is_some_and(|issued| *issued == ticket.reconnect_token)
    }

    /// Forgets the token for `session`.
    pub fn revoke(&mut self, session: &SessionId) {
        self.tokens.remove(session);
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }
}

//! Authentication hook for validating player identity.
//!
//! Skirmish does not issue credentials. It consumes them: the
//! [`Authenticator`] trait takes the opaque token a client sends in its
//! handshake and returns an [`Identity`] or fails. Two implementations
//! ship with the crate, a static [`TokenTable`] and a [`DevAuthenticator`]
//! for local play.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use skirmish_protocol::AccountId;

use crate::SessionError;

/// Who a verified connection belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Permanent account key, used for duplicate-session detection.
    pub account_id: AccountId,
    pub username: String,
    pub display_name: String,
}

/// Validates a client's auth token and returns their identity.
///
/// Called once per connection during the handshake, before any room
/// state is touched. A failure aborts the join.
///
/// # Example
///
/// ```rust
/// use skirmish_protocol::AccountId;
/// use skirmish_session::{Authenticator, Identity, SessionError};
///
/// /// Accepts exactly one hardcoded token.
/// struct SingleUser;
///
/// impl Authenticator for SingleUser {
///     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
///         if token != "letmein" {
///             return Err(SessionError::AuthFailed("unknown token".into()));
///         }
///         Ok(Identity {
///             account_id: AccountId::new("1"),
///             username: "solo".into(),
///             display_name: "Solo".into(),
///         })
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given token and returns the player's identity.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, SessionError>> + Send;
}

// ---------------------------------------------------------------------------
// TokenTable
// ---------------------------------------------------------------------------

/// A fixed map of tokens to identities, typically loaded from a JSON file
/// shaped like `{"<token>": {"accountId": "..", "username": "..",
/// "displayName": ".."}}`.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    entries: HashMap<String, Identity>,
}

impl TokenTable {
    pub fn new(entries: HashMap<String, Identity>) -> Self {
        Self { entries }
    }

    /// Loads a token table from a JSON file.
    ///
    /// # Errors
    /// [`SessionError::TokenTableRead`] if the file can't be read,
    /// [`SessionError::TokenTableParse`] if its content is malformed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| SessionError::TokenTableRead {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SessionError> {
        let entries: HashMap<String, Identity> = serde_json::from_str(raw)?;
        tracing::info!(tokens = entries.len(), "token table loaded");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Authenticator for TokenTable {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        self.entries
            .get(token)
            .cloned()
            .ok_or_else(|| SessionError::AuthFailed("unknown token".into()))
    }
}

// ---------------------------------------------------------------------------
// DevAuthenticator
// ---------------------------------------------------------------------------

/// Trusts whatever the client says. Development only.
///
/// Tokens have the form `account` or `account:Display Name`. The account
/// part doubles as the username.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevAuthenticator;

impl Authenticator for DevAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        let (account, display) = match token.split_once(':') {
            Some((account, display)) => (account.trim(), display.trim()),
            None => (token.trim(), ""),
        };
        if account.is_empty() {
            return Err(SessionError::AuthFailed("empty account in dev token".into()));
        }
        let display = if display.is_empty() { account } else { display };
        Ok(Identity {
            account_id: AccountId::new(account),
            username: account.to_owned(),
            display_name: display.to_owned(),
        })
    }
}

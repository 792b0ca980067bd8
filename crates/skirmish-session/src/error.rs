//! Error types for the session layer.

use skirmish_protocol::AccountId;

/// Errors that can occur while authenticating or admitting a connection.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The credential was rejected by the [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The account already has a participant whose connection is live.
    #[error("account {0} is already connected elsewhere")]
    AlreadyConnected(AccountId),

    /// A resume ticket named a session that belongs to another account.
    #[error("resume ticket does not match the authenticated account")]
    InvalidResumeTicket,

    /// The token table file could not be read.
    #[error("failed to read token table {path}: {source}")]
    TokenTableRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The token table file is not valid JSON of the expected shape.
    #[error("failed to parse token table: {0}")]
    TokenTableParse(#[from] serde_json::Error),
}

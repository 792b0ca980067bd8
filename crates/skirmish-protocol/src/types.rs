//! Core protocol types: identifiers, recipients, and the envelope format.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol version. Clients must send it in their handshake or be
/// rejected.
pub const PROTOCOL_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Declares a string newtype identifier.
///
/// All three ids are opaque strings on the wire (`#[serde(transparent)]`
/// turns `SessionId("ab12")` into `"ab12"`), but distinct types in Rust so
/// a room id can never be passed where a session id is expected.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Identifies one connection of a participant to a room.
    ///
    /// Ephemeral: a reconnecting client gets a new one unless it resumes
    /// with a valid [`ResumeTicket`].
    SessionId,
    "S-"
);

string_id!(
    /// The permanent identity of a user, as returned by token
    /// verification. The key for duplicate-session detection.
    AccountId,
    "A-"
);

string_id!(
    /// The public identifier of a room. Changes when a room is rebuilt
    /// from a snapshot after a restart.
    RoomId,
    "R-"
);

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who should receive an outbound game event.
///
/// Game code returns `(Recipient, Event)` pairs and the room actor fans
/// them out to the matching connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recipient {
    /// Every participant in the room.
    All,
    /// One participant.
    Session(SessionId),
    /// Everyone except one participant.
    AllExcept(SessionId),
}

impl Recipient {
    /// Returns `true` if `session` is addressed by this recipient.
    pub fn includes(&self, session: &SessionId) -> bool {
        match self {
            Self::All => true,
            Self::Session(target) => target == session,
            Self::AllExcept(excluded) => excluded != session,
        }
    }
}

// ---------------------------------------------------------------------------
// System messages
// ---------------------------------------------------------------------------

/// Proof that a client owned a session before its connection dropped.
///
/// Issued in [`SystemMessage::HandshakeAck`]; presenting it in the next
/// handshake resumes the same session id instead of allocating a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeTicket {
    pub session_id: SessionId,
    pub reconnect_token: String,
}

/// Framework-level messages: connection lifecycle, heartbeats, room
/// discovery, and errors.
///
/// Internally tagged, so `Leave` is `{"type":"Leave"}` and a handshake is
/// `{"type":"Handshake","version":1,"token":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum SystemMessage {
    // -- Connection lifecycle --
    /// Client → Server: first message on every connection.
    ///
    /// `room_id` names the room to enter (absent: any joinable room).
    /// `resume` is set when the client is coming back after a drop.
    Handshake {
        version: u32,
        token: String,
        #[serde(default)]
        room_id: Option<RoomId>,
        #[serde(default)]
        resume: Option<ResumeTicket>,
    },

    /// Server → Client: the join succeeded.
    HandshakeAck {
        session_id: SessionId,
        account_id: AccountId,
        room_id: RoomId,
        reconnect_token: String,
        server_time: u64,
    },

    /// Client → Server: intentional leave. The participant is removed
    /// immediately, with no reconnection grace window.
    Leave,

    /// Either direction: the connection is about to close.
    Disconnect { reason: String },

    // -- Heartbeat --
    Heartbeat { client_time: u64 },
    HeartbeatAck { client_time: u64, server_time: u64 },

    // -- Room discovery --
    /// Client → Server: where did this room go after a restart?
    LocateRoom { room_id: RoomId },

    /// Server → Client: answer to [`SystemMessage::LocateRoom`].
    /// `current` is `None` when no live mapping exists.
    RoomLocated {
        previous: RoomId,
        current: Option<RoomId>,
    },

    /// Server → Client: the room named in the handshake was rebuilt under
    /// a new id. The client should handshake again with `current`.
    RoomMoved { previous: RoomId, current: RoomId },

    // -- Errors --
    /// Server → Client: HTTP-style error code plus a readable message.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Payload and Envelope
// ---------------------------------------------------------------------------

/// The content of an envelope: framework traffic or game traffic.
///
/// Adjacently tagged: `{"type":"System","data":{...}}` or
/// `{"type":"Game","data":{...}}`. `G` is the game's action type on the
/// inbound side and its event type on the outbound side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload<G> {
    System(SystemMessage),
    Game(G),
}

/// Every frame on the wire is one envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<P> {
    /// Per-direction sequence number, starting at 0 for the handshake.
    pub seq: u64,
    /// Milliseconds since the sender's connection handler started.
    pub timestamp: u64,
    pub payload: P,
}

// =========================================================================
// Tests
// =========================================================================

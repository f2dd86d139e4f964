//! Core protocol types for Tablehub's wire format.
//!
//! Inbound frames are small JSON objects: a type tag plus free-form
//! parameters. Outbound messages are an internally tagged enum, so every
//! frame a client receives has a `"type"` field it can switch on.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use std::fmt;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a connected client.
///
/// Newtype over `u64` so a client id can never be confused with a seat
/// number or a room id. Serialized as the bare number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C-{}", self.0)
    }
}

/// A unique identifier for a room (one game session).
///
/// Opaque to clients: they receive it in `room-created` and echo it back
/// in `join-room`. Generated ids are 12 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wraps an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id (48 bits of entropy).
    ///
    /// Uniqueness against live rooms is enforced by the hub, which
    /// regenerates on collision.
    pub fn generate() -> Self {
        use rand::Rng;

        let bytes: [u8; 6] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// MessageType: the inbound type tag
// ---------------------------------------------------------------------------

/// The type tag of an inbound command.
///
/// The hub and rooms understand a fixed vocabulary; anything else is a
/// game command and is handed verbatim to the room's driver as
/// [`MessageType::Game`].
///
/// Serialized as its kebab-case tag string (`"create-room"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Lobby: create a room running the named driver.
    CreateRoom,
    /// Lobby: join an existing room by id.
    JoinRoom,
    /// Room, owner only: destroy the room.
    TerminateRoom,
    /// Room, owner only: remove another member by seat number.
    KickPlayer,
    /// Room: leave the current room and return to the lobby.
    LeaveRoom,
    /// Room, owner only: start the game for drivers without auto-start.
    StartGame,
    /// Room: broadcast a chat line to every member.
    ChatRoom,
    /// Any other tag, forwarded to the room's driver.
    Game(String),
}

impl MessageType {
    /// Returns the wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::CreateRoom => "create-room",
            Self::JoinRoom => "join-room",
            Self::TerminateRoom => "terminate-room",
            Self::KickPlayer => "kick-player",
            Self::LeaveRoom => "leave-room",
            Self::StartGame => "start-game",
            Self::ChatRoom => "chat-room",
            Self::Game(tag) => tag,
        }
    }

    /// Returns `true` for commands the hub handles itself, without
    /// resolving the author's room first.
    pub fn is_lobby(&self) -> bool {
        matches!(self, Self::CreateRoom | Self::JoinRoom)
    }
}

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        match tag {
            "create-room" => Self::CreateRoom,
            "join-room" => Self::JoinRoom,
            "terminate-room" => Self::TerminateRoom,
            "kick-player" => Self::KickPlayer,
            "leave-room" => Self::LeaveRoom,
            "start-game" => Self::StartGame,
            "chat-room" => Self::ChatRoom,
            other => Self::Game(other.to_string()),
        }
    }
}

impl From<String> for MessageType {
    fn from(tag: String) -> Self {
        Self::from(tag.as_str())
    }
}

impl From<MessageType> for String {
    fn from(kind: MessageType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Inbound frames and parameters
// ---------------------------------------------------------------------------

/// An inbound frame as it arrives from a client, before the hub attaches
/// the author.
///
/// ```json
/// { "type": "join-room", "params": { "roomID": "3fa2c01b9e77" } }
/// ```
///
/// `params` may be omitted for commands that take none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub params: Value,
}

impl ClientMessage {
    pub fn new(kind: MessageType, params: Value) -> Self {
        Self { kind, params }
    }
}

/// Decodes the parameters of a command into its typed shape.
///
/// # Errors
/// Returns [`ProtocolError::InvalidParams`] naming the command when the
/// parameters don't fit.
pub fn parse_params<T: DeserializeOwned>(
    kind: &MessageType,
    params: &Value,
) -> Result<T, ProtocolError> {
    T::deserialize(params).map_err(|source| ProtocolError::InvalidParams {
        kind: kind.to_string(),
        source,
    })
}

/// Parameters of `create-room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomParams {
    /// Name of the registered driver the room should run.
    pub driver: String,
}

/// Parameters of `join-room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomParams {
    #[serde(rename = "roomID")]
    pub room_id: RoomId,
}

/// Parameters of `kick-player`.
///
/// Signed so that a negative seat is reported as an inexistent client
/// rather than as a malformed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KickPlayerParams {
    #[serde(rename = "playerNumber")]
    pub player_number: i64,
}

/// Parameters of `chat-room`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatParams {
    pub msg: String,
}

// ---------------------------------------------------------------------------
// Outbound messages
// ---------------------------------------------------------------------------

/// Why a client was taken out of its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClientOutReason {
    /// The owner kicked them.
    Kicked,
    /// They sent `leave-room`.
    Left,
}

/// Why a room was destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DestroyReason {
    /// The owner sent `terminate-room`.
    Terminated,
    /// The room never started within the idle timeout.
    Timeout,
    /// The last human member left.
    NoHumans,
    /// The driver reported the game over.
    GameOver,
    /// The hub is shutting down.
    Shutdown,
}

impl fmt::Display for DestroyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Terminated => "terminated",
            Self::Timeout => "timeout",
            Self::NoHumans => "no-humans",
            Self::GameOver => "game-over",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// One seat in a `players` listing. The seat number is the index in the
/// list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub name: String,
    pub bot: bool,
    pub owner: bool,
}

/// Everything the server sends to clients.
///
/// Internally tagged with kebab-case names:
///
/// ```json
/// { "type": "update", "enabled": true, "state": { ... } }
/// { "type": "error", "code": "forbidden", "reason": "only the room owner can do that" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutgoingMessage {
    /// Broadcast game state. `enabled` is `true` only for the member
    /// holding the turn.
    Update { enabled: bool, state: Value },

    /// Private state for one member (their hand, their score, ...).
    Direct { state: Value },

    /// A rejected command. Sent to its author only.
    Error { code: String, reason: String },

    /// The recipient is no longer in its room.
    ClientOut { reason: ClientOutReason },

    /// Reply to `create-room`.
    RoomCreated {
        #[serde(rename = "roomID")]
        room_id: RoomId,
    },

    /// Reply to `join-room`.
    RoomJoined {
        #[serde(rename = "roomID")]
        room_id: RoomId,
        #[serde(rename = "playerNumber")]
        player_number: usize,
    },

    /// Membership changed; the full seat list in join order.
    Players { players: Vec<PlayerSummary> },

    /// The room the recipient was in is gone.
    RoomDestroyed { reason: DestroyReason },

    /// A chat line from a room member.
    Chat { author: String, msg: String },
}

impl OutgoingMessage {
    /// Builds an `error` message.
    pub fn error(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

//! Error types for the room layer.

use tablehub_protocol::{OutgoingMessage, ProtocolError, RoomId};

use crate::DriverError;

/// Why a command was rejected.
///
/// Every variant is reported to the command's author as exactly one
/// `error` message carrying [`RoomError::code`] and the display text.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// A non-owner attempted an owner-only action.
    #[error("only the room owner can do that")]
    Forbidden,

    /// The seat number doesn't exist in this room.
    #[error("there is no player number {0} in this room")]
    InexistentClient(i64),

    /// The owner tried to kick themselves.
    #[error("the room owner can't be removed")]
    OwnerNotRemovable,

    /// The room does not exist (never did, or was destroyed).
    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    /// No more seats.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The game is running and the driver doesn't take late joiners.
    #[error("room {0} has already started")]
    AlreadyStarted(RoomId),

    /// `start-game` before the driver's minimum player count.
    #[error("not enough players to start: {have} of {need}")]
    NotEnoughPlayers { have: usize, need: usize },

    /// A room command from a client that isn't in a room.
    #[error("you are not in a room")]
    NotInRoom,

    /// A lobby command from a client that is already in a room.
    #[error("you are already in room {0}")]
    AlreadyInRoom(RoomId),

    /// `create-room` named a driver that isn't registered.
    #[error("no game driver named {0:?}")]
    UnknownDriver(String),

    /// The command's parameters didn't decode.
    #[error(transparent)]
    InvalidParams(#[from] ProtocolError),

    /// The game rejected the command.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl RoomError {
    /// Stable machine-readable code for clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Forbidden => "forbidden",
            Self::InexistentClient(_) => "inexistent-client",
            Self::OwnerNotRemovable => "owner-not-removable",
            Self::RoomNotFound(_) => "room-not-found",
            Self::RoomFull(_) => "room-full",
            Self::AlreadyStarted(_) => "already-started",
            Self::NotEnoughPlayers { .. } => "not-enough-players",
            Self::NotInRoom => "not-in-room",
            Self::AlreadyInRoom(_) => "already-in-room",
            Self::UnknownDriver(_) => "unknown-driver",
            Self::InvalidParams(_) => "invalid-params",
            Self::Driver(_) => "driver-error",
        }
    }

    /// Builds the `error` message sent back to the author.
    pub fn to_message(&self) -> OutgoingMessage {
        OutgoingMessage::error(self.code(), self.to_string())
    }
}

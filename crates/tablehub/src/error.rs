//! Unified error type for Tablehub.

use tablehub_protocol::ProtocolError;
use tablehub_room::RoomError;
use tablehub_transport::TransportError;

use crate::config::ConfigError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum TablehubError {
    /// A transport-level error (bind, accept, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, bad parameters).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A command was rejected by the hub or a room.
    #[error(transparent)]
    Room(#[from] RoomError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The hub loop has stopped; its handle can no longer reach it.
    #[error("hub is not running")]
    HubClosed,
}

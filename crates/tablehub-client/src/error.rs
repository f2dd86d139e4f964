//! Error types for the client layer.

use tablehub_protocol::ClientId;

/// Why a payload could not be handed to a client's mailbox.
///
/// Both cases mean the client can no longer be reached: the hub treats
/// either one as a disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The mailbox is at capacity; the consumer has stalled.
    #[error("outbound mailbox of client {0} is full")]
    Full(ClientId),

    /// The mailbox was closed, or its receiving side is gone.
    #[error("client {0} is closed")]
    Closed(ClientId),
}

//! Fire-and-forget delivery of outgoing messages.

use std::fmt;
use std::sync::Arc;

use tablehub_client::{ClientRef, SendError};
use tablehub_protocol::{Codec, OutgoingMessage};
use tokio::sync::mpsc;

/// What kind of delivery an emission is. Used for logs and by test
/// recorders; the payload is the same either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// Ordinary room traffic: state, replies, errors, chat.
    MessageCreated,
    /// A member was kicked or left and is being told so.
    ClientOut,
    /// The room is gone.
    RoomDestroyed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageCreated => "messageCreated",
            Self::ClientOut => "clientOut",
            Self::RoomDestroyed => "roomDestroyed",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivers a message to a set of clients without waiting on any of them.
///
/// Rooms hold an `Arc<dyn Emitter>` and call it from the hub task, so
/// `emit` must never block.
pub trait Emitter: Send + Sync + 'static {
    fn emit(
        &self,
        event: Event,
        recipients: &[ClientRef],
        message: &OutgoingMessage,
    );
}

/// The production [`Emitter`]: encodes once, then `try_send`s the bytes
/// into each recipient's mailbox.
///
/// A recipient whose mailbox is full is a dead peer. It gets closed on
/// the spot and reported on `unreachable` so the hub unregisters it on
/// its next loop iteration.
pub struct ClientEmitter<C: Codec> {
    codec: C,
    unreachable: mpsc::UnboundedSender<ClientRef>,
}

impl<C: Codec> ClientEmitter<C> {
    pub fn new(codec: C, unreachable: mpsc::UnboundedSender<ClientRef>) -> Self {
        Self { codec, unreachable }
    }
}

impl<C: Codec> Emitter for ClientEmitter<C> {
    fn emit(
        &self,
        event: Event,
        recipients: &[ClientRef],
        message: &OutgoingMessage,
    ) {
        if recipients.is_empty() {
            return;
        }
        let payload = match self.codec.encode(message) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(%event, error = %e, "failed to encode outgoing message");
                return;
            }
        };

        for client in recipients {
            match client.send(payload.clone()) {
                Ok(()) => {}
                Err(SendError::Full(id)) => {
                    tracing::warn!(client_id = %id, %event, "mailbox full, dropping client");
                    client.close();
                    let _ = self.unreachable.send(Arc::clone(client));
                }
                Err(SendError::Closed(id)) => {
                    tracing::debug!(client_id = %id, %event, "mailbox closed");
                    let _ = self.unreachable.send(Arc::clone(client));
                }
            }
        }
    }
}

//! The [`Client`] trait and its mailbox-backed implementation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tablehub_protocol::{ClientId, RoomId};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::SendError;

/// Counter for generating unique client IDs.
static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a client. The hub's registry, every room membership
/// list, and the connection handler all hold one of these.
pub type ClientRef = Arc<dyn Client>;

/// The server-side handle to one connected participant.
///
/// Implementations must be cheap to call from the hub task: `send` never
/// waits, and the room accessors are plain field reads.
pub trait Client: Send + Sync + 'static {
    /// Unique, stable identity. Registries are keyed by it.
    fn id(&self) -> ClientId;

    /// Display name shown to other players.
    fn name(&self) -> &str;

    /// Bots can hold a seat but can't keep a room alive on their own.
    fn is_bot(&self) -> bool;

    /// Hands an encoded payload to the client's outbound mailbox.
    ///
    /// Never blocks. A full or closed mailbox is reported as an error and
    /// the caller decides what to do with the client.
    fn send(&self, payload: Vec<u8>) -> Result<(), SendError>;

    /// Closes the outbound mailbox. The connection's write pump sees the
    /// end of the stream and hangs up. Idempotent.
    fn close(&self);

    /// The room this client is currently in, or `None` in the lobby.
    fn room(&self) -> Option<RoomId>;

    /// Updates the room association. Only the hub task calls this.
    fn set_room(&self, room: Option<RoomId>);
}

/// A [`Client`] whose outbound side is a bounded `tokio::sync::mpsc`
/// channel.
///
/// The connection handler owns the matching receiver and forwards each
/// payload to the socket. When the sender is dropped (via [`close`]) the
/// receiver yields `None` and the handler disconnects.
///
/// [`close`]: Client::close
#[derive(Debug)]
pub struct ChannelClient {
    id: ClientId,
    name: String,
    bot: bool,
    outbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    room: Mutex<Option<RoomId>>,
}

impl ChannelClient {
    /// Creates a human client with a mailbox of `capacity` payloads.
    ///
    /// Returns the client and the receiving end of its mailbox.
    pub fn new(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        Self::build(name.into(), false, capacity)
    }

    /// Creates a bot client. Same mailbox semantics as [`ChannelClient::new`].
    pub fn bot(
        name: impl Into<String>,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        Self::build(name.into(), true, capacity)
    }

    fn build(
        name: String,
        bot: bool,
        capacity: usize,
    ) -> (Arc<Self>, mpsc::Receiver<Vec<u8>>) {
        // mpsc::channel panics on zero capacity.
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let client = Arc::new(Self {
            id: ClientId(NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed)),
            name,
            bot,
            outbound: Mutex::new(Some(tx)),
            room: Mutex::new(None),
        });
        (client, rx)
    }

    /// Returns `true` once the mailbox has been closed.
    pub fn is_closed(&self) -> bool {
        lock(&self.outbound).is_none()
    }
}

impl Client for ChannelClient {
    fn id(&self) -> ClientId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_bot(&self) -> bool {
        self.bot
    }

    fn send(&self, payload: Vec<u8>) -> Result<(), SendError> {
        let outbound = lock(&self.outbound);
        let Some(tx) = outbound.as_ref() else {
            return Err(SendError::Closed(self.id));
        };
        tx.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => SendError::Full(self.id),
            TrySendError::Closed(_) => SendError::Closed(self.id),
        })
    }

    fn close(&self) {
        if lock(&self.outbound).take().is_some() {
            tracing::debug!(client_id = %self.id, "outbound mailbox closed");
        }
    }

    fn room(&self) -> Option<RoomId> {
        lock(&self.room).clone()
    }

    fn set_room(&self, room: Option<RoomId>) {
        *lock(&self.room) = room;
    }
}

/// Locks a mutex, recovering the data if a previous holder panicked.
/// The guarded values are plain `Option`s, so they are always valid.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =========================================================================
// Tests
// =========================================================================

//! The hub: one task that owns every client and every room.
//!
//! Connection handlers, idle timers and the emitter never touch the
//! registries. They post to the hub's channels and the hub applies each
//! event in turn, so room state is only ever mutated from this loop.
//!
//! ```text
//!   handlers ──register/unregister/messages──┐
//!   idle timers ──────────── expired ────────┤
//!   emitter ─────────────── unreachable ─────┼──→ Hub::run ──→ Room
//!   HubHandle ────────────── control ────────┘
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::sync::Arc;

use tablehub_client::{ClientRef, IncomingMessage};
use tablehub_protocol::{
    ClientId, CreateRoomParams, DestroyReason, JoinRoomParams, JsonCodec,
    MessageType, OutgoingMessage, RoomId,
};
use tablehub_room::{
    ClientEmitter, DriverRegistry, Emitter, Event, IdleTimer, Room,
    RoomError, RoomInfo, RoomOutcome,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::{HubConfig, TablehubError};

/// Counts reported by [`HubHandle::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HubStats {
    /// Registered clients, in rooms or in the lobby.
    pub clients: usize,
    pub rooms: usize,
}

/// Requests that need an answer from the hub loop.
enum Control {
    CreateRoom {
        owner: ClientRef,
        driver: String,
        reply: oneshot::Sender<Result<RoomId, RoomError>>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
    RoomInfo {
        room_id: RoomId,
        reply: oneshot::Sender<Option<RoomInfo>>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// HubHandle
// ---------------------------------------------------------------------------

/// Cheap, cloneable handle for talking to a running [`Hub`].
///
/// The hub stops once every handle has been dropped, or on
/// [`shutdown`](Self::shutdown).
#[derive(Clone)]
pub struct HubHandle {
    register: mpsc::Sender<ClientRef>,
    unregister: mpsc::Sender<ClientRef>,
    messages: mpsc::Sender<IncomingMessage>,
    control: mpsc::Sender<Control>,
}

impl HubHandle {
    /// Adds a client to the known set. Registering twice is harmless.
    pub async fn register(&self, client: ClientRef) -> Result<(), TablehubError> {
        self.register
            .send(client)
            .await
            .map_err(|_| TablehubError::HubClosed)
    }

    /// Removes a client, closing its mailbox and taking it out of its
    /// room. Unknown clients are ignored.
    pub async fn unregister(
        &self,
        client: ClientRef,
    ) -> Result<(), TablehubError> {
        self.unregister
            .send(client)
            .await
            .map_err(|_| TablehubError::HubClosed)
    }

    /// Queues a client command. Rejections go back to the author as
    /// `error` messages, not through this result.
    pub async fn dispatch(
        &self,
        message: IncomingMessage,
    ) -> Result<(), TablehubError> {
        self.messages
            .send(message)
            .await
            .map_err(|_| TablehubError::HubClosed)
    }

    /// Creates a room owned by `owner` running the named driver and
    /// returns its id. Registers `owner` if it wasn't already.
    pub async fn create_room(
        &self,
        owner: ClientRef,
        driver: &str,
    ) -> Result<RoomId, TablehubError> {
        let (reply, rx) = oneshot::channel();
        self.request(Control::CreateRoom {
            owner,
            driver: driver.to_string(),
            reply,
        })
        .await?;
        let room_id = rx.await.map_err(|_| TablehubError::HubClosed)??;
        Ok(room_id)
    }

    pub async fn stats(&self) -> Result<HubStats, TablehubError> {
        let (reply, rx) = oneshot::channel();
        self.request(Control::Stats { reply }).await?;
        rx.await.map_err(|_| TablehubError::HubClosed)
    }

    /// A snapshot of one room, or `None` if it doesn't exist.
    pub async fn room_info(
        &self,
        room_id: &RoomId,
    ) -> Result<Option<RoomInfo>, TablehubError> {
        let (reply, rx) = oneshot::channel();
        self.request(Control::RoomInfo {
            room_id: room_id.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TablehubError::HubClosed)
    }

    /// Destroys every room with reason `shutdown`, closes every client,
    /// and stops the loop.
    pub async fn shutdown(&self) -> Result<(), TablehubError> {
        self.request(Control::Shutdown).await
    }

    async fn request(&self, control: Control) -> Result<(), TablehubError> {
        self.control
            .send(control)
            .await
            .map_err(|_| TablehubError::HubClosed)
    }
}

// ---------------------------------------------------------------------------
// Hub
// ---------------------------------------------------------------------------

/// The serializing event loop. Build with [`Hub::new`], then
/// [`run`](Hub::run) or [`spawn`](Hub::spawn) it.
pub struct Hub {
    config: HubConfig,
    drivers: DriverRegistry,
    emitter: Arc<dyn Emitter>,

    clients: HashMap<ClientId, ClientRef>,
    rooms: HashMap<RoomId, Room>,

    register_rx: mpsc::Receiver<ClientRef>,
    unregister_rx: mpsc::Receiver<ClientRef>,
    messages_rx: mpsc::Receiver<IncomingMessage>,
    control_rx: mpsc::Receiver<Control>,
    unreachable_rx: mpsc::UnboundedReceiver<ClientRef>,
    unreachable_tx: mpsc::UnboundedSender<ClientRef>,
    expired_rx: mpsc::UnboundedReceiver<RoomId>,
    expired_tx: mpsc::UnboundedSender<RoomId>,
}

impl Hub {
    /// Creates a hub delivering JSON through each client's mailbox.
    pub fn new(config: HubConfig, drivers: DriverRegistry) -> (Self, HubHandle) {
        let size = config.channel_size.max(1);
        let (register, register_rx) = mpsc::channel(size);
        let (unregister, unregister_rx) = mpsc::channel(size);
        let (messages, messages_rx) = mpsc::channel(size);
        let (control, control_rx) = mpsc::channel(size);
        let (unreachable_tx, unreachable_rx) = mpsc::unbounded_channel();
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();

        let emitter =
            Arc::new(ClientEmitter::new(JsonCodec, unreachable_tx.clone()));

        let hub = Self {
            config,
            drivers,
            emitter,
            clients: HashMap::new(),
            rooms: HashMap::new(),
            register_rx,
            unregister_rx,
            messages_rx,
            control_rx,
            unreachable_rx,
            unreachable_tx,
            expired_rx,
            expired_tx,
        };
        let handle = HubHandle {
            register,
            unregister,
            messages,
            control,
        };
        (hub, handle)
    }

    /// Replaces the emitter every room delivers through.
    pub fn with_emitter(mut self, emitter: Arc<dyn Emitter>) -> Self {
        self.emitter = emitter;
        self
    }

    /// Sender the emitter reports dead peers on. Custom emitters passed
    /// to [`with_emitter`](Self::with_emitter) can use it to get the
    /// same disconnect behaviour as the default one.
    pub fn unreachable_sender(&self) -> mpsc::UnboundedSender<ClientRef> {
        self.unreachable_tx.clone()
    }

    /// Runs the loop on a new task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs until every [`HubHandle`] is dropped or shutdown is requested.
    ///
    /// The select is biased: membership changes and internal signals are
    /// applied before client commands, and client commands before control
    /// queries, so a query observes everything queued ahead of it.
    pub async fn run(mut self) {
        tracing::info!(
            timeout_secs = self.config.timeout_secs,
            drivers = ?self.drivers.names(),
            "hub started"
        );

        loop {
            tokio::select! {
                biased;

                Some(client) = self.register_rx.recv() => {
                    self.register(client);
                }
                Some(client) = self.unregister_rx.recv() => {
                    self.unregister(&client);
                }
                Some(client) = self.unreachable_rx.recv() => {
                    tracing::debug!(client_id = %client.id(), "client unreachable");
                    self.unregister(&client);
                }
                Some(room_id) = self.expired_rx.recv() => {
                    self.expire(&room_id);
                }
                message = self.messages_rx.recv() => match message {
                    Some(message) => self.dispatch(message),
                    None => break,
                },
                Some(control) = self.control_rx.recv() => {
                    if !self.control(control) {
                        break;
                    }
                }
            }
        }

        self.stop();
    }

    // -----------------------------------------------------------------
    // Clients
    // -----------------------------------------------------------------

    fn register(&mut self, client: ClientRef) {
        let id = client.id();
        if self.clients.contains_key(&id) {
            return;
        }
        tracing::info!(client_id = %id, name = client.name(), bot = client.is_bot(), "client registered");
        self.clients.insert(id, client);
    }

    fn unregister(&mut self, client: &ClientRef) {
        let Some(client) = self.clients.remove(&client.id()) else {
            tracing::debug!(client_id = %client.id(), "unregister for unknown client");
            return;
        };
        client.close();

        if let Some(room_id) = client.room() {
            if let Some(room) = self.rooms.get_mut(&room_id) {
                let outcome = isolate(&room_id, || room.remove_client(&client))
                    .unwrap_or_else(|| {
                        if room.has_humans() {
                            RoomOutcome::Continue
                        } else {
                            RoomOutcome::Destroy(DestroyReason::NoHumans)
                        }
                    });
                self.apply(&room_id, outcome);
            }
            client.set_room(None);
        }
        tracing::info!(client_id = %client.id(), "client unregistered");
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    fn dispatch(&mut self, message: IncomingMessage) {
        let author_id = message.author.id();
        if !self.clients.contains_key(&author_id) {
            tracing::debug!(client_id = %author_id, kind = %message.kind, "message from unregistered client dropped");
            return;
        }

        let result = match &message.kind {
            MessageType::CreateRoom => self.create_room_command(&message),
            MessageType::JoinRoom => self.join_room_command(&message),
            _ => self.room_command(&message),
        };

        if let Err(e) = result {
            tracing::debug!(
                client_id = %author_id,
                kind = %message.kind,
                code = e.code(),
                error = %e,
                "command rejected"
            );
            self.emitter.emit(
                Event::MessageCreated,
                slice::from_ref(&message.author),
                &e.to_message(),
            );
        }
    }

    fn create_room_command(
        &mut self,
        message: &IncomingMessage,
    ) -> Result<(), RoomError> {
        let params: CreateRoomParams = message.params()?;
        let room_id =
            self.create_room(Arc::clone(&message.author), &params.driver)?;
        self.emitter.emit(
            Event::MessageCreated,
            slice::from_ref(&message.author),
            &OutgoingMessage::RoomCreated { room_id },
        );
        Ok(())
    }

    fn join_room_command(
        &mut self,
        message: &IncomingMessage,
    ) -> Result<(), RoomError> {
        let params: JoinRoomParams = message.params()?;
        if let Some(current) = message.author.room() {
            return Err(RoomError::AlreadyInRoom(current));
        }
        let room_id = params.room_id;
        let room = self
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| RoomError::RoomNotFound(room_id.clone()))?;
        match isolate(&room_id, || room.join(Arc::clone(&message.author))) {
            Some(result) => result.map(|_| ()),
            None => Ok(()),
        }
    }

    /// Routes a non-lobby command to the author's room.
    fn room_command(&mut self, message: &IncomingMessage) -> Result<(), RoomError> {
        let room_id = message.author.room().ok_or(RoomError::NotInRoom)?;
        let Some(room) = self.rooms.get_mut(&room_id) else {
            message.author.set_room(None);
            return Err(RoomError::NotInRoom);
        };
        match isolate(&room_id, || room.parse(message)) {
            Some(Ok(outcome)) => {
                self.apply(&room_id, outcome);
                Ok(())
            }
            Some(Err(e)) => Err(e),
            // The fault is logged; the author gets no reply.
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------
    // Rooms
    // -----------------------------------------------------------------

    fn create_room(
        &mut self,
        owner: ClientRef,
        driver_name: &str,
    ) -> Result<RoomId, RoomError> {
        if let Some(current) = owner.room() {
            return Err(RoomError::AlreadyInRoom(current));
        }
        let driver = self
            .drivers
            .create(driver_name)
            .ok_or_else(|| RoomError::UnknownDriver(driver_name.to_string()))?;

        let room_id = self.fresh_room_id();
        let mut room = Room::new(
            room_id.clone(),
            driver_name,
            driver,
            owner,
            Arc::clone(&self.emitter),
        );
        if let Some(after) = self.config.idle_timeout() {
            let expired = self.expired_tx.clone();
            let id = room_id.clone();
            room.set_idle_timer(IdleTimer::arm(after, move || {
                let _ = expired.send(id);
            }));
        }
        self.rooms.insert(room_id.clone(), room);
        Ok(room_id)
    }

    fn fresh_room_id(&self) -> RoomId {
        loop {
            let id = RoomId::generate();
            if !self.rooms.contains_key(&id) {
                return id;
            }
        }
    }

    /// Idle timer fired. Only an unstarted room that still exists goes.
    fn expire(&mut self, room_id: &RoomId) {
        match self.rooms.get(room_id) {
            Some(room) if !room.started() => {
                tracing::info!(room_id = %room_id, "room idle timeout");
                self.destroy_room(room_id, DestroyReason::Timeout);
            }
            _ => {
                tracing::debug!(room_id = %room_id, "stale idle timer ignored");
            }
        }
    }

    fn apply(&mut self, room_id: &RoomId, outcome: RoomOutcome) {
        if let RoomOutcome::Destroy(reason) = outcome {
            self.destroy_room(room_id, reason);
        }
    }

    /// Removes the room from the registry and tears it down. A room that
    /// is already gone is left alone.
    fn destroy_room(&mut self, room_id: &RoomId, reason: DestroyReason) {
        if let Some(mut room) = self.rooms.remove(room_id) {
            room.destroy(reason);
        }
    }

    // -----------------------------------------------------------------
    // Control
    // -----------------------------------------------------------------

    /// Returns `false` when the loop should stop.
    fn control(&mut self, control: Control) -> bool {
        match control {
            Control::CreateRoom {
                owner,
                driver,
                reply,
            } => {
                self.register(Arc::clone(&owner));
                let _ = reply.send(self.create_room(owner, &driver));
            }
            Control::Stats { reply } => {
                let _ = reply.send(HubStats {
                    clients: self.clients.len(),
                    rooms: self.rooms.len(),
                });
            }
            Control::RoomInfo { room_id, reply } => {
                let _ = reply.send(self.rooms.get(&room_id).map(Room::info));
            }
            Control::Shutdown => return false,
        }
        true
    }

    fn stop(&mut self) {
        let room_ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        for room_id in &room_ids {
            self.destroy_room(room_id, DestroyReason::Shutdown);
        }
        for (_, client) in self.clients.drain() {
            client.close();
        }
        tracing::info!("hub stopped");
    }
}

/// Runs room code, absorbing any panic it raises.
///
/// Returns `None` after a panic. The room stays registered and keeps
/// serving later commands.
fn isolate<T>(room_id: &RoomId, f: impl FnOnce() -> T) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(
                room_id = %room_id,
                panic = panic_message(payload.as_ref()),
                "recovered from panic in room"
            );
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

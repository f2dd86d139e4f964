//! A game session: members, owner, driver, idle timer.
//!
//! Rooms are not actors. The hub owns every room in its registry and
//! calls into them from its single loop, so a room method always runs to
//! completion before the next event is looked at. That is what keeps the
//! membership list, the owner pointer and the `started` flag consistent
//! without locks.

use std::panic::{self, AssertUnwindSafe};
use std::slice;
use std::sync::Arc;

use serde_json::Value;
use tablehub_client::{ClientRef, IncomingMessage};
use tablehub_protocol::{
    ChatParams, ClientId, ClientOutReason, DestroyReason, KickPlayerParams,
    MessageType, OutgoingMessage, PlayerSummary, RoomId,
};

use crate::{
    Driver, DriverConfig, Emitter, Event, IdleTimer, RoomError, RoomState,
    Seat,
};

/// What the hub should do with a room after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomOutcome {
    /// Keep it.
    Continue,
    /// Destroy it for this reason and drop it from the registry.
    Destroy(DestroyReason),
}

/// A snapshot of room metadata (not the game state itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub room_id: RoomId,
    /// Name the driver was registered under.
    pub driver: String,
    pub state: RoomState,
    pub owner: ClientId,
    /// Member ids in seat order.
    pub players: Vec<ClientId>,
    pub max_players: usize,
}

impl RoomInfo {
    pub fn player_count(&self) -> usize {
        self.players.len()
    }
}

pub struct Room {
    id: RoomId,
    driver_name: String,
    driver: Box<dyn Driver>,
    config: DriverConfig,
    owner: ClientRef,
    clients: Vec<ClientRef>,
    state: RoomState,
    timer: Option<IdleTimer>,
    emitter: Arc<dyn Emitter>,
}

impl Room {
    /// Creates a room with `owner` as its only member, in seat 0.
    pub fn new(
        id: RoomId,
        driver_name: impl Into<String>,
        driver: Box<dyn Driver>,
        owner: ClientRef,
        emitter: Arc<dyn Emitter>,
    ) -> Self {
        let config = driver.config();
        let driver_name = driver_name.into();
        owner.set_room(Some(id.clone()));
        tracing::info!(
            room_id = %id,
            owner = %owner.id(),
            driver = %driver_name,
            "room created"
        );
        Self {
            id,
            driver_name,
            driver,
            config,
            clients: vec![Arc::clone(&owner)],
            owner,
            state: RoomState::Created,
            timer: None,
            emitter,
        }
    }

    /// Attaches the idle timer. Replacing an existing one cancels it.
    pub fn set_idle_timer(&mut self, timer: IdleTimer) {
        if self.state.is_joinable() {
            self.timer = Some(timer);
        }
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn owner(&self) -> &ClientRef {
        &self.owner
    }

    /// Members in seat order.
    pub fn clients(&self) -> &[ClientRef] {
        &self.clients
    }

    pub fn state(&self) -> RoomState {
        self.state
    }

    pub fn started(&self) -> bool {
        self.state.is_started()
    }

    pub fn has_member(&self, id: ClientId) -> bool {
        self.seat_of(id).is_some()
    }

    pub fn has_humans(&self) -> bool {
        self.clients.iter().any(|c| !c.is_bot())
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.id.clone(),
            driver: self.driver_name.clone(),
            state: self.state,
            owner: self.owner.id(),
            players: self.clients.iter().map(|c| c.id()).collect(),
            max_players: self.config.max_players,
        }
    }

    fn seat_of(&self, id: ClientId) -> Option<usize> {
        self.clients.iter().position(|c| c.id() == id)
    }

    fn is_owner(&self, client: &ClientRef) -> bool {
        self.owner.id() == client.id()
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Seats `client` and returns its seat number.
    ///
    /// Capacity is checked before the started flag, so a full running
    /// room reports `room-full`.
    pub fn join(&mut self, client: ClientRef) -> Result<usize, RoomError> {
        if self.state == RoomState::Destroyed {
            return Err(RoomError::RoomNotFound(self.id.clone()));
        }
        if self.has_member(client.id()) {
            return Err(RoomError::AlreadyInRoom(self.id.clone()));
        }
        if self.clients.len() >= self.config.max_players {
            return Err(RoomError::RoomFull(self.id.clone()));
        }
        if self.started() {
            if !self.config.late_join {
                return Err(RoomError::AlreadyStarted(self.id.clone()));
            }
            self.driver.add_player(&Seat::of(client.as_ref()))?;
        }

        let seat = self.clients.len();
        client.set_room(Some(self.id.clone()));
        self.clients.push(Arc::clone(&client));
        tracing::info!(
            room_id = %self.id,
            client_id = %client.id(),
            seat,
            "client joined room"
        );

        self.send_to(
            &client,
            &OutgoingMessage::RoomJoined {
                room_id: self.id.clone(),
                player_number: seat,
            },
        );
        self.broadcast_players();

        if self.started() {
            self.broadcast_state();
        } else if self.config.auto_start
            && self.clients.len() >= self.config.min_players
        {
            if let Err(e) = self.start_game() {
                tracing::warn!(room_id = %self.id, error = %e, "auto-start failed");
            }
        }
        Ok(seat)
    }

    /// Takes `client` out of the room.
    ///
    /// Ownership passes to the earliest-seated human when the owner
    /// leaves. Returns `Destroy(NoHumans)` once no human is left; the
    /// caller then destroys the room, which notifies any remaining bots.
    pub fn remove_client(&mut self, client: &ClientRef) -> RoomOutcome {
        let Some(seat) = self.seat_of(client.id()) else {
            return RoomOutcome::Continue;
        };
        let removed = self.clients.remove(seat);
        removed.set_room(None);
        tracing::info!(
            room_id = %self.id,
            client_id = %removed.id(),
            seat,
            "client removed from room"
        );
        if self.started() {
            self.release_seat(seat);
        }

        if !self.has_humans() {
            return RoomOutcome::Destroy(DestroyReason::NoHumans);
        }
        if self.is_owner(&removed) {
            if let Some(heir) = self.clients.iter().find(|c| !c.is_bot()) {
                self.owner = Arc::clone(heir);
                tracing::info!(
                    room_id = %self.id,
                    owner = %self.owner.id(),
                    "room ownership transferred"
                );
            }
        }
        self.broadcast_players();
        RoomOutcome::Continue
    }

    /// Tells the driver a seat is gone. Membership is already updated, so
    /// a panicking driver can't leave a departed client seated.
    fn release_seat(&mut self, seat: usize) {
        let driver = &mut self.driver;
        let released =
            panic::catch_unwind(AssertUnwindSafe(|| driver.remove_player(seat)));
        if released.is_err() {
            tracing::error!(
                room_id = %self.id,
                seat,
                "driver panicked while releasing a seat"
            );
        }
    }

    // -----------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------

    /// Handles a command from a member.
    ///
    /// Lobby commands are rejected here: a client already in a room
    /// can't create or join another one.
    pub fn parse(
        &mut self,
        message: &IncomingMessage,
    ) -> Result<RoomOutcome, RoomError> {
        let Some(seat) = self.seat_of(message.author.id()) else {
            return Err(RoomError::NotInRoom);
        };
        match &message.kind {
            MessageType::KickPlayer => self.kick_player(message),
            MessageType::TerminateRoom => self.terminate(message),
            MessageType::StartGame => {
                self.require_owner(message)?;
                self.start_game()?;
                Ok(RoomOutcome::Continue)
            }
            MessageType::LeaveRoom => Ok(self.leave(&message.author)),
            MessageType::ChatRoom => self.chat(message),
            MessageType::CreateRoom | MessageType::JoinRoom => {
                Err(RoomError::AlreadyInRoom(self.id.clone()))
            }
            MessageType::Game(command) => {
                self.game_command(seat, command, &message.params)
            }
        }
    }

    fn require_owner(&self, message: &IncomingMessage) -> Result<(), RoomError> {
        if self.is_owner(&message.author) {
            Ok(())
        } else {
            Err(RoomError::Forbidden)
        }
    }

    fn kick_player(
        &mut self,
        message: &IncomingMessage,
    ) -> Result<RoomOutcome, RoomError> {
        self.require_owner(message)?;
        let params: KickPlayerParams = message.params()?;
        let number = params.player_number;
        let target = usize::try_from(number)
            .ok()
            .and_then(|seat| self.clients.get(seat))
            .cloned()
            .ok_or(RoomError::InexistentClient(number))?;
        if self.is_owner(&target) {
            return Err(RoomError::OwnerNotRemovable);
        }

        let outcome = self.remove_client(&target);
        tracing::info!(room_id = %self.id, client_id = %target.id(), "client kicked");
        self.emitter.emit(
            Event::ClientOut,
            slice::from_ref(&target),
            &OutgoingMessage::ClientOut {
                reason: ClientOutReason::Kicked,
            },
        );
        Ok(outcome)
    }

    fn terminate(
        &mut self,
        message: &IncomingMessage,
    ) -> Result<RoomOutcome, RoomError> {
        self.require_owner(message)?;
        Ok(RoomOutcome::Destroy(DestroyReason::Terminated))
    }

    fn leave(&mut self, client: &ClientRef) -> RoomOutcome {
        let outcome = self.remove_client(client);
        self.emitter.emit(
            Event::ClientOut,
            slice::from_ref(client),
            &OutgoingMessage::ClientOut {
                reason: ClientOutReason::Left,
            },
        );
        outcome
    }

    fn chat(&self, message: &IncomingMessage) -> Result<RoomOutcome, RoomError> {
        let params: ChatParams = message.params()?;
        self.broadcast(&OutgoingMessage::Chat {
            author: message.author.name().to_string(),
            msg: params.msg,
        });
        Ok(RoomOutcome::Continue)
    }

    fn game_command(
        &mut self,
        seat: usize,
        command: &str,
        params: &Value,
    ) -> Result<RoomOutcome, RoomError> {
        let was_started = self.started();
        self.driver.parse(seat, command, params)?;
        if was_started {
            self.broadcast_state();
        } else {
            self.sync_started();
        }
        if self.driver.is_over() {
            return Ok(RoomOutcome::Destroy(DestroyReason::GameOver));
        }
        Ok(RoomOutcome::Continue)
    }

    /// Starts the game with the current members.
    pub fn start_game(&mut self) -> Result<(), RoomError> {
        match self.state {
            RoomState::Created => {}
            RoomState::Started => {
                return Err(RoomError::AlreadyStarted(self.id.clone()));
            }
            RoomState::Destroyed => {
                return Err(RoomError::RoomNotFound(self.id.clone()));
            }
        }
        let have = self.clients.len();
        let need = self.config.min_players;
        if have < need {
            return Err(RoomError::NotEnoughPlayers { have, need });
        }
        let seats: Vec<Seat> =
            self.clients.iter().map(|c| Seat::of(c.as_ref())).collect();
        self.driver.start(&seats)?;
        self.sync_started();
        Ok(())
    }

    /// Flips the room to `Started` the first time the driver reports it.
    fn sync_started(&mut self) {
        if !self.driver.started() || !self.transition(RoomState::Started) {
            return;
        }
        tracing::info!(
            room_id = %self.id,
            players = self.clients.len(),
            "game started"
        );
        self.broadcast_state();
    }

    /// Moves to `target` if the state machine allows it. Leaving `Created`
    /// either way cancels the idle timer.
    fn transition(&mut self, target: RoomState) -> bool {
        if !self.state.can_transition_to(target) {
            return false;
        }
        self.state = target;
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        true
    }

    // -----------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------

    /// Notifies every member, detaches them, and cancels the timer.
    /// Calling it again is a no-op.
    pub fn destroy(&mut self, reason: DestroyReason) {
        if !self.transition(RoomState::Destroyed) {
            return;
        }

        let members = std::mem::take(&mut self.clients);
        for client in &members {
            client.set_room(None);
        }
        self.emitter.emit(
            Event::RoomDestroyed,
            &members,
            &OutgoingMessage::RoomDestroyed { reason },
        );
        tracing::info!(room_id = %self.id, %reason, "room destroyed");
    }

    // -----------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------

    fn send_to(&self, client: &ClientRef, message: &OutgoingMessage) {
        self.emitter
            .emit(Event::MessageCreated, slice::from_ref(client), message);
    }

    fn broadcast(&self, message: &OutgoingMessage) {
        self.emitter.emit(Event::MessageCreated, &self.clients, message);
    }

    fn broadcast_players(&self) {
        let players = self
            .clients
            .iter()
            .map(|c| PlayerSummary {
                name: c.name().to_string(),
                bot: c.is_bot(),
                owner: self.is_owner(c),
            })
            .collect();
        self.broadcast(&OutgoingMessage::Players { players });
    }

    /// Sends every member the common state, flagged with whether it's
    /// their turn, followed by their private state if the driver has one.
    fn broadcast_state(&self) {
        let actor = self.driver.current_actor();
        let state = self.driver.common_state();
        for (seat, client) in self.clients.iter().enumerate() {
            self.send_to(
                client,
                &OutgoingMessage::Update {
                    enabled: actor == Some(seat),
                    state: state.clone(),
                },
            );
            let private = self.driver.player_state(seat);
            if !private.is_null() {
                self.send_to(client, &OutgoingMessage::Direct { state: private });
            }
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("driver", &self.driver_name)
            .field("state", &self.state)
            .field("owner", &self.owner.id())
            .field("members", &self.clients.len())
            .finish()
    }
}

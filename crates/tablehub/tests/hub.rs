//! Integration tests for the hub loop: membership, lobby commands, room
//! lifetime, panic isolation and dead-peer handling.
//!
//! Clients are real `ChannelClient`s; the tests read what the hub pushed
//! into their mailboxes. `HubHandle::stats` doubles as a barrier: the
//! hub answers control queries only after everything queued ahead of
//! them has been applied.

use std::time::Duration;

use serde_json::{Value, json};
use tablehub::prelude::*;
use tablehub::protocol::ClientOutReason;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

// =========================================================================
// Mock driver
// =========================================================================

#[derive(Default)]
struct CounterDriver {
    started: bool,
    count: u32,
    /// Panics when a seat is released mid-game.
    brittle: bool,
}

impl Driver for CounterDriver {
    fn config(&self) -> DriverConfig {
        DriverConfig {
            min_players: 2,
            max_players: 4,
            ..DriverConfig::default()
        }
    }

    fn start(&mut self, _players: &[Seat]) -> Result<(), DriverError> {
        self.started = true;
        Ok(())
    }

    fn parse(
        &mut self,
        _seat: usize,
        command: &str,
        _params: &Value,
    ) -> Result<(), DriverError> {
        match command {
            "increment" => {
                self.count += 1;
                Ok(())
            }
            "explode" => panic!("A panic"),
            other => Err(DriverError::new(format!("unknown command {other}"))),
        }
    }

    fn started(&self) -> bool {
        self.started
    }

    fn current_actor(&self) -> Option<usize> {
        self.started.then_some(0)
    }

    fn common_state(&self) -> Value {
        json!({ "count": self.count })
    }

    fn remove_player(&mut self, _seat: usize) {
        if self.brittle {
            panic!("seat bookkeeping corrupted");
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

struct Player {
    client: ClientRef,
    mailbox: mpsc::Receiver<Vec<u8>>,
}

impl Player {
    fn human(name: &str) -> Self {
        Self::with_buffer(name, 64)
    }

    fn bot(name: &str) -> Self {
        let (client, mailbox) = ChannelClient::bot(name, 64);
        Self { client, mailbox }
    }

    fn with_buffer(name: &str, buffer: usize) -> Self {
        let (client, mailbox) = ChannelClient::new(name, buffer);
        Self { client, mailbox }
    }

    fn id(&self) -> ClientId {
        self.client.id()
    }

    /// Everything delivered so far, decoded.
    fn drain(&mut self) -> Vec<OutgoingMessage> {
        let mut out = Vec::new();
        while let Ok(bytes) = self.mailbox.try_recv() {
            out.push(serde_json::from_slice(&bytes).expect("valid JSON"));
        }
        out
    }

    async fn send(&self, hub: &HubHandle, kind: &str, params: Value) {
        let message = IncomingMessage::new(
            self.client.clone(),
            MessageType::from(kind),
            params,
        );
        hub.dispatch(message).await.unwrap();
    }
}

fn start_hub(config: HubConfig) -> (HubHandle, JoinHandle<()>) {
    let drivers = DriverRegistry::new()
        .with("counter", CounterDriver::default)
        .with("brittle", || CounterDriver {
            brittle: true,
            ..CounterDriver::default()
        });
    let (hub, handle) = Hub::new(config, drivers);
    (handle, hub.spawn())
}

fn no_timeout() -> HubConfig {
    HubConfig {
        timeout_secs: 0,
        ..HubConfig::default()
    }
}

async fn settle(hub: &HubHandle) -> HubStats {
    hub.stats().await.unwrap()
}

/// Registers `owner` and `others`, creates a counter room, and joins
/// everyone to it.
async fn room_with(
    hub: &HubHandle,
    owner: &Player,
    others: &[&Player],
) -> RoomId {
    let room_id = hub.create_room(owner.client.clone(), "counter").await.unwrap();
    for player in others {
        hub.register(player.client.clone()).await.unwrap();
        player
            .send(hub, "join-room", json!({ "roomID": room_id }))
            .await;
    }
    settle(hub).await;
    room_id
}

// =========================================================================
// Membership
// =========================================================================

#[tokio::test]
async fn test_register_and_unregister_track_client_count() {
    let (hub, _task) = start_hub(no_timeout());
    let alice = Player::human("alice");
    let bob = Player::human("bob");

    hub.register(alice.client.clone()).await.unwrap();
    hub.register(bob.client.clone()).await.unwrap();
    hub.register(bob.client.clone()).await.unwrap();
    assert_eq!(settle(&hub).await.clients, 2);

    hub.unregister(bob.client.clone()).await.unwrap();
    assert_eq!(settle(&hub).await.clients, 1);

    // Unknown client: no-op.
    hub.unregister(bob.client.clone()).await.unwrap();
    assert_eq!(settle(&hub).await.clients, 1);
}

#[tokio::test]
async fn test_unregister_closes_mailbox() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    hub.register(alice.client.clone()).await.unwrap();

    hub.unregister(alice.client.clone()).await.unwrap();
    settle(&hub).await;

    assert!(alice.mailbox.recv().await.is_none());
}

#[tokio::test]
async fn test_message_from_unregistered_client_is_dropped() {
    let (hub, _task) = start_hub(no_timeout());
    let mut stranger = Player::human("eve");

    stranger
        .send(&hub, "create-room", json!({ "driver": "counter" }))
        .await;

    let stats = settle(&hub).await;
    assert_eq!(stats.rooms, 0);
    assert!(stranger.drain().is_empty());
}

// =========================================================================
// Lobby commands
// =========================================================================

#[tokio::test]
async fn test_create_room_command_replies_with_id() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    hub.register(alice.client.clone()).await.unwrap();

    alice
        .send(&hub, "create-room", json!({ "driver": "counter" }))
        .await;
    assert_eq!(settle(&hub).await.rooms, 1);

    let received = alice.drain();
    let [OutgoingMessage::RoomCreated { room_id }] = received.as_slice() else {
        panic!("expected room-created, got {received:?}");
    };
    assert_eq!(alice.client.room().as_ref(), Some(room_id));

    let info = hub.room_info(room_id).await.unwrap().unwrap();
    assert_eq!(info.owner, alice.id());
    assert_eq!(info.players, vec![alice.id()]);
    assert_eq!(info.state, RoomState::Created);
}

#[tokio::test]
async fn test_create_room_with_unknown_driver_is_rejected() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    hub.register(alice.client.clone()).await.unwrap();

    alice
        .send(&hub, "create-room", json!({ "driver": "chess" }))
        .await;
    assert_eq!(settle(&hub).await.rooms, 0);

    let received = alice.drain();
    assert!(matches!(
        received.as_slice(),
        [OutgoingMessage::Error { code, .. }] if code == "unknown-driver"
    ));
}

#[tokio::test]
async fn test_create_room_while_in_room_is_already_in_room() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    room_with(&hub, &alice, &[]).await;

    alice
        .send(&hub, "create-room", json!({ "driver": "counter" }))
        .await;
    assert_eq!(settle(&hub).await.rooms, 1);

    let err = hub
        .create_room(alice.client.clone(), "counter")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TablehubError::Room(RoomError::AlreadyInRoom(_))
    ));
    assert!(matches!(
        alice.drain().as_slice(),
        [OutgoingMessage::Error { code, .. }] if code == "already-in-room"
    ));
}

#[tokio::test]
async fn test_create_then_join_has_two_members() {
    let (hub, _task) = start_hub(no_timeout());
    let alice = Player::human("alice");
    let mut bob = Player::human("bob");

    let room_id = room_with(&hub, &alice, &[&bob]).await;

    let info = hub.room_info(&room_id).await.unwrap().unwrap();
    assert_eq!(info.player_count(), 2);
    assert_eq!(bob.client.room(), Some(room_id.clone()));

    let received = bob.drain();
    assert_eq!(
        received[0],
        OutgoingMessage::RoomJoined {
            room_id,
            player_number: 1,
        }
    );
}

#[tokio::test]
async fn test_join_missing_room_is_room_not_found() {
    let (hub, _task) = start_hub(no_timeout());
    let mut bob = Player::human("bob");
    hub.register(bob.client.clone()).await.unwrap();

    bob.send(&hub, "join-room", json!({ "roomID": "nope" })).await;
    settle(&hub).await;

    assert!(matches!(
        bob.drain().as_slice(),
        [OutgoingMessage::Error { code, .. }] if code == "room-not-found"
    ));
}

#[tokio::test]
async fn test_room_command_from_lobby_is_not_in_room() {
    let (hub, _task) = start_hub(no_timeout());
    let mut bob = Player::human("bob");
    hub.register(bob.client.clone()).await.unwrap();

    bob.send(&hub, "increment", Value::Null).await;
    settle(&hub).await;

    assert!(matches!(
        bob.drain().as_slice(),
        [OutgoingMessage::Error { code, .. }] if code == "not-in-room"
    ));
}

// =========================================================================
// Room commands
// =========================================================================

#[tokio::test]
async fn test_terminate_by_non_owner_keeps_room() {
    let (hub, _task) = start_hub(no_timeout());
    let alice = Player::human("alice");
    let mut bob = Player::human("bob");
    let room_id = room_with(&hub, &alice, &[&bob]).await;
    bob.drain();

    bob.send(&hub, "terminate-room", Value::Null).await;
    assert_eq!(settle(&hub).await.rooms, 1);

    assert!(hub.room_info(&room_id).await.unwrap().is_some());
    assert!(matches!(
        bob.drain().as_slice(),
        [OutgoingMessage::Error { code, .. }] if code == "forbidden"
    ));
}

#[tokio::test]
async fn test_terminate_by_owner_destroys_room() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    let mut bob = Player::human("bob");
    let room_id = room_with(&hub, &alice, &[&bob]).await;
    alice.drain();
    bob.drain();

    alice.send(&hub, "terminate-room", Value::Null).await;
    assert_eq!(settle(&hub).await.rooms, 0);

    assert!(hub.room_info(&room_id).await.unwrap().is_none());
    let destroyed = OutgoingMessage::RoomDestroyed {
        reason: DestroyReason::Terminated,
    };
    assert_eq!(alice.drain(), vec![destroyed.clone()]);
    assert_eq!(bob.drain(), vec![destroyed]);
    assert_eq!(alice.client.room(), None);
    assert_eq!(bob.client.room(), None);
}

#[tokio::test]
async fn test_kicked_member_receives_one_notice_and_nothing_after() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    let mut bob = Player::human("bob");
    let room_id = room_with(&hub, &alice, &[&bob]).await;
    alice.drain();
    bob.drain();

    alice
        .send(&hub, "kick-player", json!({ "playerNumber": 1 }))
        .await;
    alice.send(&hub, "chat-room", json!({ "msg": "bye" })).await;
    settle(&hub).await;

    assert_eq!(
        bob.drain(),
        vec![OutgoingMessage::ClientOut {
            reason: ClientOutReason::Kicked
        }]
    );
    assert_eq!(bob.client.room(), None);
    let info = hub.room_info(&room_id).await.unwrap().unwrap();
    assert_eq!(info.players, vec![alice.id()]);
    assert!(
        alice
            .drain()
            .iter()
            .any(|m| matches!(m, OutgoingMessage::Chat { msg, .. } if msg == "bye"))
    );
}

#[tokio::test]
async fn test_kick_by_non_owner_is_forbidden() {
    let (hub, _task) = start_hub(no_timeout());
    let alice = Player::human("alice");
    let mut bob = Player::human("bob");
    let room_id = room_with(&hub, &alice, &[&bob]).await;
    bob.drain();

    bob.send(&hub, "kick-player", json!({ "playerNumber": 0 }))
        .await;
    settle(&hub).await;

    assert!(matches!(
        bob.drain().as_slice(),
        [OutgoingMessage::Error { code, .. }] if code == "forbidden"
    ));
    let info = hub.room_info(&room_id).await.unwrap().unwrap();
    assert_eq!(info.player_count(), 2);
}

#[tokio::test]
async fn test_kick_owner_index_is_owner_not_removable() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    let bob = Player::human("bob");
    room_with(&hub, &alice, &[&bob]).await;
    alice.drain();

    alice
        .send(&hub, "kick-player", json!({ "playerNumber": 0 }))
        .await;
    settle(&hub).await;

    assert!(matches!(
        alice.drain().as_slice(),
        [OutgoingMessage::Error { code, .. }] if code == "owner-not-removable"
    ));
}

#[tokio::test]
async fn test_start_game_broadcasts_state() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    let mut bob = Player::human("bob");
    let room_id = room_with(&hub, &alice, &[&bob]).await;
    alice.drain();
    bob.drain();

    alice.send(&hub, "start-game", Value::Null).await;
    alice.send(&hub, "increment", Value::Null).await;
    settle(&hub).await;

    let info = hub.room_info(&room_id).await.unwrap().unwrap();
    assert_eq!(info.state, RoomState::Started);
    assert_eq!(
        bob.drain(),
        vec![
            OutgoingMessage::Update {
                enabled: false,
                state: json!({ "count": 0 }),
            },
            OutgoingMessage::Update {
                enabled: false,
                state: json!({ "count": 1 }),
            },
        ]
    );
    assert_eq!(alice.drain().len(), 2);
}

// =========================================================================
// Room lifetime
// =========================================================================

#[tokio::test]
async fn test_unregistering_last_human_destroys_room() {
    let (hub, _task) = start_hub(no_timeout());
    let alice = Player::human("alice");
    let mut robo = Player::bot("robo");
    room_with(&hub, &alice, &[&robo]).await;
    robo.drain();

    hub.unregister(alice.client.clone()).await.unwrap();
    let stats = settle(&hub).await;

    assert_eq!(stats.rooms, 0);
    assert_eq!(stats.clients, 1);
    assert_eq!(alice.client.room(), None);
    assert_eq!(robo.client.room(), None);
    assert_eq!(
        robo.drain(),
        vec![OutgoingMessage::RoomDestroyed {
            reason: DestroyReason::NoHumans
        }]
    );
}

#[tokio::test]
async fn test_owner_leaving_hands_room_to_next_human() {
    let (hub, _task) = start_hub(no_timeout());
    let alice = Player::human("alice");
    let robo = Player::bot("robo");
    let bob = Player::human("bob");
    let room_id = room_with(&hub, &alice, &[&robo, &bob]).await;

    alice.send(&hub, "leave-room", Value::Null).await;
    settle(&hub).await;

    let info = hub.room_info(&room_id).await.unwrap().unwrap();
    assert_eq!(info.owner, bob.id());
    assert_eq!(info.players, vec![robo.id(), bob.id()]);
}

#[tokio::test(start_paused = true)]
async fn test_unstarted_room_is_destroyed_after_timeout() {
    let config = HubConfig {
        timeout_secs: 5,
        ..HubConfig::default()
    };
    let (hub, _task) = start_hub(config);
    let mut alice = Player::human("alice");
    let room_id = room_with(&hub, &alice, &[]).await;

    tokio::time::sleep(Duration::from_secs(4)).await;
    assert_eq!(settle(&hub).await.rooms, 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(settle(&hub).await.rooms, 0);
    assert!(hub.room_info(&room_id).await.unwrap().is_none());
    assert_eq!(alice.client.room(), None);
    assert_eq!(
        alice.drain(),
        vec![OutgoingMessage::RoomDestroyed {
            reason: DestroyReason::Timeout
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn test_started_room_survives_timeout() {
    let config = HubConfig {
        timeout_secs: 5,
        ..HubConfig::default()
    };
    let (hub, _task) = start_hub(config);
    let alice = Player::human("alice");
    let bob = Player::human("bob");
    let room_id = room_with(&hub, &alice, &[&bob]).await;

    alice.send(&hub, "start-game", Value::Null).await;
    settle(&hub).await;

    tokio::time::sleep(Duration::from_secs(10)).await;
    let info = hub.room_info(&room_id).await.unwrap();
    assert_eq!(info.map(|i| i.state), Some(RoomState::Started));
}

#[tokio::test(start_paused = true)]
async fn test_terminated_room_timer_is_harmless() {
    let config = HubConfig {
        timeout_secs: 5,
        ..HubConfig::default()
    };
    let (hub, _task) = start_hub(config);
    let alice = Player::human("alice");
    room_with(&hub, &alice, &[]).await;

    alice.send(&hub, "terminate-room", Value::Null).await;
    assert_eq!(settle(&hub).await.rooms, 0);

    // A fresh room created after the first one is gone keeps its own
    // full timeout.
    tokio::time::sleep(Duration::from_secs(3)).await;
    let room_id = hub.create_room(alice.client.clone(), "counter").await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(hub.room_info(&room_id).await.unwrap().is_some());
}

// =========================================================================
// Fault isolation and delivery
// =========================================================================

#[tokio::test]
async fn test_panic_in_room_is_absorbed() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    let mut carol = Player::human("carol");
    let room_id = room_with(&hub, &alice, &[]).await;
    let other_room = room_with(&hub, &carol, &[]).await;
    alice.drain();
    carol.drain();

    alice.send(&hub, "explode", Value::Null).await;
    let stats = settle(&hub).await;

    // No reply for the faulting command; both rooms still served.
    assert_eq!(stats.rooms, 2);
    assert!(alice.drain().is_empty());

    alice.send(&hub, "chat-room", json!({ "msg": "still here" })).await;
    carol.send(&hub, "chat-room", json!({ "msg": "me too" })).await;
    settle(&hub).await;

    assert!(hub.room_info(&room_id).await.unwrap().is_some());
    assert!(hub.room_info(&other_room).await.unwrap().is_some());
    assert_eq!(
        alice.drain(),
        vec![OutgoingMessage::Chat {
            author: "alice".into(),
            msg: "still here".into(),
        }]
    );
    assert_eq!(carol.drain().len(), 1);
}

#[tokio::test]
async fn test_panicking_seat_release_still_reclaims_room() {
    let (hub, _task) = start_hub(no_timeout());
    let alice = Player::human("alice");
    let bob = Player::human("bob");
    let room_id = hub.create_room(alice.client.clone(), "brittle").await.unwrap();
    hub.register(bob.client.clone()).await.unwrap();
    bob.send(&hub, "join-room", json!({ "roomID": room_id })).await;
    alice.send(&hub, "start-game", Value::Null).await;
    settle(&hub).await;
    assert_eq!(
        hub.room_info(&room_id).await.unwrap().map(|info| info.state),
        Some(RoomState::Started)
    );

    hub.unregister(bob.client.clone()).await.unwrap();
    settle(&hub).await;
    let info = hub.room_info(&room_id).await.unwrap().expect("room alive");
    assert_eq!(info.players, vec![alice.id()]);
    assert_eq!(bob.client.room(), None);

    hub.unregister(alice.client.clone()).await.unwrap();
    let stats = settle(&hub).await;
    assert_eq!(stats, HubStats { clients: 0, rooms: 0 });
    assert!(hub.room_info(&room_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_full_mailbox_disconnects_client() {
    let (hub, _task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    let slow = Player::with_buffer("slow", 1);
    let room_id = room_with(&hub, &alice, &[&slow]).await;

    // room-joined filled the mailbox; the players broadcast overflowed it.
    let stats = settle(&hub).await;
    assert_eq!(stats.clients, 1);
    assert_eq!(slow.client.room(), None);

    let info = hub.room_info(&room_id).await.unwrap().unwrap();
    assert_eq!(info.players, vec![alice.id()]);
    assert!(!alice.drain().is_empty());
}

#[tokio::test]
async fn test_shutdown_destroys_rooms_and_closes_clients() {
    let (hub, task) = start_hub(no_timeout());
    let mut alice = Player::human("alice");
    room_with(&hub, &alice, &[]).await;

    hub.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(
        alice.drain(),
        vec![OutgoingMessage::RoomDestroyed {
            reason: DestroyReason::Shutdown
        }]
    );
    assert!(alice.mailbox.recv().await.is_none());
    assert!(matches!(hub.stats().await, Err(TablehubError::HubClosed)));
}

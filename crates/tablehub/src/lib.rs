//! # Tablehub
//!
//! Hub and room server for turn-based multiplayer web games.
//!
//! One [`Hub`] task owns every connected client and every room. Clients
//! send JSON commands over a WebSocket; lobby commands (`create-room`,
//! `join-room`) are handled by the hub, everything else is routed to the
//! author's room, and anything the room doesn't recognize is handed to
//! the game's [`Driver`](tablehub_room::Driver). Game implementers write
//! a driver and register it by name; the framework handles connections,
//! membership, ownership, idle reclamation and fault isolation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tablehub::prelude::*;
//!
//! // Implement Driver for your game, then:
//! // let server = TablehubServer::builder()
//! //     .config(ServerConfig::from_env()?)
//! //     .driver("my-game", MyGame::default)
//! //     .build()
//! //     .await?;
//! // server.run().await
//! ```

mod config;
mod error;
mod handler;
mod hub;
mod server;

pub use config::{ConfigError, HubConfig, ServerConfig};
pub use error::TablehubError;
pub use hub::{Hub, HubHandle, HubStats};
pub use server::{TablehubServer, TablehubServerBuilder};

pub use tablehub_client as client;
pub use tablehub_protocol as protocol;
pub use tablehub_room as room;
pub use tablehub_transport as transport;

/// Installs a `tracing` subscriber that honours `RUST_LOG`, falling back
/// to `default_filter` (e.g. `"info"`).
///
/// Call once at process start. A second call is a no-op.
pub fn init_tracing(default_filter: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Everything a game server binary usually needs.
pub mod prelude {
    pub use crate::{
        Hub, HubConfig, HubHandle, HubStats, ServerConfig, TablehubError,
        TablehubServer, TablehubServerBuilder, init_tracing,
    };
    pub use tablehub_client::{ChannelClient, Client, ClientRef, IncomingMessage};
    pub use tablehub_protocol::{
        ClientId, DestroyReason, MessageType, OutgoingMessage, RoomId,
    };
    pub use tablehub_room::{
        Driver, DriverConfig, DriverError, DriverRegistry, RoomError,
        RoomInfo, RoomState, Seat,
    };
}

//! Rooms for Tablehub.
//!
//! A room is one game session: its members in seat order, its owner,
//! the game's [`Driver`], and an idle timer. Rooms are plain values owned
//! by the hub's registry; every method runs on the hub task, so a room
//! never needs a lock.
//!
//! # Key types
//!
//! - [`Driver`]: the trait game implementers write
//! - [`DriverRegistry`]: drivers selectable by name at `create-room`
//! - [`Room`]: membership, permissions, command dispatch
//! - [`Emitter`]: fire-and-forget delivery to a set of clients
//! - [`IdleTimer`]: cancel-on-drop timer reclaiming unstarted rooms
//! - [`RoomState`]: lifecycle state machine

mod config;
mod driver;
mod emitter;
mod error;
mod room;
mod timer;

pub use config::{DriverConfig, RoomState};
pub use driver::{Driver, DriverError, DriverRegistry, Seat};
pub use emitter::{ClientEmitter, Emitter, Event};
pub use error::RoomError;
pub use room::{Room, RoomInfo, RoomOutcome};
pub use timer::IdleTimer;

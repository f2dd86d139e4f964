//! Message vocabulary for Tablehub.
//!
//! This crate defines what clients and the server say to each other:
//!
//! - **Identifiers** ([`ClientId`], [`RoomId`]): who and where.
//! - **Inbound** ([`MessageType`], [`ClientMessage`], and the typed
//!   parameter structs): commands a client sends.
//! - **Outbound** ([`OutgoingMessage`]): everything the server pushes back.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]): what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the hub
//! (rooms and clients). It doesn't know about connections or rooms;
//! it only knows the shape of the messages.
//!
//! ```text
//! Transport (bytes) → Protocol (ClientMessage) → Hub (IncomingMessage) → Room
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ChatParams, ClientId, ClientMessage, ClientOutReason, CreateRoomParams,
    DestroyReason, JoinRoomParams, KickPlayerParams, MessageType,
    OutgoingMessage, PlayerSummary, RoomId, parse_params,
};

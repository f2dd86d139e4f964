//! Client contract for Tablehub.
//!
//! A "client" is the server-side handle to one connected participant,
//! human or bot. The hub and rooms never touch sockets; they only see
//! this contract:
//!
//! 1. **Identity**: [`Client::id`], [`Client::name`], [`Client::is_bot`]
//! 2. **Delivery**: a non-blocking [`Client::send`] into a bounded mailbox
//! 3. **Room association**: [`Client::room`] / [`Client::set_room`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Hub / Room (above)  ← route by client, deliver via the mailbox
//!     ↕
//! Client (this crate)  ← identity, mailbox, current room
//!     ↕
//! Transport (below)  ← the connection handler drains the mailbox
//! ```

mod client;
mod error;
mod message;

pub use client::{ChannelClient, Client, ClientRef};
pub use error::SendError;
pub use message::IncomingMessage;

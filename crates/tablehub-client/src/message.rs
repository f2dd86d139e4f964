//! Inbound commands with their author attached.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tablehub_protocol::{ClientMessage, MessageType, ProtocolError, parse_params};

use crate::ClientRef;

/// A command received from a client, ready for the hub.
///
/// The connection handler decodes a [`ClientMessage`] frame and pairs it
/// with the client that sent it; from then on the author travels with
/// the message so rooms can check ownership and seats.
#[derive(Clone)]
pub struct IncomingMessage {
    pub author: ClientRef,
    pub kind: MessageType,
    pub params: Value,
}

impl IncomingMessage {
    pub fn new(author: ClientRef, kind: MessageType, params: Value) -> Self {
        Self {
            author,
            kind,
            params,
        }
    }

    /// Attaches an author to a decoded frame.
    pub fn from_frame(author: ClientRef, frame: ClientMessage) -> Self {
        Self::new(author, frame.kind, frame.params)
    }

    /// Decodes the parameters into the command's typed shape.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        parse_params(&self.kind, &self.params)
    }
}

impl fmt::Debug for IncomingMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingMessage")
            .field("author", &self.author.id())
            .field("kind", &self.kind)
            .field("params", &self.params)
            .finish()
    }
}

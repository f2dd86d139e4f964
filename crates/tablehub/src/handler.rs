//! Per-connection handler: register, pump frames, unregister.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Build a mailbox-backed client named after the `?name=` query
//!   2. Register it with the hub
//!   3. Write pump: mailbox → socket, on its own task
//!   4. Read pump: socket → decode → `HubHandle::dispatch`
//!   5. Whichever pump stops first ends the connection; unregister

use std::sync::Arc;

use tablehub_client::{ChannelClient, Client, ClientRef, IncomingMessage};
use tablehub_protocol::{
    ClientMessage, Codec, JsonCodec, OutgoingMessage, ProtocolError,
};
use tablehub_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::{HubHandle, TablehubError};

/// State shared by every connection handler.
pub(crate) struct ServerState {
    pub(crate) hub: HubHandle,
    pub(crate) codec: JsonCodec,
    pub(crate) client_buffer: usize,
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    state: Arc<ServerState>,
) -> Result<(), TablehubError> {
    let conn = Arc::new(conn);
    let conn_id = conn.id();
    let name = conn
        .requested_name()
        .map(str::to_owned)
        .unwrap_or_else(|| format!("guest-{}", conn_id.into_inner()));

    let (client, mailbox) = ChannelClient::new(name, state.client_buffer);
    let client: ClientRef = client;
    state.hub.register(Arc::clone(&client)).await?;
    tracing::info!(
        %conn_id,
        client_id = %client.id(),
        peer = %conn.peer_addr(),
        "client connected"
    );

    let mut writer = tokio::spawn(write_pump(Arc::clone(&conn), mailbox));

    let result = tokio::select! {
        result = read_pump(&conn, &client, &state) => result,
        _ = &mut writer => {
            tracing::debug!(client_id = %client.id(), "write side closed");
            Ok(())
        }
    };

    // The hub closes the mailbox on unregister, which stops the write
    // pump. Closing here too covers a hub that has already stopped.
    if let Err(e) = state.hub.unregister(Arc::clone(&client)).await {
        tracing::debug!(client_id = %client.id(), error = %e, "unregister failed");
    }
    client.close();
    tracing::info!(%conn_id, client_id = %client.id(), "client disconnected");
    result
}

/// Forwards encoded payloads from the mailbox to the socket until the
/// mailbox is closed or the socket fails, then closes the socket.
async fn write_pump(
    conn: Arc<WebSocketConnection>,
    mut mailbox: mpsc::Receiver<Vec<u8>>,
) {
    while let Some(payload) = mailbox.recv().await {
        if let Err(e) = conn.send(&payload).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send failed");
            break;
        }
    }
    let _ = conn.close().await;
}

/// Decodes frames and hands them to the hub until the peer hangs up.
///
/// A frame that doesn't decode gets an `invalid-params` error through the
/// client's own mailbox and the connection stays open, unless the mailbox
/// is full, in which case the connection ends.
async fn read_pump(
    conn: &WebSocketConnection,
    client: &ClientRef,
    state: &ServerState,
) -> Result<(), TablehubError> {
    while let Some(data) = conn.recv().await? {
        let frame: ClientMessage = match state.codec.decode(&data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(client_id = %client.id(), error = %e, "undecodable frame");
                if reject_frame(client.as_ref(), &state.codec, &e) {
                    continue;
                }
                // Unreachable peer: end the connection so it gets
                // unregistered like any other dead client.
                return Ok(());
            }
        };
        state
            .hub
            .dispatch(IncomingMessage::from_frame(Arc::clone(client), frame))
            .await?;
    }
    Ok(())
}

/// Replies `invalid-params` to an undecodable frame.
///
/// Returns `false` if the client's mailbox couldn't take the reply; the
/// mailbox is closed in that case.
fn reject_frame(client: &dyn Client, codec: &JsonCodec, error: &ProtocolError) -> bool {
    let reply = OutgoingMessage::error("invalid-params", error.to_string());
    let Ok(bytes) = codec.encode(&reply) else {
        return true;
    };
    match client.send(bytes) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(client_id = %client.id(), error = %e, "client unreachable");
            client.close();
            false
        }
    }
}

//! `TablehubServer` builder and accept loop.
//!
//! This is the entry point for running a Tablehub server. It ties
//! together all the layers: transport → protocol → hub → rooms.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tablehub_protocol::JsonCodec;
use tablehub_room::{Driver, DriverRegistry};
use tablehub_transport::{Transport, WebSocketTransport};
use tokio::task::JoinHandle;

use crate::handler::{ServerState, handle_connection};
use crate::{Hub, HubConfig, HubHandle, ServerConfig, TablehubError};

/// Builder for configuring and starting a Tablehub server.
///
/// # Example
///
/// ```rust,ignore
/// use tablehub::prelude::*;
///
/// let server = TablehubServer::builder()
///     .bind("0.0.0.0:8080")
///     .driver("tic-tac-toe", TicTacToe::default)
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct TablehubServerBuilder {
    config: ServerConfig,
    drivers: DriverRegistry,
}

impl TablehubServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            drivers: DriverRegistry::new(),
        }
    }

    /// Replaces the whole configuration, e.g. one from
    /// [`ServerConfig::from_env`].
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    pub fn hub_config(mut self, config: HubConfig) -> Self {
        self.config.hub = config;
        self
    }

    /// Makes a game available to `create-room` under `name`.
    pub fn driver<F, D>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: Driver,
    {
        self.drivers.register(name, factory);
        self
    }

    /// Binds the listener and starts the hub.
    pub async fn build(self) -> Result<TablehubServer, TablehubError> {
        let transport = WebSocketTransport::bind(&self.config.bind).await?;
        if self.drivers.is_empty() {
            tracing::warn!("no game drivers registered; create-room will always fail");
        }

        let client_buffer = self.config.hub.client_buffer;
        let (hub, handle) = Hub::new(self.config.hub, self.drivers);
        let hub_task = hub.spawn();

        let state = Arc::new(ServerState {
            hub: handle,
            codec: JsonCodec,
            client_buffer,
        });

        Ok(TablehubServer {
            transport,
            state,
            hub_task,
        })
    }
}

impl Default for TablehubServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A Tablehub server with its hub running.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct TablehubServer {
    transport: WebSocketTransport,
    state: Arc<ServerState>,
    hub_task: JoinHandle<()>,
}

impl TablehubServer {
    /// Creates a new builder.
    pub fn builder() -> TablehubServerBuilder {
        TablehubServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TablehubError> {
        Ok(self.transport.local_addr()?)
    }

    /// A handle to the running hub.
    pub fn hub(&self) -> HubHandle {
        self.state.hub.clone()
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), TablehubError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` resolves, then shuts the hub
    /// down: every room is destroyed with reason `shutdown` and every
    /// client's mailbox is closed.
    pub async fn run_until(
        mut self,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), TablehubError> {
        tracing::info!("Tablehub server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!("Tablehub server shutting down");
        self.state.hub.shutdown().await?;
        let _ = self.hub_task.await;
        Ok(())
    }
}

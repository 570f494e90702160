//! Gateway - WebSocket listener that accepts incoming connections.
//!
//! The Gateway binds a socket and spawns a Connection task for each
//! incoming client.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::LimitsConfig;
use crate::network::{Connection, IdentityVerifier};
use crate::state::registry::SessionRegistry;

/// The Gateway accepts incoming WebSocket connections and spawns handlers.
pub struct Gateway {
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    verifier: Arc<dyn IdentityVerifier>,
    limits: LimitsConfig,
}

impl Gateway {
    /// Bind the gateway to the specified address.
    pub async fn bind(
        addr: SocketAddr,
        registry: Arc<SessionRegistry>,
        verifier: Arc<dyn IdentityVerifier>,
        limits: LimitsConfig,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "WebSocket listener bound");
        Ok(Self {
            listener,
            registry,
            verifier,
            limits,
        })
    }

    /// The bound address (OS-assigned port resolution for tests).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the gateway, accepting connections forever.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let registry = Arc::clone(&self.registry);
                    let verifier = Arc::clone(&self.verifier);
                    let limits = self.limits.clone();
                    let conn_id = Uuid::new_v4();

                    tokio::spawn(async move {
                        match tokio_tungstenite::accept_async(stream).await {
                            Ok(ws_stream) => {
                                info!(%conn_id, %addr, "Connection accepted");
                                let connection = Connection::new(
                                    conn_id, ws_stream, addr, registry, verifier, limits,
                                );
                                if let Err(e) = connection.run().await {
                                    error!(%conn_id, %addr, error = %e, "Connection error");
                                }
                                info!(%conn_id, %addr, "Connection closed");
                            }
                            Err(e) => {
                                warn!(%addr, error = %e, "WebSocket handshake failed");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

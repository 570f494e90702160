//! Connection - handles an individual client connection.
//!
//! Each connection runs in its own tokio task in two phases:
//!
//! 1. Handshake: the first text frame must be `hello`; the identity
//!    verifier turns it into a [`VerifiedIdentity`] the engine trusts for
//!    the connection's lifetime. Commands before `hello` never reach the
//!    registry.
//! 2. Unified loop: `tokio::select!` over inbound frames (decoded and
//!    dispatched) and the outbound event queue (encoded and written).
//!
//! A dropped socket is not a leave: the participant is routed into the
//! grace-period path and may reattach from a new connection.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use huddle_proto::{ServerEvent, decode_command, decode_hello, encode_event};

use crate::handlers::{self, Context};
use crate::network::limit::RateLimiter;
use crate::network::IdentityVerifier;
use crate::config::LimitsConfig;
use crate::state::registry::SessionRegistry;
use crate::state::session::{ConnectionId, SessionId, VerifiedIdentity};

/// A client connection handler.
pub struct Connection {
    conn_id: ConnectionId,
    addr: SocketAddr,
    registry: Arc<SessionRegistry>,
    verifier: Arc<dyn IdentityVerifier>,
    limits: LimitsConfig,
    ws: WebSocketStream<TcpStream>,
}

impl Connection {
    /// Create a new connection handler.
    pub fn new(
        conn_id: ConnectionId,
        ws: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        registry: Arc<SessionRegistry>,
        verifier: Arc<dyn IdentityVerifier>,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            conn_id,
            addr,
            registry,
            verifier,
            limits,
            ws,
        }
    }

    /// Run the connection loop.
    #[instrument(skip(self), fields(conn = %self.conn_id, addr = %self.addr), name = "connection")]
    pub async fn run(mut self) -> anyhow::Result<()> {
        // Phase 1: hello handshake
        let Some(who) = self.await_hello().await else {
            return Ok(());
        };
        info!(identity = %who.identity, kind = ?who.kind, "Client authenticated");

        // Phase 2: unified loop
        let (mut sink, mut stream) = self.ws.split();

        let (outgoing_tx, mut outgoing_rx) =
            mpsc::channel::<ServerEvent>(self.limits.outbound_queue);
        self.registry
            .broadcaster
            .register(self.conn_id, who.kind, outgoing_tx.clone());
        let _ = outgoing_tx
            .try_send(ServerEvent::Ready { connection_id: self.conn_id });

        let mut rate_limiter = RateLimiter::new(
            self.limits.message_rate_per_second,
            self.limits.message_burst,
        );
        let mut current_session: Option<SessionId> = None;

        loop {
            tokio::select! {
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(Message::Text(text))) => {
                            if !rate_limiter.check() {
                                warn!("Command rate limit exceeded");
                                break;
                            }

                            let frame = match decode_command(&text) {
                                Ok(frame) => frame,
                                Err(e) => {
                                    debug!(error = %e, "Undecodable frame dropped");
                                    continue;
                                }
                            };

                            let mut ctx = Context {
                                conn: self.conn_id,
                                who: &who,
                                registry: &self.registry,
                                current_session: &mut current_session,
                            };
                            handlers::dispatch(&mut ctx, frame).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("Client disconnected");
                            break;
                        }
                        // binary, ping and pong frames carry no commands
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(error = %e, "Read error");
                            break;
                        }
                    }
                }

                outbound = outgoing_rx.recv() => {
                    match outbound {
                        Some(event) => match encode_event(&event) {
                            Ok(text) => {
                                if let Err(e) = sink.send(Message::Text(text)).await {
                                    debug!(error = %e, "Write error");
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "Failed to encode event");
                            }
                        },
                        None => break,
                    }
                }
            }
        }

        // The socket is gone, the person may not be: route into the grace
        // path instead of removing outright.
        self.registry.broadcaster.unregister(&self.conn_id);
        if let Some(session_id) = current_session {
            self.registry
                .connection_lost(&session_id, self.conn_id)
                .await;
        }

        Ok(())
    }

    /// Wait for the `hello` frame and verify it. `None` closes the
    /// connection silently.
    async fn await_hello(&mut self) -> Option<VerifiedIdentity> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let hello = match decode_hello(&text) {
                        Ok(hello) => hello,
                        Err(e) => {
                            debug!(error = %e, "First frame was not a valid hello");
                            return None;
                        }
                    };
                    match self.verifier.verify(&hello) {
                        Some(who) => return Some(who),
                        None => {
                            info!(identity = %hello.identity, "Identity verification failed");
                            return None;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!(error = %e, "Read error during handshake");
                    return None;
                }
            }
        }
    }
}

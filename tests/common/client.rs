//! Test WebSocket client.
//!
//! Speaks the JSON wire vocabulary: sends commands, receives events, and
//! provides predicate-driven assertion helpers.

use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use huddle_proto::{CallerKind, ClientCommand, CommandFrame, ServerEvent};

/// A test client speaking the huddle protocol.
pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub identity: String,
}

impl TestClient {
    /// Connect, say hello, and wait for the `ready` ack.
    pub async fn connect(url: &str, identity: &str, kind: CallerKind) -> anyhow::Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(url).await?;
        let mut client = Self {
            ws,
            identity: identity.to_string(),
        };

        let hello = serde_json::json!({
            "type": "hello",
            "identity": identity,
            "displayName": identity.to_uppercase(),
            "kind": kind,
        });
        client.send_raw(&hello.to_string()).await?;

        let ready = client.recv().await?;
        anyhow::ensure!(
            matches!(ready, ServerEvent::Ready { .. }),
            "expected ready, got {ready:?}"
        );
        Ok(client)
    }

    /// Send a raw text frame.
    pub async fn send_raw(&mut self, text: &str) -> anyhow::Result<()> {
        self.ws.send(Message::Text(text.to_string())).await?;
        Ok(())
    }

    /// Send a command addressed to a session.
    pub async fn send(&mut self, session_id: &str, command: ClientCommand) -> anyhow::Result<()> {
        let frame = CommandFrame {
            session_id: session_id.to_string(),
            command,
        };
        self.send_raw(&serde_json::to_string(&frame)?).await
    }

    /// Receive a single event.
    pub async fn recv(&mut self) -> anyhow::Result<ServerEvent> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive an event with a timeout, skipping non-text frames.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<ServerEvent> {
        let deadline = tokio::time::Instant::now() + dur;
        loop {
            let remaining = deadline
                .checked_duration_since(tokio::time::Instant::now())
                .ok_or_else(|| anyhow::anyhow!("timed out waiting for event"))?;
            match timeout(remaining, self.ws.next()).await? {
                Some(Ok(Message::Text(text))) => {
                    return Ok(serde_json::from_str(&text)?);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => anyhow::bail!("connection closed"),
            }
        }
    }

    /// Receive events until the predicate matches; returns everything
    /// received, the match last.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<ServerEvent>>
    where
        F: FnMut(&ServerEvent) -> bool,
    {
        let mut events = Vec::new();
        loop {
            let event = self.recv().await?;
            let done = predicate(&event);
            events.push(event);
            if done {
                return Ok(events);
            }
        }
    }

    /// Assert that nothing arrives within the window.
    pub async fn expect_silence(&mut self, dur: Duration) -> anyhow::Result<()> {
        match self.recv_timeout(dur).await {
            Ok(event) => anyhow::bail!("expected silence, got {event:?}"),
            Err(_) => Ok(()),
        }
    }

    /// Close the underlying socket without a graceful leave (simulates a
    /// connection drop).
    pub async fn drop_connection(mut self) -> anyhow::Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

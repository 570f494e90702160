//! Test server management.
//!
//! Spawns in-process huddled engines for integration testing. Each test
//! owns an isolated registry and an OS-assigned port, so tests run in
//! parallel without interference.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

use huddled::config::{LimitsConfig, TimingConfig};
use huddled::db::NoopStore;
use huddled::network::{Gateway, TrustedIdentity};
use huddled::state::registry::SessionRegistry;
use huddled::state::sweeper::spawn_sweeper;

/// A test engine instance.
pub struct TestServer {
    pub registry: Arc<SessionRegistry>,
    addr: SocketAddr,
    gateway_task: JoinHandle<()>,
    sweeper_task: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Spawn a test engine with default timing.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with_timing(TimingConfig::default()).await
    }

    /// Spawn a test engine with custom timer durations (short grace and
    /// countdown windows keep timer tests fast).
    pub async fn spawn_with_timing(timing: TimingConfig) -> anyhow::Result<Self> {
        let registry = SessionRegistry::new(timing, Arc::new(NoopStore::new()));

        let gateway = Gateway::bind(
            "127.0.0.1:0".parse()?,
            Arc::clone(&registry),
            Arc::new(TrustedIdentity),
            LimitsConfig::default(),
        )
        .await?;
        let addr = gateway.local_addr()?;

        let gateway_task = tokio::spawn(async move {
            let _ = gateway.run().await;
        });

        Ok(Self {
            registry,
            addr,
            gateway_task,
            sweeper_task: None,
        })
    }

    /// Also run the background sweeper (off by default so sweep-sensitive
    /// tests control their own timing).
    pub fn with_sweeper(mut self) -> Self {
        self.sweeper_task = Some(spawn_sweeper(Arc::clone(&self.registry)));
        self
    }

    /// WebSocket URL of this engine.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Create a connected, authenticated test client.
    pub async fn connect(
        &self,
        identity: &str,
        kind: huddle_proto::CallerKind,
    ) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.url(), identity, kind).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.registry.shutdown();
        self.gateway_task.abort();
        if let Some(task) = &self.sweeper_task {
            task.abort();
        }
    }
}

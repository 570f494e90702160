//! huddled - Huddle Daemon
//!
//! Live-meeting coordination engine for the chain operations platform.

use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use huddled::config::Config;
use huddled::db::{AnalyticsStore, NoopStore, SqliteStore};
use huddled::http;
use huddled::metrics;
use huddled::network::{Gateway, TrustedIdentity};
use huddled::state::registry::SessionRegistry;
use huddled::state::sweeper::spawn_sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(server = %config.server.name, "Starting huddled");

    // Analytics store: SQLite when configured, no-op otherwise
    let store: Arc<dyn AnalyticsStore> = match &config.database {
        Some(database) => {
            info!(path = %database.path, "Initializing analytics store");
            Arc::new(SqliteStore::new(&database.path).await?)
        }
        None => {
            info!("Analytics persistence disabled; using no-op store");
            Arc::new(NoopStore::new())
        }
    };

    // Create the session registry (shared engine state)
    let registry = SessionRegistry::new(config.timing.clone(), store);

    // Prometheus metrics are optional.
    // Convention: metrics_port = 0 disables the HTTP endpoint (used by tests).
    let metrics_port = config.server.metrics_port.unwrap_or(9090);
    if metrics_port == 0 {
        info!("Metrics disabled");
    } else {
        metrics::init();
        info!("Metrics initialized");

        tokio::spawn(async move {
            http::run_http_server(metrics_port).await;
        });
        info!(port = metrics_port, "Prometheus HTTP server started");
    }

    // Start the stale-session sweeper
    spawn_sweeper(Arc::clone(&registry));
    info!("Stale-session sweeper started");

    // Orderly shutdown: cancel outstanding timers before exiting
    {
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received; cancelling timers");
                registry.shutdown();
                std::process::exit(0);
            }
        });
    }

    // Start the gateway
    let gateway = Gateway::bind(
        config.listen.address,
        Arc::clone(&registry),
        Arc::new(TrustedIdentity),
        config.limits.clone(),
    )
    .await?;

    gateway.run().await?;

    Ok(())
}

//! Stale-session sweeper.
//!
//! Backstop against any missed teardown path: a fixed-interval pass that
//! force-ends sessions with nobody in them and sessions older than the
//! hard age cap, regardless of activity.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use huddle_proto::EndReason;

use crate::metrics;
use crate::state::registry::SessionRegistry;

/// Spawn the sweeper background task.
pub fn spawn_sweeper(registry: Arc<SessionRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(registry.timing.sweep_interval());
        loop {
            interval.tick().await;
            sweep(&registry).await;
        }
    })
}

/// One sweep pass over every live session.
pub async fn sweep(registry: &Arc<SessionRegistry>) {
    let now = Utc::now();
    let max_age = registry.timing.max_session_age();

    for session_id in registry.live_session_ids() {
        let Some(handle) = registry.session(&session_id) else {
            continue;
        };

        let reason = {
            let session = handle.read().await;
            if session.participants.is_empty() {
                Some(EndReason::NoParticipants)
            } else if session.age(now) > max_age {
                Some(EndReason::MaxDuration)
            } else {
                None
            }
        };

        if let Some(reason) = reason {
            metrics::record_timer_fired("sweep");
            info!(session_id = %session_id, reason = %reason, "Sweeper reclaiming session");
            let _ = registry.force_end(&session_id, reason).await;
        }
    }
}

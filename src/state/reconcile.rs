//! Grace-period reconciliation and the timer arena.
//!
//! Every deferred decision in the engine ("is this dropped connection
//! really gone", "has the hostless session run out of time") is a
//! scheduled task in the [`TimerArena`]: a map from a stable key to a
//! cancellation token. Cancellation is idempotent, and a fired task
//! re-validates the condition that justified scheduling it (session
//! liveness, instance id, the guarding predicate) before acting, because
//! state may have changed between scheduling and firing.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use huddle_proto::{EndReason, ServerEvent};

use crate::metrics;
use crate::state::registry::SessionRegistry;
use crate::state::session::{ConnectionId, ParticipantPhase, SessionId};
use uuid::Uuid;

/// Stable identity of one scheduled timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Disconnect grace for one connection in one session.
    DisconnectGrace {
        session_id: SessionId,
        connection_id: ConnectionId,
    },
    /// The terminal host-left countdown for a session.
    HostLeft { session_id: SessionId },
    /// One reminder checkpoint of a host-left countdown.
    HostLeftCheckpoint {
        session_id: SessionId,
        seconds_remaining: u64,
    },
}

impl TimerKey {
    /// The session this timer guards.
    pub fn session_id(&self) -> &str {
        match self {
            TimerKey::DisconnectGrace { session_id, .. }
            | TimerKey::HostLeft { session_id }
            | TimerKey::HostLeftCheckpoint { session_id, .. } => session_id,
        }
    }

    /// Whether this key belongs to a host-left countdown (terminal or
    /// checkpoint).
    fn is_host_left(&self) -> bool {
        matches!(
            self,
            TimerKey::HostLeft { .. } | TimerKey::HostLeftCheckpoint { .. }
        )
    }
}

/// Arena of cancellable scheduled tasks.
pub struct TimerArena {
    tasks: Arc<DashMap<TimerKey, CancellationToken>>,
}

impl TimerArena {
    pub fn new() -> Self {
        Self {
            tasks: Arc::new(DashMap::new()),
        }
    }

    /// Schedule `action` to run after `delay` unless cancelled first.
    ///
    /// Re-scheduling under an existing key cancels the previous task. A
    /// fired task removes its own key before running, so cancelling an
    /// already-fired timer is a no-op.
    pub fn schedule<F, Fut>(&self, key: TimerKey, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = CancellationToken::new();
        if let Some(previous) = self.tasks.insert(key.clone(), token.clone()) {
            previous.cancel();
        }

        let tasks = Arc::clone(&self.tasks);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    tasks.remove(&key);
                    action().await;
                }
            }
        });
    }

    /// Cancel one timer. Returns whether a pending timer existed;
    /// cancelling a fired or unknown timer is a no-op, not an error.
    pub fn cancel(&self, key: &TimerKey) -> bool {
        match self.tasks.remove(key) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel the host-left countdown and all its checkpoints for a
    /// session.
    pub fn cancel_host_left(&self, session_id: &str) {
        self.tasks.retain(|key, token| {
            if key.is_host_left() && key.session_id() == session_id {
                token.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Cancel every timer guarding a session (teardown path).
    pub fn cancel_session(&self, session_id: &str) {
        self.tasks.retain(|key, token| {
            if key.session_id() == session_id {
                token.cancel();
                false
            } else {
                true
            }
        });
    }

    /// Number of pending timers.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Cancel everything. Used by registry shutdown.
    pub fn shutdown(&self) {
        self.tasks.retain(|_, token| {
            token.cancel();
            false
        });
    }
}

impl Default for TimerArena {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Disconnect handling
// ============================================================================

impl SessionRegistry {
    /// React to an underlying connection drop.
    ///
    /// The participant is parked as `Disconnected` and given a grace
    /// window; a `join` with the same identity inside the window reattaches
    /// silently, otherwise the grace timer removes them as a leave would.
    pub async fn connection_lost(&self, session_id: &str, conn: ConnectionId) {
        let Some(handle) = self.session(session_id) else {
            return;
        };

        let instance_id = {
            let mut session = handle.write().await;
            let Some(participant) = session.participants.get_mut(&conn) else {
                return;
            };
            participant.phase = ParticipantPhase::Disconnected;
            debug!(
                session_id = %session_id,
                connection_id = %conn,
                identity = %participant.identity,
                "Connection lost; grace timer started"
            );
            session.instance_id
        };

        let registry = self.weak_handle();
        let session_id = session_id.to_string();
        let key = TimerKey::DisconnectGrace {
            session_id: session_id.clone(),
            connection_id: conn,
        };
        self.timers
            .schedule(key, self.timing.disconnect_grace(), move || async move {
                if let Some(registry) = registry.upgrade() {
                    registry.grace_expired(&session_id, conn, instance_id).await;
                }
            });
    }

    /// A disconnect grace timer fired: if the participant is still parked,
    /// remove them with full leave consequences.
    async fn grace_expired(&self, session_id: &str, conn: ConnectionId, instance_id: Uuid) {
        metrics::record_timer_fired("disconnect_grace");

        let Some(handle) = self.session(session_id) else {
            return;
        };
        {
            let session = handle.read().await;
            if session.instance_id != instance_id {
                return;
            }
            match session.participants.get(&conn) {
                Some(p) if p.phase == ParticipantPhase::Disconnected => {}
                // reconnected (under a new connection id) or already gone
                _ => return,
            }
        }

        info!(session_id = %session_id, connection_id = %conn, "Grace period expired; removing participant");
        self.remove_participant(session_id, conn, None).await;
    }
}

// ============================================================================
// Host-left escalation
// ============================================================================

impl SessionRegistry {
    /// Start the host-left countdown: record `host_left_at`, notify
    /// immediately, schedule the terminal timer and every checkpoint
    /// reminder. All of them are cancelled together by
    /// [`SessionRegistry::cancel_host_left_escalation`].
    ///
    /// Caller holds the session write guard and has already established
    /// that the host seat is empty while other participants remain.
    pub(crate) fn begin_host_left_escalation(
        &self,
        session: &mut crate::state::session::Session,
    ) {
        let countdown = self.timing.host_left_countdown();
        let session_id = session.session_id.clone();
        let instance_id = session.instance_id;

        session.host_left_at = Some(chrono::Utc::now());
        info!(
            session_id = %session_id,
            seconds = countdown.as_secs(),
            "Host left; countdown started"
        );

        self.broadcaster.send_to_all(
            session.connection_ids(),
            &ServerEvent::HostLeftCountdown {
                seconds_remaining: countdown.as_secs(),
            },
        );

        let registry = self.weak_handle();
        let sid = session_id.clone();
        self.timers.schedule(
            TimerKey::HostLeft {
                session_id: session_id.clone(),
            },
            countdown,
            move || async move {
                if let Some(registry) = registry.upgrade() {
                    registry.host_left_expired(&sid, instance_id).await;
                }
            },
        );

        for &seconds_remaining in &self.timing.host_left_checkpoints_secs {
            if seconds_remaining >= countdown.as_secs() {
                continue;
            }
            let registry = self.weak_handle();
            let sid = session_id.clone();
            self.timers.schedule(
                TimerKey::HostLeftCheckpoint {
                    session_id: session_id.clone(),
                    seconds_remaining,
                },
                countdown - Duration::from_secs(seconds_remaining),
                move || async move {
                    if let Some(registry) = registry.upgrade() {
                        registry
                            .host_left_checkpoint(&sid, instance_id, seconds_remaining)
                            .await;
                    }
                },
            );
        }
    }

    /// Cancel a pending host-left countdown and all its checkpoints.
    pub(crate) fn cancel_host_left_escalation(&self, session_id: &str) {
        self.timers.cancel_host_left(session_id);
    }

    /// A checkpoint reminder fired: re-validate, then notify.
    async fn host_left_checkpoint(
        &self,
        session_id: &str,
        instance_id: Uuid,
        seconds_remaining: u64,
    ) {
        metrics::record_timer_fired("host_left_checkpoint");

        let Some(handle) = self.session(session_id) else {
            return;
        };
        let session = handle.read().await;
        if session.instance_id != instance_id || session.host_left_at.is_none() || session.has_host()
        {
            return;
        }
        self.broadcaster.send_to_all(
            session.connection_ids(),
            &ServerEvent::HostLeftCountdown { seconds_remaining },
        );
    }

    /// The terminal countdown fired: re-validate that the session is still
    /// alive, this incarnation, and still hostless, then force-end exactly
    /// once.
    async fn host_left_expired(&self, session_id: &str, instance_id: Uuid) {
        metrics::record_timer_fired("host_left");

        let Some(handle) = self.session(session_id) else {
            return;
        };
        {
            let session = handle.read().await;
            if session.instance_id != instance_id || session.has_host() {
                return;
            }
        }

        let _ = self.force_end(session_id, EndReason::HostLeft).await;
    }
}

//! The session registry - single source of truth for presence and roles.
//!
//! One `SessionRegistry` instance owns every live session, the broadcaster,
//! the timer arena and the analytics aggregator. There is no ambient global
//! state: tests construct isolated registries, and `shutdown` cancels every
//! outstanding timer.
//!
//! Concurrency model: each session lives behind its own `RwLock`, and every
//! command mutates exactly one session under its write guard. Broadcasts
//! are issued while that guard is held, so subscribers observe events in
//! the order commands were accepted.

use chrono::Utc;
use dashmap::DashMap;
use rand::Rng;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{debug, info};

use huddle_proto::{EndReason, ParticipantInfo, Role, ServerEvent, SessionSummary};

use crate::analytics::Aggregator;
use crate::broadcast::Broadcaster;
use crate::config::TimingConfig;
use crate::db::AnalyticsStore;
use crate::error::{CommandError, CommandResult};
use crate::metrics;
use crate::state::reconcile::{TimerArena, TimerKey};
use crate::state::session::{
    ConnectionId, Participant, ParticipantPhase, Session, SessionId, VerifiedIdentity,
};

/// Outcome of a successful start or join: the caller's role and the roster
/// for initial sync (excluding the caller).
pub type JoinOutcome = (Role, Vec<ParticipantInfo>);

/// In-memory table of active sessions and their participants.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<RwLock<Session>>>,
    /// Fan-out hub; also owns the per-connection event queues.
    pub broadcaster: Broadcaster,
    /// Arena of grace and countdown timers.
    pub timers: TimerArena,
    /// Timer durations.
    pub timing: TimingConfig,
    pub(crate) aggregator: Aggregator,
    /// Back-reference handed to timer tasks; a fired timer on a dropped
    /// registry simply does nothing.
    self_ref: Weak<SessionRegistry>,
}

impl SessionRegistry {
    /// Create a registry with the given timing and analytics store.
    pub fn new(timing: TimingConfig, store: Arc<dyn AnalyticsStore>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            sessions: DashMap::new(),
            broadcaster: Broadcaster::new(),
            timers: TimerArena::new(),
            timing,
            aggregator: Aggregator::new(store),
            self_ref: self_ref.clone(),
        })
    }

    /// Weak handle for timer closures.
    pub(crate) fn weak_handle(&self) -> Weak<SessionRegistry> {
        self.self_ref.clone()
    }

    /// Cancel every outstanding timer. Sessions are left in place; this is
    /// the process-exit path, not a teardown of live meetings.
    pub fn shutdown(&self) {
        self.timers.shutdown();
    }

    /// Look up a live session.
    pub fn session(&self, session_id: &str) -> Option<Arc<RwLock<Session>>> {
        self.sessions.get(session_id).map(|s| Arc::clone(&s))
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ids of every live session (sweeper input).
    pub fn live_session_ids(&self) -> Vec<SessionId> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    /// Summaries of every live session, newest first.
    pub async fn session_summaries(&self) -> Vec<SessionSummary> {
        let handles: Vec<Arc<RwLock<Session>>> =
            self.sessions.iter().map(|e| Arc::clone(&e)).collect();
        let mut summaries = Vec::with_capacity(handles.len());
        for handle in handles {
            summaries.push(handle.read().await.summary());
        }
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Start a session with the caller as sole participant and host.
    ///
    /// If a session with this id is already live, the old incarnation is
    /// force-ended as superseded first - its subscribers see the teardown
    /// before the lobby sees the new `session_started`.
    pub async fn start_session(
        &self,
        session_id: &str,
        conn: ConnectionId,
        who: &VerifiedIdentity,
        title: String,
        join_code: Option<String>,
        password: Option<String>,
    ) -> JoinOutcome {
        let join_code = join_code.or_else(|| Some(generate_join_code()));
        let mut session = Session::new(session_id.to_string(), title, who, join_code, password);
        session.insert_participant(Participant::new(who, conn, Role::Host, true, true, None));

        let title = session.title.clone();
        let host_display_name = session.host_display_name.clone();
        let handle = Arc::new(RwLock::new(session));

        // Swap-in before tearing down the old incarnation: there is never a
        // window where the id resolves to nothing.
        let superseded = self
            .sessions
            .insert(session_id.to_string(), Arc::clone(&handle));
        if let Some(old) = superseded {
            info!(session_id = %session_id, "Session superseded by new start");
            self.force_end_handle(session_id, old, EndReason::Superseded)
                .await;
        }

        {
            let session = handle.read().await;
            self.aggregator.open_session(&session, Arc::clone(&handle));
        }

        self.broadcaster.send_to_lobby(&ServerEvent::SessionStarted {
            session_id: session_id.to_string(),
            title,
            host_display_name,
        });

        metrics::record_session_started();
        metrics::participant_delta(1);
        info!(session_id = %session_id, host = %who.identity, "Session started");

        (Role::Host, Vec::new())
    }

    /// Join a live session, or reattach a disconnected participant.
    ///
    /// A join whose identity is already present under a different
    /// connection is a reconnection: the grace timer is cancelled and the
    /// participant's state moves to the new connection, preserving role and
    /// join time. No join/leave events are broadcast for a reconnection.
    pub async fn join(
        &self,
        session_id: &str,
        conn: ConnectionId,
        who: &VerifiedIdentity,
        has_video: bool,
        has_audio: bool,
        transport_identity: Option<String>,
    ) -> Result<JoinOutcome, CommandError> {
        let handle = self
            .session(session_id)
            .ok_or_else(|| CommandError::NotFound(session_id.to_string()))?;
        let mut session = handle.write().await;

        let previous_conn = session
            .participants
            .values()
            .find(|p| p.identity == who.identity && p.connection_id != conn)
            .map(|p| p.connection_id);

        if let Some(old_conn) = previous_conn {
            self.timers.cancel(&TimerKey::DisconnectGrace {
                session_id: session_id.to_string(),
                connection_id: old_conn,
            });

            let Some(mut participant) = session.participants.remove(&old_conn) else {
                return Err(CommandError::AlreadyTerminated);
            };
            participant.connection_id = conn;
            participant.phase = ParticipantPhase::Active;
            participant.display_name = who.display_name.clone();
            participant.has_video = has_video;
            participant.has_audio = has_audio;
            if transport_identity.is_some() {
                participant.transport_identity = transport_identity;
            }
            let role = participant.role;
            session.participants.insert(conn, participant);

            if role == Role::Host {
                session.host_left_at = None;
                self.cancel_host_left_escalation(session_id);
            }

            metrics::record_reconnection();
            debug!(
                session_id = %session_id,
                identity = %who.identity,
                "Reconnection reconciled inside grace window"
            );
            return Ok((role, session.roster(Some(&conn))));
        }

        let role = session.role_for_join(who);
        let participant = Participant::new(who, conn, role, has_video, has_audio, transport_identity);
        let announced = participant.info();
        session.insert_participant(participant);

        if role == Role::Host {
            // the original host is back (fresh join after a graceful leave)
            session.host_left_at = None;
            self.cancel_host_left_escalation(session_id);
        }

        if let Some(p) = session.participants.get(&conn) {
            self.aggregator
                .open_participant(&session, p, Arc::clone(&handle));
        }

        self.broadcaster.send_to_all(
            session.connection_ids().into_iter().filter(|c| *c != conn),
            &ServerEvent::ParticipantJoined {
                participant: announced,
            },
        );

        metrics::participant_delta(1);
        info!(session_id = %session_id, identity = %who.identity, role = ?role, "Participant joined");

        Ok((role, session.roster(Some(&conn))))
    }

    /// Graceful leave: the participant is removed immediately, with no
    /// grace period.
    pub async fn leave(&self, session_id: &str, conn: ConnectionId) -> CommandResult {
        if self.session(session_id).is_none() {
            return Err(CommandError::NotFound(session_id.to_string()));
        }
        self.remove_participant(session_id, conn, None).await;
        Ok(())
    }

    /// Remove a participant and apply the leave consequences: departure
    /// broadcast, host-left escalation if the host seat emptied, teardown
    /// if the session emptied. Shared by graceful leave, kick, and grace
    /// expiry. Removing an absent participant is a no-op.
    pub(crate) async fn remove_participant(
        &self,
        session_id: &str,
        conn: ConnectionId,
        directed: Option<ServerEvent>,
    ) {
        let Some(handle) = self.session(session_id) else {
            return;
        };

        let became_empty = {
            let mut session = handle.write().await;
            let Some(removed) = session.participants.remove(&conn) else {
                return;
            };

            self.timers.cancel(&TimerKey::DisconnectGrace {
                session_id: session_id.to_string(),
                connection_id: conn,
            });
            self.aggregator
                .finalize_participant(&session, &removed, Utc::now());
            metrics::participant_delta(-1);

            if let Some(event) = directed {
                self.broadcaster.send_to(&conn, event);
            }
            self.broadcaster.send_to_all(
                session.connection_ids(),
                &ServerEvent::ParticipantLeft {
                    connection_id: conn,
                    display_name: removed.display_name.clone(),
                },
            );
            info!(
                session_id = %session_id,
                identity = %removed.identity,
                "Participant removed"
            );

            if session.participants.is_empty() {
                true
            } else {
                if removed.role == Role::Host && !session.has_host() {
                    self.begin_host_left_escalation(&mut session);
                }
                false
            }
        };

        if became_empty {
            let _ = self.force_end(session_id, EndReason::Empty).await;
        }
    }

    /// Hand the host role to another participant.
    ///
    /// Allowed for the current host, or for any cohost while the host seat
    /// is empty (the countdown-rescue path). Fails silently otherwise, and
    /// when the target has already left.
    pub async fn transfer_host(
        &self,
        session_id: &str,
        caller_conn: ConnectionId,
        target_identity: &str,
        target_display_name: Option<String>,
    ) -> CommandResult {
        let handle = self
            .session(session_id)
            .ok_or_else(|| CommandError::NotFound(session_id.to_string()))?;
        let mut session = handle.write().await;

        let caller = session
            .participants
            .get(&caller_conn)
            .ok_or(CommandError::Unauthorized)?;
        let seat_empty = !session.has_host();
        if caller.role != Role::Host && !(seat_empty && caller.role.is_privileged()) {
            return Err(CommandError::Unauthorized);
        }
        let previous_host_display_name = if seat_empty {
            session.host_display_name.clone()
        } else {
            caller.display_name.clone()
        };
        let demoted_role = if caller.kind.is_privileged() {
            Role::Cohost
        } else {
            Role::Participant
        };

        let Some(target_conn) = session.connection_of(target_identity) else {
            // target already gone; silent no-op
            return Ok(());
        };

        if let Some(caller) = session.participants.get_mut(&caller_conn) {
            caller.role = demoted_role;
        }
        let (new_host_identity, new_host_display_name) = {
            let Some(target) = session.participants.get_mut(&target_conn) else {
                return Ok(());
            };
            target.role = Role::Host;
            if let Some(name) = target_display_name {
                target.display_name = name;
            }
            (target.identity.clone(), target.display_name.clone())
        };

        session.host_identity = new_host_identity.clone();
        session.host_display_name = new_host_display_name.clone();
        session.host_left_at = None;
        self.cancel_host_left_escalation(session_id);

        let recipients = session.connection_ids();
        self.broadcaster.send_to_all(
            recipients.iter().copied(),
            &ServerEvent::HostTransferred {
                new_host_identity,
                new_host_display_name,
                previous_host_display_name,
            },
        );
        self.broadcaster.send_to_all(
            recipients,
            &ServerEvent::ParticipantsUpdated {
                roster: session.roster(None),
            },
        );
        info!(session_id = %session_id, "Host transferred");

        Ok(())
    }

    /// End the session for everyone. Host only.
    pub async fn end_session(
        &self,
        session_id: &str,
        caller_conn: ConnectionId,
    ) -> CommandResult {
        let handle = self
            .session(session_id)
            .ok_or_else(|| CommandError::NotFound(session_id.to_string()))?;
        {
            let session = handle.read().await;
            let caller = session
                .participants
                .get(&caller_conn)
                .ok_or(CommandError::Unauthorized)?;
            if caller.role != Role::Host {
                return Err(CommandError::Unauthorized);
            }
        }
        self.force_end(session_id, EndReason::EndedByHost).await
    }

    /// The shared teardown path used by every termination trigger.
    ///
    /// Idempotent: the removal from the registry map is the
    /// exactly-once point, and a second call returns `AlreadyTerminated`
    /// (a safe no-op for every caller).
    pub async fn force_end(&self, session_id: &str, reason: EndReason) -> CommandResult {
        let Some((_, handle)) = self.sessions.remove(session_id) else {
            return Err(CommandError::AlreadyTerminated);
        };
        self.force_end_handle(session_id, handle, reason).await;
        Ok(())
    }

    /// Teardown of an already-detached session handle.
    async fn force_end_handle(
        &self,
        session_id: &str,
        handle: Arc<RwLock<Session>>,
        reason: EndReason,
    ) {
        self.timers.cancel_session(session_id);

        let session = handle.read().await;
        self.aggregator
            .finalize_session(&session, reason, Utc::now());

        metrics::participant_delta(-(session.participants.len() as i64));
        metrics::record_session_ended(reason.as_str());

        // session subscribers plus the staff lobby, each notified once
        let mut recipients: HashSet<ConnectionId> =
            session.connection_ids().into_iter().collect();
        recipients.extend(self.broadcaster.lobby_connections());
        self.broadcaster.send_to_all(
            recipients,
            &ServerEvent::SessionEnded {
                session_id: session_id.to_string(),
                reason,
            },
        );

        info!(session_id = %session_id, reason = %reason, "Session ended");
    }
}

/// Six-digit join code for meetings started without one.
fn generate_join_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
}

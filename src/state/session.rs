//! Session and participant state.
//!
//! A [`Session`] is one live meeting: its identity, its participants keyed
//! by connection id, its question queue, and its running analytics
//! counters. All mutation happens under the session's lock, one command at
//! a time, so the methods here are plain synchronous state transitions.
//!
//! A participant moves through `Active -> Disconnected -> removed`; the
//! pre-join phase lives at the gateway (a connection that has said `hello`
//! but not yet joined anything). Role is orthogonal and can change while
//! active.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use huddle_proto::{CallerKind, ParticipantInfo, QuestionInfo, Role, SessionSummary};

use crate::error::CommandError;

/// Externally addressable session identifier.
pub type SessionId = String;

/// Transient identifier of one physical connection.
pub type ConnectionId = Uuid;

/// Stable per-person identifier, survives reconnection.
pub type Identity = String;

/// The verified `(identity, displayName, kind)` tuple the identity layer
/// hands the gateway for a connection. Trusted for the connection's
/// lifetime.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub identity: Identity,
    pub display_name: String,
    pub kind: CallerKind,
}

/// Connection-level phase of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantPhase {
    /// Connected and live.
    Active,
    /// Underlying connection dropped; a grace timer is pending and the
    /// same identity may reattach.
    Disconnected,
}

/// Per-participant activity tally, flushed into the participant's
/// persistent record when they are removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParticipantTally {
    pub messages: u64,
    pub reactions: u64,
    pub questions: u64,
    pub hand_raises: u64,
}

/// One connection's membership in a session.
#[derive(Debug, Clone)]
pub struct Participant {
    pub identity: Identity,
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub kind: CallerKind,
    pub role: Role,
    pub phase: ParticipantPhase,
    pub has_video: bool,
    pub has_audio: bool,
    pub is_muted: bool,
    pub is_sharing: bool,
    pub hand_raised: bool,
    pub joined_at: DateTime<Utc>,
    pub transport_identity: Option<String>,
    pub tally: ParticipantTally,
}

impl Participant {
    /// Create a new participant in the `Active` phase.
    pub fn new(
        who: &VerifiedIdentity,
        connection_id: ConnectionId,
        role: Role,
        has_video: bool,
        has_audio: bool,
        transport_identity: Option<String>,
    ) -> Self {
        Self {
            identity: who.identity.clone(),
            connection_id,
            display_name: who.display_name.clone(),
            kind: who.kind,
            role,
            phase: ParticipantPhase::Active,
            has_video,
            has_audio,
            is_muted: false,
            is_sharing: false,
            hand_raised: false,
            joined_at: Utc::now(),
            transport_identity,
            tally: ParticipantTally::default(),
        }
    }

    /// Roster entry as seen by other participants.
    pub fn info(&self) -> ParticipantInfo {
        ParticipantInfo {
            identity: self.identity.clone(),
            connection_id: self.connection_id,
            display_name: self.display_name.clone(),
            kind: self.kind,
            role: self.role,
            has_video: self.has_video,
            has_audio: self.has_audio,
            is_muted: self.is_muted,
            is_sharing: self.is_sharing,
            hand_raised: self.hand_raised,
            joined_at: self.joined_at,
            transport_identity: self.transport_identity.clone(),
        }
    }
}

/// An audience question.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: Uuid,
    pub identity: Identity,
    pub display_name: String,
    pub text: String,
    pub upvoters: HashSet<Identity>,
    pub answered: bool,
    pub asked_at: DateTime<Utc>,
}

impl Question {
    pub fn info(&self) -> QuestionInfo {
        QuestionInfo {
            id: self.id,
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            text: self.text.clone(),
            upvotes: self.upvoters.len() as u32,
            answered: self.answered,
            asked_at: self.asked_at,
        }
    }
}

/// Per-session running totals plus the persistent-record handles.
///
/// Record handles are keyed by identity, which is stable across
/// reconnection, so a reattaching participant keeps their record without an
/// explicit migration step.
#[derive(Debug, Default)]
pub struct AnalyticsCounters {
    pub messages: u64,
    pub reactions: u64,
    pub questions: u64,
    pub hand_raises: u64,
    pub peak_participants: u64,
    pub session_record: Option<i64>,
    pub participant_records: HashMap<Identity, i64>,
}

/// One live meeting.
#[derive(Debug)]
pub struct Session {
    pub session_id: SessionId,
    /// Unique per incarnation; regenerated when a session is superseded.
    /// Timer callbacks compare this before mutating anything.
    pub instance_id: Uuid,
    pub title: String,
    pub host_identity: Identity,
    pub host_display_name: String,
    pub join_code: Option<String>,
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub host_left_at: Option<DateTime<Utc>>,
    pub participants: HashMap<ConnectionId, Participant>,
    pub questions: Vec<Question>,
    pub analytics: AnalyticsCounters,
}

impl Session {
    /// Create a new session. The caller becomes the sole participant
    /// separately, via the registry's start operation.
    pub fn new(
        session_id: SessionId,
        title: String,
        host: &VerifiedIdentity,
        join_code: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            session_id,
            instance_id: Uuid::new_v4(),
            title,
            host_identity: host.identity.clone(),
            host_display_name: host.display_name.clone(),
            join_code,
            password,
            created_at: Utc::now(),
            host_left_at: None,
            participants: HashMap::new(),
            questions: Vec::new(),
            analytics: AnalyticsCounters::default(),
        }
    }

    /// Number of participants currently holding the `host` role.
    pub fn host_count(&self) -> usize {
        self.participants
            .values()
            .filter(|p| p.role == Role::Host)
            .count()
    }

    /// Whether anyone currently holds the `host` role.
    pub fn has_host(&self) -> bool {
        self.host_count() > 0
    }

    /// The role a fresh join receives.
    ///
    /// The original host identity reclaims `host` only while nobody else
    /// holds it; privileged kinds join as cohosts; everyone else as
    /// participants.
    pub fn role_for_join(&self, who: &VerifiedIdentity) -> Role {
        if who.identity == self.host_identity && !self.has_host() {
            Role::Host
        } else if who.kind.is_privileged() {
            Role::Cohost
        } else {
            Role::Participant
        }
    }

    /// Find a participant by stable identity.
    pub fn find_by_identity(&self, identity: &str) -> Option<&Participant> {
        self.participants.values().find(|p| p.identity == identity)
    }

    /// Find a participant's connection id by stable identity.
    pub fn connection_of(&self, identity: &str) -> Option<ConnectionId> {
        self.find_by_identity(identity).map(|p| p.connection_id)
    }

    /// Roster in join order, optionally excluding one connection (the
    /// caller, for initial sync).
    pub fn roster(&self, exclude: Option<&ConnectionId>) -> Vec<ParticipantInfo> {
        let mut entries: Vec<&Participant> = self
            .participants
            .values()
            .filter(|p| exclude.is_none_or(|e| *e != p.connection_id))
            .collect();
        entries.sort_by_key(|p| (p.joined_at, p.connection_id));
        entries.into_iter().map(Participant::info).collect()
    }

    /// All subscriber connection ids (for fan-out).
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.participants.keys().copied().collect()
    }

    /// Listing summary.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            title: self.title.clone(),
            host_display_name: self.host_display_name.clone(),
            participant_count: self.participants.len(),
            created_at: self.created_at,
            has_password: self.password.is_some(),
            join_code: self.join_code.clone(),
        }
    }

    /// Session age at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    /// Insert a participant and update the peak-participant watermark.
    pub fn insert_participant(&mut self, participant: Participant) {
        self.participants
            .insert(participant.connection_id, participant);
        let count = self.participants.len() as u64;
        if count > self.analytics.peak_participants {
            self.analytics.peak_participants = count;
        }
    }

    /// Resolve a moderation command: `caller` acting on `target_identity`.
    ///
    /// Returns the target's connection id, or `Unauthorized` when the
    /// caller lacks the role or the target holds `host`. A missing target
    /// resolves to `Ok(None)`: by the time the command arrived, the
    /// target was already gone, which is not an offense.
    pub fn moderation_target(
        &self,
        caller: &ConnectionId,
        target_identity: &str,
        allow_host_target: bool,
    ) -> Result<Option<ConnectionId>, CommandError> {
        let caller = self
            .participants
            .get(caller)
            .ok_or(CommandError::Unauthorized)?;
        if !caller.role.is_privileged() {
            return Err(CommandError::Unauthorized);
        }
        match self.find_by_identity(target_identity) {
            Some(target) if target.role == Role::Host && !allow_host_target => {
                Err(CommandError::Unauthorized)
            }
            Some(target) => Ok(Some(target.connection_id)),
            None => Ok(None),
        }
    }

    /// Look up a question by id.
    pub fn question_mut(&mut self, id: &Uuid) -> Option<&mut Question> {
        self.questions.iter_mut().find(|q| q.id == *id)
    }
}

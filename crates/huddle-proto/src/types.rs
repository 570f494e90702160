//! Shared types used by both commands and events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A participant's role within a session.
///
/// Role is orthogonal to connection state: it survives reconnection and can
/// change while the participant is active (host transfer, privileged joins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The single meeting owner. At most one per session outside the
    /// host-left window.
    Host,
    /// Privileged co-facilitator (managers and staff join as cohosts).
    Cohost,
    /// Ordinary attendee.
    Participant,
}

impl Role {
    /// Whether this role may issue moderation commands (mute, allow-speak,
    /// lower-hand, kick, answer-question).
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::Host | Role::Cohost)
    }
}

/// The caller category attached to a verified identity.
///
/// Supplied by the upstream identity layer, trusted for the lifetime of the
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallerKind {
    /// Restaurant floor staff.
    Staff,
    /// Shift or store manager.
    Manager,
    /// External or unauthenticated caller.
    Guest,
}

impl CallerKind {
    /// Privileged kinds join as cohosts and receive lobby-level notices.
    pub fn is_privileged(self) -> bool {
        matches!(self, CallerKind::Staff | CallerKind::Manager)
    }
}

/// Why a session was torn down.
///
/// The wire strings are the operator-facing phrases shown in session-ended
/// banners, so they are full words rather than identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndReason {
    /// A new `start_session` arrived for an already-active session id.
    #[serde(rename = "superseded")]
    Superseded,
    /// The last participant left.
    #[serde(rename = "empty")]
    Empty,
    /// The host ended the meeting explicitly.
    #[serde(rename = "ended by host")]
    EndedByHost,
    /// The host-left countdown expired with no replacement host.
    #[serde(rename = "host left")]
    HostLeft,
    /// Sweeper reclaimed a session with nobody in it.
    #[serde(rename = "no participants remaining")]
    NoParticipants,
    /// Sweeper reclaimed a session older than the hard age cap.
    #[serde(rename = "exceeded maximum duration")]
    MaxDuration,
}

impl EndReason {
    /// The operator-facing phrase, identical to the wire encoding.
    pub fn as_str(self) -> &'static str {
        match self {
            EndReason::Superseded => "superseded",
            EndReason::Empty => "empty",
            EndReason::EndedByHost => "ended by host",
            EndReason::HostLeft => "host left",
            EndReason::NoParticipants => "no participants remaining",
            EndReason::MaxDuration => "exceeded maximum duration",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One roster entry as seen by other participants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    /// Stable per-person identifier; survives reconnection.
    pub identity: String,
    /// Transient identifier of the current physical connection.
    pub connection_id: Uuid,
    /// Display name from the verified identity.
    pub display_name: String,
    /// Caller category.
    pub kind: CallerKind,
    /// Current role.
    pub role: Role,
    /// Camera on/off as last reported by the participant.
    pub has_video: bool,
    /// Microphone on/off as last reported by the participant.
    pub has_audio: bool,
    /// Whether a moderator muted this participant.
    pub is_muted: bool,
    /// Whether this participant is screen-sharing.
    pub is_sharing: bool,
    /// Whether the participant's hand is raised.
    pub hand_raised: bool,
    /// When this person first joined (preserved across reconnects).
    pub joined_at: DateTime<Utc>,
    /// Opaque identity on the external media transport, if the client
    /// provided one. Used by peers to map media streams to people.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_identity: Option<String>,
}

/// Summary of a live session, as returned by `list_sessions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Externally addressable session id.
    pub session_id: String,
    /// Meeting title.
    pub title: String,
    /// Display name of the current host.
    pub host_display_name: String,
    /// Number of participants currently in the roster.
    pub participant_count: usize,
    /// When the session started.
    pub created_at: DateTime<Utc>,
    /// Whether joining requires a password (the password itself never
    /// leaves the engine).
    pub has_password: bool,
    /// Join code, if one is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_code: Option<String>,
}

/// An audience question and its moderation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInfo {
    /// Question id, assigned by the engine.
    pub id: Uuid,
    /// Identity of the asker.
    pub identity: String,
    /// Display name of the asker.
    pub display_name: String,
    /// The question text.
    pub text: String,
    /// Distinct identities that upvoted.
    pub upvotes: u32,
    /// Whether a moderator marked it answered.
    pub answered: bool,
    /// When it was asked.
    pub asked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_privileges() {
        assert!(Role::Host.is_privileged());
        assert!(Role::Cohost.is_privileged());
        assert!(!Role::Participant.is_privileged());
    }

    #[test]
    fn end_reason_wire_strings() {
        let json = serde_json::to_string(&EndReason::EndedByHost).unwrap();
        assert_eq!(json, r#""ended by host""#);
        let back: EndReason = serde_json::from_str(r#""superseded""#).unwrap();
        assert_eq!(back, EndReason::Superseded);
        assert_eq!(EndReason::MaxDuration.to_string(), "exceeded maximum duration");
    }
}

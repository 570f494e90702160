//! Outbound event frames.
//!
//! Events are fanned out to three scopes: subscribers of one session, the
//! staff lobby, or a single identity. Delivery is fire-and-forget; the
//! schema carries everything a client needs to render without a follow-up
//! query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::types::{EndReason, ParticipantInfo, QuestionInfo, Role, SessionSummary};

/// Every notification the engine can push to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Handshake accepted; commands are now allowed on this connection.
    Ready {
        /// The connection id assigned by the gateway.
        connection_id: Uuid,
    },
    /// Command rejection. The only rejection the engine surfaces is
    /// `session_not_found`; everything else fails silently.
    Error {
        /// Stable error code.
        code: String,
        /// The session the rejected command addressed.
        session_id: String,
    },
    /// Initial sync for the caller after a successful start or join.
    Joined {
        /// The role the caller ended up with.
        role: Role,
        /// Everyone else currently in the session, in join order.
        roster: Vec<ParticipantInfo>,
    },
    /// Someone joined the session.
    ParticipantJoined {
        /// The new participant.
        participant: ParticipantInfo,
    },
    /// Someone left the session (gracefully, by kick, or after their grace
    /// period expired).
    ParticipantLeft {
        /// Their last connection id.
        connection_id: Uuid,
        /// Their display name, for the departure banner.
        display_name: String,
    },
    /// Full roster snapshot after a state change (media, sharing, roles).
    ParticipantsUpdated {
        /// Everyone in the session, in join order.
        roster: Vec<ParticipantInfo>,
    },
    /// Lobby notice: a session started.
    SessionStarted {
        /// Session id.
        session_id: String,
        /// Meeting title.
        title: String,
        /// Display name of the host.
        host_display_name: String,
    },
    /// A session ended, with the operator-facing reason.
    SessionEnded {
        /// Session id.
        session_id: String,
        /// Why it ended.
        reason: EndReason,
    },
    /// The session has no host; it will auto-end when the countdown hits
    /// zero.
    HostLeftCountdown {
        /// Seconds until the session is force-ended.
        seconds_remaining: u64,
    },
    /// The host role moved to another participant.
    HostTransferred {
        /// Identity of the new host.
        new_host_identity: String,
        /// Display name of the new host.
        new_host_display_name: String,
        /// Display name of the previous host.
        previous_host_display_name: String,
    },
    /// A participant raised their hand.
    HandRaised {
        /// Identity of the participant.
        identity: String,
        /// Their display name.
        display_name: String,
    },
    /// A participant's hand went down.
    HandLowered {
        /// Identity of the participant.
        identity: String,
    },
    /// Directed: a moderator asked this connection to mute itself. The
    /// engine signals intent only; the client applies it locally.
    YouWereMuted {
        /// The muted identity (the recipient).
        target_identity: String,
    },
    /// Directed: a moderator re-enabled this connection's audio.
    SpeakAllowed {
        /// The unmuted identity (the recipient).
        target_identity: String,
    },
    /// Directed: this connection was removed from the session.
    YouWereKicked {
        /// The session it was removed from.
        session_id: String,
    },
    /// A chat message.
    ChatMessage {
        /// Sender identity.
        identity: String,
        /// Sender display name.
        display_name: String,
        /// Message body.
        content: String,
        /// Server receive time.
        sent_at: DateTime<Utc>,
    },
    /// An emoji reaction.
    Reaction {
        /// Sender identity.
        identity: String,
        /// The emoji.
        emoji: String,
    },
    /// A new audience question.
    Question {
        /// The question record.
        question: QuestionInfo,
    },
    /// A question was marked answered.
    QuestionAnswered {
        /// The question id.
        question_id: Uuid,
    },
    /// A question gained an upvote.
    QuestionUpvoted {
        /// The question id.
        question_id: Uuid,
        /// Distinct upvoters after this vote.
        upvotes: u32,
    },
    /// Reply to `list_sessions`.
    SessionList {
        /// Live sessions, newest first.
        sessions: Vec<SessionSummary>,
    },
}

impl ServerEvent {
    /// Stable event name for logging and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Ready { .. } => "ready",
            ServerEvent::Error { .. } => "error",
            ServerEvent::Joined { .. } => "joined",
            ServerEvent::ParticipantJoined { .. } => "participant_joined",
            ServerEvent::ParticipantLeft { .. } => "participant_left",
            ServerEvent::ParticipantsUpdated { .. } => "participants_updated",
            ServerEvent::SessionStarted { .. } => "session_started",
            ServerEvent::SessionEnded { .. } => "session_ended",
            ServerEvent::HostLeftCountdown { .. } => "host_left_countdown",
            ServerEvent::HostTransferred { .. } => "host_transferred",
            ServerEvent::HandRaised { .. } => "hand_raised",
            ServerEvent::HandLowered { .. } => "hand_lowered",
            ServerEvent::YouWereMuted { .. } => "you_were_muted",
            ServerEvent::SpeakAllowed { .. } => "speak_allowed",
            ServerEvent::YouWereKicked { .. } => "you_were_kicked",
            ServerEvent::ChatMessage { .. } => "chat_message",
            ServerEvent::Reaction { .. } => "reaction",
            ServerEvent::Question { .. } => "question",
            ServerEvent::QuestionAnswered { .. } => "question_answered",
            ServerEvent::QuestionUpvoted { .. } => "question_upvoted",
            ServerEvent::SessionList { .. } => "session_list",
        }
    }
}

/// Encode an event as one JSON text frame.
pub fn encode_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(event)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_snake_case_tags() {
        let json = encode_event(&ServerEvent::HostLeftCountdown { seconds_remaining: 600 }).unwrap();
        assert!(json.contains(r#""type":"host_left_countdown""#));
        assert!(json.contains(r#""secondsRemaining":600"#));
    }

    #[test]
    fn session_ended_carries_reason_phrase() {
        let json = encode_event(&ServerEvent::SessionEnded {
            session_id: "m1".into(),
            reason: EndReason::Superseded,
        })
        .unwrap();
        assert!(json.contains(r#""reason":"superseded""#));
    }

    #[test]
    fn event_roundtrip() {
        let event = ServerEvent::HandRaised {
            identity: "u-3".into(),
            display_name: "Kim".into(),
        };
        let back: ServerEvent = serde_json::from_str(&encode_event(&event).unwrap()).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.name(), "hand_raised");
    }
}

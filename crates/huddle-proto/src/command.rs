//! Inbound command frames.
//!
//! Clients speak a closed vocabulary: every inbound frame is one of the
//! variants below, validated at the gateway before it reaches the registry.
//! Anything that does not parse is dropped at the connection boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ProtocolError;
use crate::types::CallerKind;

/// The authentication frame that must open every connection.
///
/// The tuple it carries comes pre-verified from the platform's identity
/// layer; the engine trusts it for the lifetime of the connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientHello {
    /// Stable per-person identifier.
    pub identity: String,
    /// Human-readable name shown to other participants.
    pub display_name: String,
    /// Caller category.
    pub kind: CallerKind,
    /// Opaque credential for the identity verifier, if the deployment
    /// requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// One inbound command, addressed to a single session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFrame {
    /// Target session. Empty for commands that address no session
    /// (`list_sessions`).
    #[serde(default)]
    pub session_id: String,
    /// The command itself.
    #[serde(flatten)]
    pub command: ClientCommand,
}

/// Every command a client can issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Start a session, superseding any live session with the same id.
    StartSession {
        /// Meeting title.
        title: String,
        /// Join code; the engine generates one when omitted.
        #[serde(default)]
        join_code: Option<String>,
        /// Optional password, surfaced to listings as `hasPassword`.
        #[serde(default)]
        password: Option<String>,
    },
    /// Join a live session.
    Join {
        /// Camera state at join.
        #[serde(default)]
        has_video: bool,
        /// Microphone state at join.
        #[serde(default)]
        has_audio: bool,
        /// Opaque identity on the external media transport.
        #[serde(default)]
        transport_identity: Option<String>,
    },
    /// Leave gracefully. Unlike a dropped connection, this removes the
    /// participant immediately with no grace period.
    Leave,
    /// End the session for everyone. Host only.
    End,
    /// Hand the host role to another participant. Host only.
    TransferHost {
        /// Identity of the new host.
        target_identity: String,
        /// Display name override for the new host.
        #[serde(default)]
        target_display_name: Option<String>,
    },
    /// Raise the caller's hand.
    RaiseHand,
    /// Lower the caller's hand.
    LowerHand,
    /// Lower someone else's hand. Host/cohost only.
    LowerHandTarget {
        /// Identity whose hand is lowered.
        target_identity: String,
    },
    /// Ask a participant to mute. Host/cohost only; cannot target the host.
    MuteParticipant {
        /// Identity being muted.
        target_identity: String,
    },
    /// Allow a muted participant to speak again. Host/cohost only.
    AllowSpeak {
        /// Identity being unmuted.
        target_identity: String,
    },
    /// Remove a participant from the session. Host/cohost only; cannot
    /// target the host.
    KickParticipant {
        /// Identity being removed.
        target_identity: String,
    },
    /// Update the caller's own media state. Omitted fields are unchanged.
    MediaUpdate {
        /// New camera state.
        #[serde(default)]
        has_video: Option<bool>,
        /// New microphone state.
        #[serde(default)]
        has_audio: Option<bool>,
    },
    /// Start or stop screen sharing.
    ScreenShare {
        /// Whether the caller is now sharing.
        sharing: bool,
    },
    /// Send a chat message to the session.
    Chat {
        /// Message body.
        content: String,
    },
    /// Send an emoji reaction.
    Reaction {
        /// The reaction emoji.
        emoji: String,
    },
    /// Ask a question.
    Question {
        /// Question text.
        text: String,
    },
    /// Mark a question answered. Host/cohost only.
    AnswerQuestion {
        /// Question being answered.
        question_id: Uuid,
    },
    /// Upvote a question. Idempotent per identity.
    UpvoteQuestion {
        /// Question being upvoted.
        question_id: Uuid,
    },
    /// List live sessions.
    ListSessions,
}

impl ClientCommand {
    /// Stable command name for logging and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::StartSession { .. } => "start_session",
            ClientCommand::Join { .. } => "join",
            ClientCommand::Leave => "leave",
            ClientCommand::End => "end",
            ClientCommand::TransferHost { .. } => "transfer_host",
            ClientCommand::RaiseHand => "raise_hand",
            ClientCommand::LowerHand => "lower_hand",
            ClientCommand::LowerHandTarget { .. } => "lower_hand_target",
            ClientCommand::MuteParticipant { .. } => "mute_participant",
            ClientCommand::AllowSpeak { .. } => "allow_speak",
            ClientCommand::KickParticipant { .. } => "kick_participant",
            ClientCommand::MediaUpdate { .. } => "media_update",
            ClientCommand::ScreenShare { .. } => "screen_share",
            ClientCommand::Chat { .. } => "chat",
            ClientCommand::Reaction { .. } => "reaction",
            ClientCommand::Question { .. } => "question",
            ClientCommand::AnswerQuestion { .. } => "answer_question",
            ClientCommand::UpvoteQuestion { .. } => "upvote_question",
            ClientCommand::ListSessions => "list_sessions",
        }
    }
}

/// Decode an inbound command frame from one JSON text message.
pub fn decode_command(text: &str) -> Result<CommandFrame, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Decode the `hello` frame that must be the first message on a connection.
pub fn decode_hello(text: &str) -> Result<ClientHello, ProtocolError> {
    #[derive(Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    enum FirstFrame {
        Hello(ClientHello),
    }
    let FirstFrame::Hello(hello) = serde_json::from_str(text)?;
    Ok(hello)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_tagged_command_with_camel_case_fields() {
        let frame = decode_command(
            r#"{"type":"start_session","sessionId":"m1","title":"Pre-shift","joinCode":"482913"}"#,
        )
        .unwrap();
        assert_eq!(frame.session_id, "m1");
        match frame.command {
            ClientCommand::StartSession { title, join_code, password } => {
                assert_eq!(title, "Pre-shift");
                assert_eq!(join_code.as_deref(), Some("482913"));
                assert!(password.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unit_commands_need_no_fields() {
        let frame = decode_command(r#"{"type":"leave","sessionId":"m1"}"#).unwrap();
        assert_eq!(frame.command, ClientCommand::Leave);

        // list_sessions may omit the session id entirely
        let frame = decode_command(r#"{"type":"list_sessions"}"#).unwrap();
        assert_eq!(frame.command, ClientCommand::ListSessions);
        assert!(frame.session_id.is_empty());
    }

    #[test]
    fn join_defaults_media_off() {
        let frame = decode_command(r#"{"type":"join","sessionId":"m1"}"#).unwrap();
        match frame.command {
            ClientCommand::Join { has_video, has_audio, transport_identity } => {
                assert!(!has_video);
                assert!(!has_audio);
                assert!(transport_identity.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(decode_command(r#"{"type":"reboot_store","sessionId":"m1"}"#).is_err());
    }

    #[test]
    fn hello_must_be_first_frame() {
        let hello = decode_hello(
            r#"{"type":"hello","identity":"u-9","displayName":"Dana","kind":"manager"}"#,
        )
        .unwrap();
        assert_eq!(hello.identity, "u-9");
        assert_eq!(hello.kind, CallerKind::Manager);
        assert!(hello.token.is_none());

        // a command is not a greeting
        assert!(decode_hello(r#"{"type":"chat","sessionId":"m1","content":"hi"}"#).is_err());
    }

    #[test]
    fn command_names_match_wire_tags() {
        let frame = decode_command(r#"{"type":"raise_hand","sessionId":"m1"}"#).unwrap();
        assert_eq!(frame.command.name(), "raise_hand");
    }
}

//! Unified error handling for huddled.
//!
//! One taxonomy for everything a command can do wrong, with metric labeling
//! and a single mapping to the wire: `NotFound` is the only rejection a
//! client ever sees.

use huddle_proto::ServerEvent;
use thiserror::Error;

/// Errors that can occur while processing a client command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command referenced a session id with no live session.
    #[error("session not found: {0}")]
    NotFound(String),

    /// A privileged command arrived from a role that may not issue it, or
    /// targeted someone it may not touch. Dropped without a reply: the UI
    /// only offers privileged controls to privileged roles, so the sender
    /// is either stale or probing. This silent drop is a deliberate UX
    /// choice inherited from the platform; whether unauthorized attempts
    /// deserve louder audit logging than `debug` is an open question.
    #[error("unauthorized")]
    Unauthorized,

    /// Teardown or cancellation raced something that already happened
    /// (double force-end, cancelling a fired timer). Always a safe no-op.
    #[error("already terminated")]
    AlreadyTerminated,

    /// A directed event could not be queued because the recipient is gone.
    /// Never surfaced; the recipient's grace handling covers its absence.
    #[error("send failed: {0}")]
    Send(String),

    /// Analytics store failure. Logged and swallowed; never blocks or
    /// rolls back live-session state.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl CommandError {
    /// Static error code for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "session_not_found",
            Self::Unauthorized => "unauthorized",
            Self::AlreadyTerminated => "already_terminated",
            Self::Send(_) => "send_error",
            Self::Persistence(_) => "persistence_error",
        }
    }

    /// Convert to a client-visible error event.
    ///
    /// Returns `None` for errors that don't warrant a reply, which is all
    /// of them except `NotFound`.
    pub fn to_event(&self) -> Option<ServerEvent> {
        match self {
            Self::NotFound(session_id) => Some(ServerEvent::Error {
                code: "session_not_found".to_string(),
                session_id: session_id.clone(),
            }),
            Self::Unauthorized
            | Self::AlreadyTerminated
            | Self::Send(_)
            | Self::Persistence(_) => None,
        }
    }
}

/// Result type for command handlers.
pub type CommandResult = Result<(), CommandError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(CommandError::NotFound("m1".into()).error_code(), "session_not_found");
        assert_eq!(CommandError::Unauthorized.error_code(), "unauthorized");
        assert_eq!(CommandError::AlreadyTerminated.error_code(), "already_terminated");
    }

    #[test]
    fn only_not_found_reaches_the_wire() {
        let event = CommandError::NotFound("m1".into()).to_event();
        assert!(matches!(
            event,
            Some(ServerEvent::Error { ref code, ref session_id })
                if code == "session_not_found" && session_id == "m1"
        ));

        assert!(CommandError::Unauthorized.to_event().is_none());
        assert!(CommandError::AlreadyTerminated.to_event().is_none());
        assert!(CommandError::Persistence("disk full".into()).to_event().is_none());
    }
}

//! Command handlers.
//!
//! [`dispatch`] routes each decoded command to its handler. The command set
//! is a closed enum validated at the gateway, so routing is a plain match;
//! handlers share the rejection policy from [`crate::error`]: only
//! `session_not_found` is answered, everything else fails silently.

mod engage;
mod media;
mod session;

use std::sync::Arc;
use tracing::debug;

use huddle_proto::{ClientCommand, CommandFrame};

use crate::error::CommandResult;
use crate::metrics;
use crate::state::registry::SessionRegistry;
use crate::state::session::{ConnectionId, SessionId, VerifiedIdentity};
use crate::telemetry::CommandTimer;

/// Handler context passed to each command handler.
pub struct Context<'a> {
    /// The connection issuing the command.
    pub conn: ConnectionId,
    /// The verified identity behind the connection.
    pub who: &'a VerifiedIdentity,
    /// Shared engine state.
    pub registry: &'a Arc<SessionRegistry>,
    /// The session this connection currently participates in, maintained
    /// by the session-lifecycle handlers.
    pub current_session: &'a mut Option<SessionId>,
}

/// Dispatch one inbound command.
///
/// Records latency and error metrics; sends the error event for loud
/// rejections and logs the silent ones at debug for audit.
pub async fn dispatch(ctx: &mut Context<'_>, frame: CommandFrame) {
    let name = frame.command.name();
    let _timer = CommandTimer::new(name);

    if let Err(e) = route(ctx, frame).await {
        metrics::record_command_error(name, e.error_code());
        match e.to_event() {
            Some(event) => {
                ctx.registry.broadcaster.send_to(&ctx.conn, event);
            }
            None => {
                debug!(
                    command = name,
                    connection = %ctx.conn,
                    identity = %ctx.who.identity,
                    error = e.error_code(),
                    "Command rejected silently"
                );
            }
        }
    }
}

async fn route(ctx: &mut Context<'_>, frame: CommandFrame) -> CommandResult {
    let sid = frame.session_id;
    match frame.command {
        ClientCommand::StartSession { title, join_code, password } => {
            session::start_session(ctx, sid, title, join_code, password).await
        }
        ClientCommand::Join { has_video, has_audio, transport_identity } => {
            session::join(ctx, sid, has_video, has_audio, transport_identity).await
        }
        ClientCommand::Leave => session::leave(ctx, &sid).await,
        ClientCommand::End => session::end(ctx, &sid).await,
        ClientCommand::TransferHost { target_identity, target_display_name } => {
            session::transfer_host(ctx, &sid, &target_identity, target_display_name).await
        }
        ClientCommand::ListSessions => session::list_sessions(ctx).await,
        ClientCommand::MediaUpdate { has_video, has_audio } => {
            media::media_update(ctx, &sid, has_video, has_audio).await
        }
        ClientCommand::ScreenShare { sharing } => media::screen_share(ctx, &sid, sharing).await,
        ClientCommand::MuteParticipant { target_identity } => {
            media::mute_participant(ctx, &sid, &target_identity).await
        }
        ClientCommand::AllowSpeak { target_identity } => {
            media::allow_speak(ctx, &sid, &target_identity).await
        }
        ClientCommand::RaiseHand => engage::raise_hand(ctx, &sid).await,
        ClientCommand::LowerHand => engage::lower_hand(ctx, &sid).await,
        ClientCommand::LowerHandTarget { target_identity } => {
            engage::lower_hand_target(ctx, &sid, &target_identity).await
        }
        ClientCommand::KickParticipant { target_identity } => {
            engage::kick_participant(ctx, &sid, &target_identity).await
        }
        ClientCommand::Chat { content } => engage::chat(ctx, &sid, content).await,
        ClientCommand::Reaction { emoji } => engage::reaction(ctx, &sid, emoji).await,
        ClientCommand::Question { text } => engage::question(ctx, &sid, text).await,
        ClientCommand::AnswerQuestion { question_id } => {
            engage::answer_question(ctx, &sid, question_id).await
        }
        ClientCommand::UpvoteQuestion { question_id } => {
            engage::upvote_question(ctx, &sid, question_id).await
        }
    }
}

//! Media-state handlers: self-service updates and moderated mute control.
//!
//! The engine never touches media hardware. A mute directive is a signal
//! to the target's client to disable its own audio locally; the roster
//! flag tracks the intent so late joiners render it correctly.

use huddle_proto::ServerEvent;

use crate::error::{CommandError, CommandResult};
use crate::handlers::Context;

/// Self-service camera/microphone update. Omitted fields are unchanged.
pub async fn media_update(
    ctx: &mut Context<'_>,
    sid: &str,
    has_video: Option<bool>,
    has_audio: Option<bool>,
) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(participant) = session.participants.get_mut(&ctx.conn) else {
        return Ok(());
    };
    if let Some(video) = has_video {
        participant.has_video = video;
    }
    if let Some(audio) = has_audio {
        participant.has_audio = audio;
    }

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::ParticipantsUpdated { roster: session.roster(None) },
    );
    Ok(())
}

/// Self-service screen-share toggle.
pub async fn screen_share(ctx: &mut Context<'_>, sid: &str, sharing: bool) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(participant) = session.participants.get_mut(&ctx.conn) else {
        return Ok(());
    };
    participant.is_sharing = sharing;

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::ParticipantsUpdated { roster: session.roster(None) },
    );
    Ok(())
}

/// Host/cohost: ask a participant to mute. The host cannot be targeted.
pub async fn mute_participant(ctx: &mut Context<'_>, sid: &str, target_identity: &str) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(target_conn) = session.moderation_target(&ctx.conn, target_identity, false)? else {
        return Ok(());
    };
    if let Some(target) = session.participants.get_mut(&target_conn) {
        target.is_muted = true;
    }

    ctx.registry.broadcaster.send_to(
        &target_conn,
        ServerEvent::YouWereMuted { target_identity: target_identity.to_string() },
    );
    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::ParticipantsUpdated { roster: session.roster(None) },
    );
    Ok(())
}

/// Host/cohost: re-enable a muted participant's audio.
pub async fn allow_speak(ctx: &mut Context<'_>, sid: &str, target_identity: &str) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(target_conn) = session.moderation_target(&ctx.conn, target_identity, false)? else {
        return Ok(());
    };
    if let Some(target) = session.participants.get_mut(&target_conn) {
        target.is_muted = false;
    }

    ctx.registry.broadcaster.send_to(
        &target_conn,
        ServerEvent::SpeakAllowed { target_identity: target_identity.to_string() },
    );
    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::ParticipantsUpdated { roster: session.roster(None) },
    );
    Ok(())
}

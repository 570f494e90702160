//! Session lifecycle handlers: start, join, leave, end, transfer, list.

use huddle_proto::ServerEvent;

use crate::error::CommandResult;
use crate::handlers::Context;
use crate::state::session::SessionId;

/// A connection participates in at most one session. Starting or joining
/// another performs a graceful leave of the previous one first; that leave
/// is internal bookkeeping, so its outcome is deliberately discarded.
async fn leave_current(ctx: &mut Context<'_>, next: &str) {
    if let Some(previous) = ctx.current_session.take()
        && previous != next
    {
        let _ = ctx.registry.leave(&previous, ctx.conn).await;
    }
}

pub async fn start_session(
    ctx: &mut Context<'_>,
    sid: SessionId,
    title: String,
    join_code: Option<String>,
    password: Option<String>,
) -> CommandResult {
    leave_current(ctx, &sid).await;

    let (role, roster) = ctx
        .registry
        .start_session(&sid, ctx.conn, ctx.who, title, join_code, password)
        .await;

    *ctx.current_session = Some(sid);
    ctx.registry
        .broadcaster
        .send_to(&ctx.conn, ServerEvent::Joined { role, roster });
    Ok(())
}

pub async fn join(
    ctx: &mut Context<'_>,
    sid: SessionId,
    has_video: bool,
    has_audio: bool,
    transport_identity: Option<String>,
) -> CommandResult {
    leave_current(ctx, &sid).await;

    let (role, roster) = ctx
        .registry
        .join(&sid, ctx.conn, ctx.who, has_video, has_audio, transport_identity)
        .await?;

    *ctx.current_session = Some(sid);
    ctx.registry
        .broadcaster
        .send_to(&ctx.conn, ServerEvent::Joined { role, roster });
    Ok(())
}

pub async fn leave(ctx: &mut Context<'_>, sid: &str) -> CommandResult {
    if ctx.current_session.as_deref() == Some(sid) {
        *ctx.current_session = None;
    }
    ctx.registry.leave(sid, ctx.conn).await
}

pub async fn end(ctx: &mut Context<'_>, sid: &str) -> CommandResult {
    let result = ctx.registry.end_session(sid, ctx.conn).await;
    if result.is_ok() && ctx.current_session.as_deref() == Some(sid) {
        *ctx.current_session = None;
    }
    result
}

pub async fn transfer_host(
    ctx: &mut Context<'_>,
    sid: &str,
    target_identity: &str,
    target_display_name: Option<String>,
) -> CommandResult {
    ctx.registry
        .transfer_host(sid, ctx.conn, target_identity, target_display_name)
        .await
}

pub async fn list_sessions(ctx: &mut Context<'_>) -> CommandResult {
    let sessions = ctx.registry.session_summaries().await;
    ctx.registry
        .broadcaster
        .send_to(&ctx.conn, ServerEvent::SessionList { sessions });
    Ok(())
}

//! Engagement handlers: hands, chat, reactions, Q&A, kicks.

use chrono::Utc;
use uuid::Uuid;

use huddle_proto::ServerEvent;

use crate::db::Activity;
use crate::error::{CommandError, CommandResult};
use crate::handlers::Context;
use crate::state::session::Question;

pub async fn raise_hand(ctx: &mut Context<'_>, sid: &str) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(participant) = session.participants.get_mut(&ctx.conn) else {
        return Ok(());
    };
    if participant.hand_raised {
        return Ok(());
    }
    participant.hand_raised = true;
    let identity = participant.identity.clone();
    let display_name = participant.display_name.clone();

    ctx.registry
        .aggregator
        .record_activity(&mut session, &identity, Activity::HandRaise);

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::HandRaised { identity, display_name },
    );
    Ok(())
}

pub async fn lower_hand(ctx: &mut Context<'_>, sid: &str) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(participant) = session.participants.get_mut(&ctx.conn) else {
        return Ok(());
    };
    if !participant.hand_raised {
        return Ok(());
    }
    participant.hand_raised = false;
    let identity = participant.identity.clone();

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::HandLowered { identity },
    );
    Ok(())
}

/// Host/cohost: lower someone else's hand.
pub async fn lower_hand_target(
    ctx: &mut Context<'_>,
    sid: &str,
    target_identity: &str,
) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(target_conn) = session.moderation_target(&ctx.conn, target_identity, true)? else {
        return Ok(());
    };
    let Some(target) = session.participants.get_mut(&target_conn) else {
        return Ok(());
    };
    if !target.hand_raised {
        return Ok(());
    }
    target.hand_raised = false;
    let identity = target.identity.clone();

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::HandLowered { identity },
    );
    Ok(())
}

/// Host/cohost: remove a participant. The host cannot be targeted. The
/// target gets a directed notice, then the shared removal path applies the
/// usual leave consequences.
pub async fn kick_participant(
    ctx: &mut Context<'_>,
    sid: &str,
    target_identity: &str,
) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;

    let target_conn = {
        let session = handle.read().await;
        session.moderation_target(&ctx.conn, target_identity, false)?
    };
    let Some(target_conn) = target_conn else {
        return Ok(());
    };

    ctx.registry
        .remove_participant(
            sid,
            target_conn,
            Some(ServerEvent::YouWereKicked { session_id: sid.to_string() }),
        )
        .await;
    Ok(())
}

pub async fn chat(ctx: &mut Context<'_>, sid: &str, content: String) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(participant) = session.participants.get(&ctx.conn) else {
        return Ok(());
    };
    let identity = participant.identity.clone();
    let display_name = participant.display_name.clone();

    ctx.registry
        .aggregator
        .record_activity(&mut session, &identity, Activity::Message);

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::ChatMessage {
            identity,
            display_name,
            content,
            sent_at: Utc::now(),
        },
    );
    Ok(())
}

pub async fn reaction(ctx: &mut Context<'_>, sid: &str, emoji: String) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(participant) = session.participants.get(&ctx.conn) else {
        return Ok(());
    };
    let identity = participant.identity.clone();

    ctx.registry
        .aggregator
        .record_activity(&mut session, &identity, Activity::Reaction);

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::Reaction { identity, emoji },
    );
    Ok(())
}

pub async fn question(ctx: &mut Context<'_>, sid: &str, text: String) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(participant) = session.participants.get(&ctx.conn) else {
        return Ok(());
    };
    let question = Question {
        id: Uuid::new_v4(),
        identity: participant.identity.clone(),
        display_name: participant.display_name.clone(),
        text,
        upvoters: Default::default(),
        answered: false,
        asked_at: Utc::now(),
    };
    let identity = question.identity.clone();
    let info = question.info();
    session.questions.push(question);

    ctx.registry
        .aggregator
        .record_activity(&mut session, &identity, Activity::Question);

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::Question { question: info },
    );
    Ok(())
}

/// Host/cohost: mark a question answered.
pub async fn answer_question(ctx: &mut Context<'_>, sid: &str, question_id: Uuid) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let caller = session
        .participants
        .get(&ctx.conn)
        .ok_or(CommandError::Unauthorized)?;
    if !caller.role.is_privileged() {
        return Err(CommandError::Unauthorized);
    }

    let Some(question) = session.question_mut(&question_id) else {
        return Ok(());
    };
    if question.answered {
        return Ok(());
    }
    question.answered = true;

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::QuestionAnswered { question_id },
    );
    Ok(())
}

/// Upvote a question. Idempotent per identity.
pub async fn upvote_question(ctx: &mut Context<'_>, sid: &str, question_id: Uuid) -> CommandResult {
    let handle = ctx
        .registry
        .session(sid)
        .ok_or_else(|| CommandError::NotFound(sid.to_string()))?;
    let mut session = handle.write().await;

    let Some(participant) = session.participants.get(&ctx.conn) else {
        return Ok(());
    };
    let identity = participant.identity.clone();

    let Some(question) = session.question_mut(&question_id) else {
        return Ok(());
    };
    if !question.upvoters.insert(identity) {
        return Ok(());
    }
    let upvotes = question.upvoters.len() as u32;

    ctx.registry.broadcaster.send_to_all(
        session.connection_ids(),
        &ServerEvent::QuestionUpvoted { question_id, upvotes },
    );
    Ok(())
}

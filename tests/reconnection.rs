//! Integration tests for disconnect grace periods and reconnection.

mod common;

use common::TestServer;
use huddle_proto::{CallerKind, ClientCommand, Role, ServerEvent};
use huddled::config::TimingConfig;
use std::time::Duration;

fn short_grace() -> TimingConfig {
    TimingConfig {
        disconnect_grace_secs: 2,
        ..TimingConfig::default()
    }
}

#[tokio::test]
async fn reconnection_inside_grace_is_invisible_to_the_room() {
    let server = TestServer::spawn_with_timing(short_grace()).await.unwrap();

    let mut host = server.connect("alex", CallerKind::Manager).await.unwrap();
    host.send(
        "m1",
        ClientCommand::StartSession { title: "Huddle".into(), join_code: None, password: None },
    )
    .await
    .unwrap();
    host.recv_until(|e| matches!(e, ServerEvent::Joined { .. })).await.unwrap();

    let mut staff = server.connect("kim", CallerKind::Staff).await.unwrap();
    staff
        .send("m1", ClientCommand::Join { has_video: true, has_audio: true, transport_identity: None })
        .await
        .unwrap();
    staff.recv_until(|e| matches!(e, ServerEvent::Joined { .. })).await.unwrap();
    host.recv_until(|e| matches!(e, ServerEvent::ParticipantJoined { .. })).await.unwrap();

    let joined_at = {
        let handle = server.registry.session("m1").unwrap();
        let session = handle.read().await;
        session.find_by_identity("kim").unwrap().joined_at
    };

    // the socket drops without a leave
    staff.drop_connection().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    // same person, new connection, inside the 2s grace window
    let mut staff = server.connect("kim", CallerKind::Staff).await.unwrap();
    staff
        .send("m1", ClientCommand::Join { has_video: true, has_audio: true, transport_identity: None })
        .await
        .unwrap();
    let events = staff
        .recv_until(|e| matches!(e, ServerEvent::Joined { .. }))
        .await
        .unwrap();
    match events.last() {
        Some(ServerEvent::Joined { role, roster }) => {
            assert_eq!(*role, Role::Cohost, "role preserved across reconnect");
            assert_eq!(roster.len(), 1);
        }
        other => panic!("expected joined, got {other:?}"),
    }

    // join time preserved; the reattachment is the same membership
    {
        let handle = server.registry.session("m1").unwrap();
        let session = handle.read().await;
        assert_eq!(session.find_by_identity("kim").unwrap().joined_at, joined_at);
        assert_eq!(session.participants.len(), 2);
    }

    // the room never saw a departure/arrival pair, even after the original
    // grace deadline has long passed
    tokio::time::sleep(Duration::from_secs(3)).await;
    host.expect_silence(Duration::from_millis(300))
        .await
        .expect("reconciliation must be silent");
}

#[tokio::test]
async fn grace_expiry_removes_the_participant_like_a_leave() {
    let server = TestServer::spawn_with_timing(short_grace()).await.unwrap();

    let mut host = server.connect("alex", CallerKind::Manager).await.unwrap();
    host.send(
        "m1",
        ClientCommand::StartSession { title: "Huddle".into(), join_code: None, password: None },
    )
    .await
    .unwrap();
    host.recv_until(|e| matches!(e, ServerEvent::Joined { .. })).await.unwrap();

    let mut staff = server.connect("kim", CallerKind::Staff).await.unwrap();
    staff
        .send("m1", ClientCommand::Join { has_video: false, has_audio: false, transport_identity: None })
        .await
        .unwrap();
    staff.recv_until(|e| matches!(e, ServerEvent::Joined { .. })).await.unwrap();
    host.recv_until(|e| matches!(e, ServerEvent::ParticipantJoined { .. })).await.unwrap();

    staff.drop_connection().await.unwrap();

    // nobody reconnects; the grace timer removes them
    let events = host
        .recv_until(|e| matches!(e, ServerEvent::ParticipantLeft { .. }))
        .await
        .unwrap();
    match events.last() {
        Some(ServerEvent::ParticipantLeft { display_name, .. }) => {
            assert_eq!(display_name, "KIM");
        }
        other => panic!("expected participant_left, got {other:?}"),
    }

    let handle = server.registry.session("m1").unwrap();
    assert!(handle.read().await.find_by_identity("kim").is_none());
}

#[tokio::test]
async fn sole_participant_dropping_empties_and_ends_the_session() {
    let server = TestServer::spawn_with_timing(short_grace()).await.unwrap();

    let mut host = server.connect("alex", CallerKind::Manager).await.unwrap();
    host.send(
        "m1",
        ClientCommand::StartSession { title: "Huddle".into(), join_code: None, password: None },
    )
    .await
    .unwrap();
    host.recv_until(|e| matches!(e, ServerEvent::Joined { .. })).await.unwrap();

    host.drop_connection().await.unwrap();

    // grace expires, the session empties and is torn down
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(server.registry.session_count(), 0);
}

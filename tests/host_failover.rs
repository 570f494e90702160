//! Integration tests for host departure: the countdown, the rescue paths,
//! and moderation privileges around the host seat.

mod common;

use common::TestServer;
use huddle_proto::{CallerKind, ClientCommand, EndReason, Role, ServerEvent};
use huddled::config::TimingConfig;
use std::time::Duration;

fn fast_timing() -> TimingConfig {
    TimingConfig {
        host_left_countdown_secs: 2,
        host_left_checkpoints_secs: vec![1],
        ..TimingConfig::default()
    }
}

async fn start_with_cohost(
    server: &TestServer,
) -> (common::TestClient, common::TestClient) {
    let mut host = server.connect("alex", CallerKind::Manager).await.unwrap();
    host.send(
        "m1",
        ClientCommand::StartSession { title: "Huddle".into(), join_code: None, password: None },
    )
    .await
    .unwrap();
    host.recv_until(|e| matches!(e, ServerEvent::Joined { .. })).await.unwrap();

    let mut cohost = server.connect("kim", CallerKind::Staff).await.unwrap();
    cohost
        .send("m1", ClientCommand::Join { has_video: false, has_audio: false, transport_identity: None })
        .await
        .unwrap();
    cohost.recv_until(|e| matches!(e, ServerEvent::Joined { .. })).await.unwrap();
    host.recv_until(|e| matches!(e, ServerEvent::ParticipantJoined { .. })).await.unwrap();

    (host, cohost)
}

#[tokio::test]
async fn host_leave_starts_the_countdown_and_cohost_rescue_stops_it() {
    let server = TestServer::spawn_with_timing(fast_timing()).await.unwrap();
    let (mut host, mut cohost) = start_with_cohost(&server).await;

    host.send("m1", ClientCommand::Leave).await.unwrap();

    // the survivor sees the departure and the immediate countdown notice
    let events = cohost
        .recv_until(|e| matches!(e, ServerEvent::HostLeftCountdown { .. }))
        .await
        .unwrap();
    assert!(matches!(
        events.last(),
        Some(ServerEvent::HostLeftCountdown { seconds_remaining: 2 })
    ));

    // the cohost claims the host seat before expiry
    cohost
        .send(
            "m1",
            ClientCommand::TransferHost { target_identity: "kim".into(), target_display_name: None },
        )
        .await
        .unwrap();
    let events = cohost
        .recv_until(|e| matches!(e, ServerEvent::HostTransferred { .. }))
        .await
        .unwrap();
    match events.last() {
        Some(ServerEvent::HostTransferred { new_host_identity, previous_host_display_name, .. }) => {
            assert_eq!(new_host_identity, "kim");
            assert_eq!(previous_host_display_name, "ALEX");
        }
        other => panic!("expected host_transferred, got {other:?}"),
    }

    // well past the 2s countdown: the session survives
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(server.registry.session_count(), 1);
    {
        let handle = server.registry.session("m1").unwrap();
        let session = handle.read().await;
        assert_eq!(session.host_identity, "kim");
        assert!(session.host_left_at.is_none());
    }
}

#[tokio::test]
async fn countdown_expiry_force_ends_the_session() {
    let server = TestServer::spawn_with_timing(fast_timing()).await.unwrap();
    let (mut host, mut cohost) = start_with_cohost(&server).await;

    host.send("m1", ClientCommand::Leave).await.unwrap();

    let events = cohost
        .recv_until(|e| matches!(e, ServerEvent::SessionEnded { .. }))
        .await
        .unwrap();
    assert!(matches!(
        events.last(),
        Some(ServerEvent::SessionEnded { reason: EndReason::HostLeft, .. })
    ));
    // the checkpoint reminder fired on the way down
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::HostLeftCountdown { seconds_remaining: 1 }
    )));

    assert_eq!(server.registry.session_count(), 0);
}

#[tokio::test]
async fn explicit_transfer_hands_over_the_seat_and_demotes_the_caller() {
    let server = TestServer::spawn().await.unwrap();
    let (mut host, mut cohost) = start_with_cohost(&server).await;

    host.send(
        "m1",
        ClientCommand::TransferHost {
            target_identity: "kim".into(),
            target_display_name: Some("Kim (closing)".into()),
        },
    )
    .await
    .unwrap();

    let events = cohost
        .recv_until(|e| matches!(e, ServerEvent::ParticipantsUpdated { .. }))
        .await
        .unwrap();
    match events.last() {
        Some(ServerEvent::ParticipantsUpdated { roster }) => {
            let kim = roster.iter().find(|p| p.identity == "kim").unwrap();
            let alex = roster.iter().find(|p| p.identity == "alex").unwrap();
            assert_eq!(kim.role, Role::Host);
            assert_eq!(kim.display_name, "Kim (closing)");
            assert_eq!(alex.role, Role::Cohost, "manager demotes to cohost, not participant");
        }
        other => panic!("expected participants_updated, got {other:?}"),
    }
}

#[tokio::test]
async fn transfer_from_unprivileged_caller_is_silently_ignored() {
    let server = TestServer::spawn().await.unwrap();
    let (mut host, _cohost) = start_with_cohost(&server).await;

    let mut guest = server.connect("pat", CallerKind::Guest).await.unwrap();
    guest
        .send("m1", ClientCommand::Join { has_video: false, has_audio: false, transport_identity: None })
        .await
        .unwrap();
    guest.recv_until(|e| matches!(e, ServerEvent::Joined { .. })).await.unwrap();
    host.recv_until(|e| matches!(e, ServerEvent::ParticipantJoined { .. })).await.unwrap();

    guest
        .send(
            "m1",
            ClientCommand::TransferHost { target_identity: "pat".into(), target_display_name: None },
        )
        .await
        .unwrap();
    guest
        .expect_silence(Duration::from_millis(300))
        .await
        .expect("unauthorized transfer must be silent");

    let handle = server.registry.session("m1").unwrap();
    assert_eq!(handle.read().await.host_identity, "alex");
}

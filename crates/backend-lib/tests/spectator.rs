// ============================
// crates/backend-lib/tests/spectator.rs
// ============================
//! Spectating: graph and session stay in step, the spectator channel
//! lives exactly as long as the host has spectators.
mod common;

use backend_lib::channels::spectator_channel_name;
use bancho_common::{
    ClientPacketId, Encode, ReplayAction, ReplayFrame, ReplayFrameBundle, ScoreFrame,
    ServerPacketId,
};
use common::*;

fn frames_packet() -> Vec<u8> {
    let bundle = ReplayFrameBundle {
        extra: 0,
        frames: vec![ReplayFrame {
            button_state: 1,
            taiko_byte: 0,
            x: 256.0,
            y: 192.0,
            time: 1500,
        }],
        action: ReplayAction::Standard,
        score_frame: ScoreFrame::default(),
        sequence: 1,
    };
    packet(ClientPacketId::SpectateFrames, |w| bundle.encode(w))
}

#[tokio::test]
async fn test_spectate_and_stop() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;
    let carol = login_as(&state, "carol").await;

    send(&state, bob.session_id, &i32_packet(ClientPacketId::StartSpectating, ALICE)).await;
    send(&state, carol.session_id, &i32_packet(ClientPacketId::StartSpectating, ALICE)).await;

    let mut watchers = state.spectators.members(alice.session_id).await.unwrap();
    watchers.sort();
    let mut expected = vec![bob.session_id, carol.session_id];
    expected.sort();
    assert_eq!(watchers, expected);
    for session in [&bob, &carol] {
        let reloaded = reload(&state, session).await;
        assert_eq!(reloaded.spectator_host_session_id, Some(alice.session_id));
    }

    let ids = drain_ids(&state, alice.session_id).await;
    assert_eq!(count(&ids, ServerPacketId::SpectatorJoined), 2);
    assert!(contains(&ids, ServerPacketId::ChannelJoinSuccess));
    let ids = drain_ids(&state, bob.session_id).await;
    assert!(contains(&ids, ServerPacketId::FellowSpectatorJoined));
    drain_everyone(&state).await;

    // Frames reach every spectator and nobody else
    send(&state, alice.session_id, &frames_packet()).await;
    for session in [&bob, &carol] {
        let ids = drain_ids(&state, session.session_id).await;
        assert_eq!(ids, vec![u16::from(ServerPacketId::SpectateFrames)]);
    }
    assert!(drain_ids(&state, alice.session_id).await.is_empty());

    send(&state, bob.session_id, &empty_packet(ClientPacketId::StopSpectating)).await;
    assert_eq!(
        state.spectators.members(alice.session_id).await.unwrap(),
        vec![carol.session_id]
    );
    assert!(reload(&state, &bob).await.spectator_host_session_id.is_none());
    let ids = drain_ids(&state, alice.session_id).await;
    assert!(contains(&ids, ServerPacketId::SpectatorLeft));
    let ids = drain_ids(&state, carol.session_id).await;
    assert!(contains(&ids, ServerPacketId::FellowSpectatorLeft));

    // Last spectator leaving closes the channel
    send(&state, carol.session_id, &empty_packet(ClientPacketId::StopSpectating)).await;
    assert!(state.spectators.members(alice.session_id).await.unwrap().is_empty());
    assert!(state
        .channels
        .fetch_by_name(&spectator_channel_name(alice.session_id))
        .await
        .unwrap()
        .is_none());
    let ids = drain_ids(&state, alice.session_id).await;
    assert!(contains(&ids, ServerPacketId::ChannelKick));
}

#[tokio::test]
async fn test_switching_hosts_leaves_previous_host() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;
    let carol = login_as(&state, "carol").await;

    send(&state, carol.session_id, &i32_packet(ClientPacketId::StartSpectating, ALICE)).await;
    send(&state, carol.session_id, &i32_packet(ClientPacketId::StartSpectating, BOB)).await;

    assert!(state.spectators.members(alice.session_id).await.unwrap().is_empty());
    assert_eq!(
        state.spectators.members(bob.session_id).await.unwrap(),
        vec![carol.session_id]
    );
    assert_eq!(
        reload(&state, &carol).await.spectator_host_session_id,
        Some(bob.session_id)
    );
}

#[tokio::test]
async fn test_host_logout_releases_spectators() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    send(&state, bob.session_id, &i32_packet(ClientPacketId::StartSpectating, ALICE)).await;
    drain_everyone(&state).await;

    send(&state, alice.session_id, &i32_packet(ClientPacketId::Logout, 0)).await;

    assert!(reload(&state, &bob).await.spectator_host_session_id.is_none());
    assert!(state.spectators.members(alice.session_id).await.unwrap().is_empty());
    assert!(state
        .channels
        .fetch_by_name(&spectator_channel_name(alice.session_id))
        .await
        .unwrap()
        .is_none());

    let ids = drain_ids(&state, bob.session_id).await;
    assert!(contains(&ids, ServerPacketId::ChannelKick));
    assert!(contains(&ids, ServerPacketId::UserLogout));
}

#[tokio::test]
async fn test_cant_spectate_notifies_host() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    send(&state, bob.session_id, &i32_packet(ClientPacketId::StartSpectating, ALICE)).await;
    drain_everyone(&state).await;

    send(&state, bob.session_id, &empty_packet(ClientPacketId::CantSpectate)).await;
    let ids = drain_ids(&state, alice.session_id).await;
    assert_eq!(ids, vec![u16::from(ServerPacketId::SpectatorCantSpectate)]);
    assert!(drain_ids(&state, bob.session_id).await.is_empty());
}

#[tokio::test]
async fn test_spectating_self_is_ignored() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;

    send(&state, alice.session_id, &i32_packet(ClientPacketId::StartSpectating, ALICE)).await;
    assert!(reload(&state, &alice).await.spectator_host_session_id.is_none());
    assert!(state.spectators.members(alice.session_id).await.unwrap().is_empty());
}

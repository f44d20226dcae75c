// ============================
// crates/backend-lib/tests/match_flow.rs
// ============================
//! Multiplayer flows driven through the packet dispatcher.
mod common;

use std::sync::Arc;

use async_trait::async_trait;
use backend_lib::channels::match_channel_name;
use backend_lib::dispatch::process_packets;
use backend_lib::error::AppError;
use backend_lib::matches::MatchStatus;
use backend_lib::storage::{LockGuard, LockManager};
use backend_lib::AppState;
use bancho_common::{
    ClientPacketId, Decode, MatchDescriptor, Mods, PacketReader, ServerPacketId, SlotStatus,
};
use common::*;

fn descriptor(name: &str, password: &str, freemods: bool) -> MatchDescriptor {
    MatchDescriptor {
        name: name.to_string(),
        password: password.to_string(),
        beatmap_name: "xi - FREEDOM DiVE [FOUR DIMENSIONS]".to_string(),
        beatmap_id: 129891,
        beatmap_md5: "da8aae79c8f3306b5d65ec951874a7fb".to_string(),
        freemods,
        ..MatchDescriptor::default()
    }
}

fn create_packet(name: &str, password: &str, freemods: bool) -> Vec<u8> {
    let requested = descriptor(name, password, freemods);
    packet(ClientPacketId::CreateMatch, |w| requested.encode_with(w, true))
}

/// Same map and name as `create_packet`, only freemods changes.
fn settings_packet(freemods: bool) -> Vec<u8> {
    let requested = descriptor("test match", "", freemods);
    packet(ClientPacketId::MatchChangeSettings, |w| requested.encode_with(w, true))
}

fn join_packet(match_id: u16, password: &str) -> Vec<u8> {
    packet(ClientPacketId::JoinMatch, |w| {
        w.write_i32(i32::from(match_id)).write_string(password);
    })
}

fn mods_packet(mods: Mods) -> Vec<u8> {
    packet(ClientPacketId::MatchChangeMods, |w| {
        w.write_u32(mods.bits());
    })
}

/// Create a match as `host` and return its id.
async fn host_match(state: &AppState, host: &backend_lib::sessions::Session, password: &str) -> u16 {
    send(state, host.session_id, &create_packet("test match", password, false)).await;
    reload(state, host)
        .await
        .multiplayer_match_id
        .expect("host is not in the created match")
}

#[tokio::test]
async fn test_create_join_play_complete() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    let match_id = host_match(&state, &alice, "secret").await;
    let ids = drain_ids(&state, alice.session_id).await;
    assert!(contains(&ids, ServerPacketId::MatchJoinSuccess));
    assert!(contains(&ids, ServerPacketId::ChannelJoinSuccess));

    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert_eq!(m.host_account_id, ALICE);
    let host_slot = state.matches.fetch_slot(match_id, 0).await.unwrap().unwrap();
    assert_eq!(host_slot.account_id, Some(ALICE));
    assert_eq!(host_slot.status, SlotStatus::NOT_READY);

    // Wrong password
    send(&state, bob.session_id, &join_packet(match_id, "guess")).await;
    let ids = drain_ids(&state, bob.session_id).await;
    assert_eq!(ids, vec![u16::from(ServerPacketId::MatchJoinFail)]);
    assert!(reload(&state, &bob).await.multiplayer_match_id.is_none());

    send(&state, bob.session_id, &join_packet(match_id, "secret")).await;
    let bob_slot = state.matches.fetch_slot(match_id, 1).await.unwrap().unwrap();
    assert_eq!(bob_slot.account_id, Some(BOB));

    // Everyone seated sees the join
    for session in [&alice, &bob] {
        let packets = drain(&state, session.session_id).await;
        if session.session_id == bob.session_id {
            assert!(packets
                .iter()
                .any(|(id, _)| *id == u16::from(ServerPacketId::MatchJoinSuccess)));
        }
        let (_, body) = packets
            .iter()
            .rev()
            .find(|(id, _)| *id == u16::from(ServerPacketId::UpdateMatch))
            .expect("no match update after the join");
        let update = MatchDescriptor::decode(&mut PacketReader::new(body)).unwrap();
        let seated = update.slot_statuses.iter().filter(|s| s.has_player()).count();
        assert_eq!(seated, 2);
        assert_eq!(update.slot_account_ids, vec![ALICE, BOB]);
        assert_eq!(update.password, "secret");
    }

    let ready = empty_packet(ClientPacketId::MatchReady);
    send(&state, alice.session_id, &ready).await;
    send(&state, bob.session_id, &ready).await;
    drain_everyone(&state).await;

    // Only the host can start
    send(&state, bob.session_id, &empty_packet(ClientPacketId::MatchStart)).await;
    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert_eq!(m.status, MatchStatus::Waiting);

    send(&state, alice.session_id, &empty_packet(ClientPacketId::MatchStart)).await;
    for session in [&alice, &bob] {
        let ids = drain_ids(&state, session.session_id).await;
        assert_eq!(count(&ids, ServerPacketId::MatchStart), 1);
    }
    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert_eq!(m.status, MatchStatus::Playing);

    let complete = empty_packet(ClientPacketId::MatchComplete);
    send(&state, alice.session_id, &complete).await;
    let ids = drain_ids(&state, alice.session_id).await;
    assert!(!contains(&ids, ServerPacketId::MatchComplete));
    let alice_slot = state.matches.fetch_slot(match_id, 0).await.unwrap().unwrap();
    assert_eq!(alice_slot.status, SlotStatus::COMPLETE);
    let bob_slot = state.matches.fetch_slot(match_id, 1).await.unwrap().unwrap();
    assert_eq!(bob_slot.status, SlotStatus::PLAYING);

    send(&state, bob.session_id, &complete).await;
    // A stray second completion must not end the round again
    send(&state, bob.session_id, &complete).await;
    for session in [&alice, &bob] {
        let ids = drain_ids(&state, session.session_id).await;
        assert_eq!(count(&ids, ServerPacketId::MatchComplete), 1);
    }

    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert_eq!(m.status, MatchStatus::Waiting);
    for slot in state.matches.fetch_slots(match_id).await.unwrap() {
        if slot.is_occupied() {
            assert_eq!(slot.status, SlotStatus::NOT_READY);
            assert!(!slot.loaded);
        }
    }
}

#[tokio::test]
async fn test_lobby_listing_hides_password() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    send(&state, bob.session_id, &empty_packet(ClientPacketId::JoinLobby)).await;
    drain_everyone(&state).await;

    host_match(&state, &alice, "secret").await;

    let packets = drain(&state, bob.session_id).await;
    let (_, body) = packets
        .iter()
        .find(|(id, _)| *id == u16::from(ServerPacketId::NewMatch))
        .expect("lobby did not hear about the new match");
    let listed = MatchDescriptor::decode(&mut PacketReader::new(body)).unwrap();
    assert_eq!(listed.name, "test match");
    assert_eq!(listed.password, "");
    assert_eq!(listed.host_account_id, ALICE);
}

#[tokio::test]
async fn test_host_migrates_when_host_leaves() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;
    let carol = login_as(&state, "carol").await;

    let match_id = host_match(&state, &alice, "").await;
    send(&state, bob.session_id, &join_packet(match_id, "")).await;
    send(&state, carol.session_id, &join_packet(match_id, "")).await;
    send(&state, carol.session_id, &empty_packet(ClientPacketId::MatchReady)).await;
    drain_everyone(&state).await;
    let carol_before = state.matches.fetch_slot(match_id, 2).await.unwrap().unwrap();
    assert_eq!(carol_before.status, SlotStatus::READY);

    send(&state, alice.session_id, &empty_packet(ClientPacketId::PartMatch)).await;

    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert_eq!(m.host_account_id, BOB);

    // Carol's slot is left exactly as it was
    let carol_after = state.matches.fetch_slot(match_id, 2).await.unwrap().unwrap();
    assert_eq!(carol_after, carol_before);
    assert!(reload(&state, &alice).await.multiplayer_match_id.is_none());

    let ids = drain_ids(&state, bob.session_id).await;
    assert!(contains(&ids, ServerPacketId::MatchTransferHost));
    let ids = drain_ids(&state, carol.session_id).await;
    assert!(!contains(&ids, ServerPacketId::MatchTransferHost));
    assert!(contains(&ids, ServerPacketId::UpdateMatch));

    // Alice was kicked from the match channel
    let ids = drain_ids(&state, alice.session_id).await;
    assert!(contains(&ids, ServerPacketId::ChannelKick));

    let slot = state.matches.fetch_slot(match_id, 0).await.unwrap().unwrap();
    assert!(!slot.is_occupied());
    assert_eq!(slot.status, SlotStatus::OPEN);
}

#[tokio::test]
async fn test_last_player_leaving_disposes_match() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    let match_id = host_match(&state, &alice, "").await;
    send(&state, bob.session_id, &empty_packet(ClientPacketId::JoinLobby)).await;
    drain_everyone(&state).await;

    send(&state, alice.session_id, &empty_packet(ClientPacketId::PartMatch)).await;

    assert!(state.matches.fetch_one(match_id).await.unwrap().is_none());
    assert!(state.matches.fetch_slots(match_id).await.unwrap().is_empty());
    assert!(state
        .channels
        .fetch_by_name(&match_channel_name(match_id))
        .await
        .unwrap()
        .is_none());

    let ids = drain_ids(&state, bob.session_id).await;
    assert!(contains(&ids, ServerPacketId::DisposeMatch));
}

#[tokio::test]
async fn test_logout_leaves_match() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    let match_id = host_match(&state, &alice, "").await;
    send(&state, bob.session_id, &join_packet(match_id, "")).await;
    drain_everyone(&state).await;

    send(&state, bob.session_id, &i32_packet(ClientPacketId::Logout, 0)).await;

    assert!(state.sessions.fetch_by_id(bob.session_id).await.unwrap().is_none());
    let slots = state.matches.fetch_slots(match_id).await.unwrap();
    assert_eq!(slots.iter().filter(|s| s.is_occupied()).count(), 1);
    let ids = drain_ids(&state, alice.session_id).await;
    assert!(contains(&ids, ServerPacketId::UpdateMatch));
    assert!(contains(&ids, ServerPacketId::UserLogout));
}

#[tokio::test]
async fn test_freemods_splits_speed_mods() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    send(&state, alice.session_id, &create_packet("free", "", true)).await;
    let match_id = reload(&state, &alice).await.multiplayer_match_id.unwrap();
    send(&state, bob.session_id, &join_packet(match_id, "")).await;

    send(&state, alice.session_id, &mods_packet(Mods::DOUBLE_TIME | Mods::HIDDEN)).await;
    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert_eq!(m.mods, Mods::DOUBLE_TIME);
    let host_slot = state.matches.fetch_slot(match_id, 0).await.unwrap().unwrap();
    assert_eq!(host_slot.mods, Mods::HIDDEN);

    // A non-host only changes its own slot, speed mods are ignored
    send(&state, bob.session_id, &mods_packet(Mods::HALF_TIME | Mods::HARD_ROCK)).await;
    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert_eq!(m.mods, Mods::DOUBLE_TIME);
    let bob_slot = state.matches.fetch_slot(match_id, 1).await.unwrap().unwrap();
    assert_eq!(bob_slot.mods, Mods::HARD_ROCK);
}

#[tokio::test]
async fn test_toggling_freemods_moves_mods_between_match_and_slots() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    let match_id = host_match(&state, &alice, "").await;
    send(&state, bob.session_id, &join_packet(match_id, "")).await;
    send(&state, alice.session_id, &mods_packet(Mods::DOUBLE_TIME | Mods::HIDDEN)).await;

    send(&state, alice.session_id, &settings_packet(true)).await;
    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert!(m.freemods);
    assert_eq!(m.mods, Mods::DOUBLE_TIME);
    for slot_id in [0, 1] {
        let slot = state.matches.fetch_slot(match_id, slot_id).await.unwrap().unwrap();
        assert_eq!(slot.mods, Mods::HIDDEN);
    }
    let empty = state.matches.fetch_slot(match_id, 2).await.unwrap().unwrap();
    assert_eq!(empty.mods, Mods::empty());

    send(&state, alice.session_id, &settings_packet(false)).await;
    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert!(!m.freemods);
    assert_eq!(m.mods, Mods::DOUBLE_TIME | Mods::HIDDEN);
    for slot in state.matches.fetch_slots(match_id).await.unwrap() {
        assert_eq!(slot.mods, Mods::empty());
    }
}

#[tokio::test]
async fn test_locking_an_occupied_slot_kicks_player() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    let match_id = host_match(&state, &alice, "").await;
    send(&state, bob.session_id, &join_packet(match_id, "")).await;
    drain_everyone(&state).await;

    // The host cannot lock its own slot
    send(&state, alice.session_id, &i32_packet(ClientPacketId::MatchLock, 0)).await;
    let slot = state.matches.fetch_slot(match_id, 0).await.unwrap().unwrap();
    assert_eq!(slot.account_id, Some(ALICE));

    send(&state, alice.session_id, &i32_packet(ClientPacketId::MatchLock, 1)).await;
    let slot = state.matches.fetch_slot(match_id, 1).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::LOCKED);
    assert!(!slot.is_occupied());
    assert!(reload(&state, &bob).await.multiplayer_match_id.is_none());

    let ids = drain_ids(&state, bob.session_id).await;
    assert!(contains(&ids, ServerPacketId::UpdateMatch));
    assert!(contains(&ids, ServerPacketId::ChannelKick));

    // Unlock
    send(&state, alice.session_id, &i32_packet(ClientPacketId::MatchLock, 1)).await;
    let slot = state.matches.fetch_slot(match_id, 1).await.unwrap().unwrap();
    assert_eq!(slot.status, SlotStatus::OPEN);
}

#[tokio::test]
async fn test_change_slot_moves_player() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;

    let match_id = host_match(&state, &alice, "").await;
    send(&state, alice.session_id, &i32_packet(ClientPacketId::MatchChangeSlot, 5)).await;

    let old = state.matches.fetch_slot(match_id, 0).await.unwrap().unwrap();
    let new = state.matches.fetch_slot(match_id, 5).await.unwrap().unwrap();
    assert!(!old.is_occupied());
    assert_eq!(old.status, SlotStatus::OPEN);
    assert_eq!(new.account_id, Some(ALICE));
    assert_eq!(new.session_id, Some(alice.session_id));
    assert_eq!(new.status, SlotStatus::NOT_READY);

    // Out of range ids are ignored
    send(&state, alice.session_id, &i32_packet(ClientPacketId::MatchChangeSlot, 16)).await;
    let new = state.matches.fetch_slot(match_id, 5).await.unwrap().unwrap();
    assert_eq!(new.account_id, Some(ALICE));
}

#[tokio::test]
async fn test_leaving_player_releases_load_and_skip_barriers() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    let match_id = host_match(&state, &alice, "").await;
    send(&state, bob.session_id, &join_packet(match_id, "")).await;
    send(&state, alice.session_id, &empty_packet(ClientPacketId::MatchStart)).await;
    send(&state, alice.session_id, &empty_packet(ClientPacketId::MatchLoadComplete)).await;
    send(&state, alice.session_id, &empty_packet(ClientPacketId::MatchSkipRequest)).await;

    let ids = drain_ids(&state, alice.session_id).await;
    assert!(!contains(&ids, ServerPacketId::MatchAllPlayersLoaded));
    assert!(!contains(&ids, ServerPacketId::MatchSkip));
    drain_everyone(&state).await;

    // Bob never loaded nor skipped, so his leaving clears both waits
    send(&state, bob.session_id, &empty_packet(ClientPacketId::PartMatch)).await;
    let ids = drain_ids(&state, alice.session_id).await;
    assert_eq!(count(&ids, ServerPacketId::MatchAllPlayersLoaded), 1);
    assert_eq!(count(&ids, ServerPacketId::MatchSkip), 1);
    assert!(!contains(&ids, ServerPacketId::MatchComplete));

    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert_eq!(m.status, MatchStatus::Playing);
}

#[tokio::test]
async fn test_leaving_after_barriers_fired_sends_nothing_new() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    let match_id = host_match(&state, &alice, "").await;
    send(&state, bob.session_id, &join_packet(match_id, "")).await;
    send(&state, alice.session_id, &empty_packet(ClientPacketId::MatchStart)).await;
    for session in [&alice, &bob] {
        send(&state, session.session_id, &empty_packet(ClientPacketId::MatchLoadComplete)).await;
    }
    let ids = drain_ids(&state, alice.session_id).await;
    assert_eq!(count(&ids, ServerPacketId::MatchAllPlayersLoaded), 1);
    drain_everyone(&state).await;

    send(&state, bob.session_id, &empty_packet(ClientPacketId::PartMatch)).await;
    let ids = drain_ids(&state, alice.session_id).await;
    assert!(!contains(&ids, ServerPacketId::MatchAllPlayersLoaded));
    assert!(!contains(&ids, ServerPacketId::MatchSkip));
}

#[tokio::test]
async fn test_settings_are_frozen_while_playing() {
    let state = setup_test_env().await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;

    let match_id = host_match(&state, &alice, "").await;
    send(&state, bob.session_id, &join_packet(match_id, "")).await;
    send(&state, alice.session_id, &empty_packet(ClientPacketId::MatchStart)).await;
    drain_everyone(&state).await;

    let mut requested = descriptor("renamed", "", true);
    requested.beatmap_id = 75;
    requested.beatmap_md5 = "a5b99395a42bd55bc5eb1d2411cbdf8b".to_string();
    requested.team_type = bancho_common::MatchTeamType::TeamVs;
    send(
        &state,
        alice.session_id,
        &packet(ClientPacketId::MatchChangeSettings, |w| requested.encode_with(w, true)),
    )
    .await;

    let m = state.matches.fetch_one(match_id).await.unwrap().unwrap();
    assert_eq!(m.name, "test match");
    assert_eq!(m.beatmap_id, 129891);
    assert!(!m.freemods);
    for slot in state.matches.fetch_slots(match_id).await.unwrap() {
        if slot.is_occupied() {
            assert_eq!(slot.status, SlotStatus::PLAYING);
            assert_eq!(slot.team, bancho_common::SlotTeam::Neutral);
        }
    }
    assert!(!contains(&drain_ids(&state, bob.session_id).await, ServerPacketId::UpdateMatch));
}

/// Lock manager whose locks can never be taken.
struct UnavailableLocks;

#[async_trait]
impl LockManager for UnavailableLocks {
    async fn lock(&self, key: &str) -> Result<LockGuard, AppError> {
        Err(AppError::Lock(format!("{key} unavailable")))
    }
}

#[tokio::test]
async fn test_failed_host_seat_leaves_nothing_behind() {
    let state = setup_test_env_with_locks(Arc::new(UnavailableLocks)).await;
    let alice = login_as(&state, "alice").await;
    let bob = login_as(&state, "bob").await;
    send(&state, bob.session_id, &empty_packet(ClientPacketId::JoinLobby)).await;
    drain_everyone(&state).await;

    let result = process_packets(
        &state,
        alice.session_id,
        &create_packet("doomed", "", false),
    )
    .await;
    assert!(matches!(result, Err(AppError::Lock(_))));

    assert!(state.matches.fetch_all().await.unwrap().is_empty());
    let channels = state.channels.fetch_many(None).await.unwrap();
    assert!(channels.iter().all(|c| !c.name.starts_with("#mp_")));
    assert!(reload(&state, &alice).await.multiplayer_match_id.is_none());

    // The lobby never heard of it as a live match
    let ids = drain_ids(&state, bob.session_id).await;
    assert!(!contains(&ids, ServerPacketId::NewMatch));
}

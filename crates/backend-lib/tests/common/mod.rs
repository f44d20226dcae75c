// ============================
// crates/backend-lib/tests/common/mod.rs
// ============================
//! Shared setup for the backend integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use backend_lib::accounts::{Account, MemoryAccounts};
use backend_lib::auth::{login, MemoryAuth};
use backend_lib::config::Settings;
use backend_lib::dispatch::process_packets;
use backend_lib::privileges::Privileges;
use backend_lib::sessions::Session;
use backend_lib::storage::{LockManager, MemoryLockManager, MemoryStorage};
use backend_lib::AppState;
use bancho_common::packet::build_packet;
use bancho_common::{decode_stream, ClientPacketId, PacketWriter, ServerPacketId};
use uuid::Uuid;

pub const ALICE: i32 = 1000;
pub const BOB: i32 = 1001;
pub const CAROL: i32 = 1002;
pub const DAVE: i32 = 1003;

/// MD5 of "password", shared by every seeded account.
pub const PASSWORD_MD5: &str = "5f4dcc3b5aa765d61d8327deb882cf99";

fn account(account_id: i32, username: &str, privileges: Privileges) -> Account {
    Account {
        account_id,
        username: username.to_string(),
        privileges,
        country: "ca".to_string(),
        country_code: 38,
    }
}

/// Build an `AppState` over in-memory storage with four accounts
/// (alice, bob, carol, dave) and the default channels seeded.
///
/// Dave holds the tournament privilege.
pub async fn setup_test_env() -> Arc<AppState> {
    setup_test_env_with_locks(Arc::new(MemoryLockManager::default())).await
}

/// Same as [`setup_test_env`] with a caller-chosen lock manager.
pub async fn setup_test_env_with_locks(locks: Arc<dyn LockManager>) -> Arc<AppState> {
    let accounts = Arc::new(MemoryAccounts::new());
    let auth = Arc::new(MemoryAuth::new());

    for (id, name, privileges) in [
        (ALICE, "alice", Privileges::UNRESTRICTED),
        (BOB, "bob", Privileges::UNRESTRICTED),
        (CAROL, "carol", Privileges::UNRESTRICTED),
        (DAVE, "dave", Privileges::UNRESTRICTED | Privileges::TOURNAMENT),
    ] {
        accounts.insert(account(id, name, privileges));
        auth.set_password(id, PASSWORD_MD5);
    }

    let state = AppState::new(
        Settings::default(),
        Arc::new(MemoryStorage::new()),
        locks,
        accounts.clone(),
        accounts,
        auth,
    );
    state
        .seed_channels()
        .await
        .expect("Failed to seed channels for test");

    Arc::new(state)
}

/// Plain-text login body as the osu! client sends it.
pub fn login_body(username: &str, version: &str) -> Vec<u8> {
    format!("{username}\n{PASSWORD_MD5}\n{version}|0|1|hashes:|0\n").into_bytes()
}

/// Log in with a stable client and return the fresh session. Everything
/// queued for the new session and for already-online sessions is drained.
pub async fn login_as(state: &AppState, username: &str) -> Session {
    login_with_version(state, username, "b20240123").await
}

pub async fn login_with_version(state: &AppState, username: &str, version: &str) -> Session {
    let outcome = login(state, &login_body(username, version))
        .await
        .expect("login failed");
    assert!(outcome.succeeded(), "login for {username} was rejected");

    let session_id = Uuid::parse_str(&outcome.token).expect("token is not a session id");
    let session = state
        .sessions
        .fetch_by_id(session_id)
        .await
        .unwrap()
        .expect("session missing after login");

    drain_everyone(state).await;
    session
}

/// Frame one client packet.
pub fn packet(id: ClientPacketId, write: impl FnOnce(&mut PacketWriter)) -> Vec<u8> {
    build_packet(id, write)
}

/// Frame a client packet without a body.
pub fn empty_packet(id: ClientPacketId) -> Vec<u8> {
    build_packet(id, |_| {})
}

/// Frame a client packet whose body is a single i32.
pub fn i32_packet(id: ClientPacketId, value: i32) -> Vec<u8> {
    build_packet(id, |w| {
        w.write_i32(value);
    })
}

/// Run a request body through the dispatcher for a session.
pub async fn send(state: &AppState, session_id: Uuid, body: &[u8]) {
    process_packets(state, session_id, body)
        .await
        .expect("packet processing failed");
}

/// Drain a session's outbox and return the framed packets as (id, body).
pub async fn drain(state: &AppState, session_id: Uuid) -> Vec<(u16, Vec<u8>)> {
    let queued = state.outbox.dequeue_all(session_id).await.unwrap().concat();
    decode_stream(&queued)
        .expect("outbox holds a malformed packet stream")
        .into_iter()
        .map(|p| (p.id, p.body.to_vec()))
        .collect()
}

/// Drain a session's outbox and return only the packet ids.
pub async fn drain_ids(state: &AppState, session_id: Uuid) -> Vec<u16> {
    drain(state, session_id)
        .await
        .into_iter()
        .map(|(id, _)| id)
        .collect()
}

/// Empty every live session's outbox.
pub async fn drain_everyone(state: &AppState) {
    for session in state.sessions.fetch_all(None).await.unwrap() {
        state.outbox.dequeue_all(session.session_id).await.unwrap();
    }
}

pub fn count(ids: &[u16], id: ServerPacketId) -> usize {
    ids.iter().filter(|i| **i == u16::from(id)).count()
}

pub fn contains(ids: &[u16], id: ServerPacketId) -> bool {
    count(ids, id) > 0
}

/// Reload a session after handlers changed it.
pub async fn reload(state: &AppState, session: &Session) -> Session {
    state
        .sessions
        .fetch_by_id(session.session_id)
        .await
        .unwrap()
        .expect("session disappeared")
}

/// Check the cross-store invariants that every handler must preserve:
/// each match with a seated player has exactly one slot held by its host,
/// and a session is in a host's spectator set exactly when it points back
/// at that host.
pub async fn assert_invariants(state: &AppState, step: &str) {
    for m in state.matches.fetch_all().await.unwrap() {
        let slots = state.matches.fetch_slots(m.match_id).await.unwrap();
        assert_eq!(slots.len(), 16, "{step}: match {} slot count", m.match_id);

        let occupied = slots.iter().filter(|s| s.is_occupied()).count();
        let held_by_host = slots
            .iter()
            .filter(|s| s.account_id == Some(m.host_account_id))
            .count();
        assert!(occupied > 0, "{step}: empty match {} left behind", m.match_id);
        assert_eq!(held_by_host, 1, "{step}: match {} host slots", m.match_id);
    }

    let sessions = state.sessions.fetch_all(None).await.unwrap();
    for session in &sessions {
        if let Some(host_id) = session.spectator_host_session_id {
            let members = state.spectators.members(host_id).await.unwrap();
            assert!(
                members.contains(&session.session_id),
                "{step}: {} points at a host that does not list it",
                session.username
            );
        }
        for spectator_id in state.spectators.members(session.session_id).await.unwrap() {
            let spectator = sessions
                .iter()
                .find(|s| s.session_id == spectator_id)
                .unwrap_or_else(|| panic!("{step}: {} has a dead spectator", session.username));
            assert_eq!(
                spectator.spectator_host_session_id,
                Some(session.session_id),
                "{step}: {} lists {} who watches someone else",
                session.username,
                spectator.username
            );
        }
    }
}

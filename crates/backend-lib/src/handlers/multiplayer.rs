// ============================
// crates/backend-lib/src/handlers/multiplayer.rs
// ============================
//! Multiplayer match packets.
//!
//! Host-only actions from anyone else, and actions that do not fit the
//! sender's slot status, are logged and dropped.
use std::collections::BTreeSet;

use bancho_common::{
    server, ChatMessage, Decode, MatchDescriptor, Mods, PacketReader, ScoreFrame, SlotStatus,
    MATCH_SLOT_COUNT,
};
use metrics::counter;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::{match_channel_name, NewChannel, LOBBY_CHANNEL};
use crate::error::AppError;
use crate::handlers::chat::{join_channel, part_channel};
use crate::matches::{Match, MatchStatus, MatchUpdate, NewMatch, Slot, SlotUpdate};
use crate::metrics::MATCHES_CREATED;
use crate::multiplayer::{
    broadcast_match_updates, dispose_match, enter_match, finish_if_complete, finish_if_loaded,
    finish_if_skipped, leave_match, playing_sessions, reassign_teams, set_freemods,
    transfer_host as hand_over_host,
};
use crate::privileges::Privileges;
use crate::sessions::{Session, SessionUpdate};
use crate::storage::keys;
use crate::AppState;

/// The sender's match and its slots, or `None` (logged) if it is not in one.
async fn current_match(
    state: &AppState,
    session: &Session,
    action: &'static str,
) -> Result<Option<(Match, Vec<Slot>)>, AppError> {
    let Some(match_id) = session.multiplayer_match_id else {
        warn!(session_id = %session.session_id, action, "not in a match");
        return Ok(None);
    };
    let Some(m) = state.matches.fetch_one(match_id).await? else {
        warn!(session_id = %session.session_id, match_id, action, "match no longer exists");
        return Ok(None);
    };
    let slots = state.matches.fetch_slots(match_id).await?;
    Ok(Some((m, slots)))
}

fn own_slot<'a>(slots: &'a [Slot], session: &Session) -> Option<&'a Slot> {
    slots
        .iter()
        .find(|s| s.session_id == Some(session.session_id))
}

fn require_host(m: &Match, session: &Session, action: &'static str) -> bool {
    if m.is_host(session.account_id) {
        return true;
    }
    warn!(
        match_id = m.match_id,
        account_id = session.account_id,
        action,
        "host-only action from non-host"
    );
    false
}

fn read_slot_id(body: &[u8]) -> Result<Option<u8>, AppError> {
    let raw = PacketReader::new(body).read_i32()?;
    Ok(u8::try_from(raw)
        .ok()
        .filter(|id| usize::from(*id) < MATCH_SLOT_COUNT))
}

fn require_tournament(session: &Session, action: &'static str) -> bool {
    if session.privileges.contains(Privileges::TOURNAMENT) {
        return true;
    }
    warn!(session_id = %session.session_id, action, "tournament privilege required");
    false
}

/// Move the sender's own slot from one status to another.
async fn transition_own_slot(
    state: &AppState,
    session: &Session,
    from: SlotStatus,
    to: SlotStatus,
    action: &'static str,
) -> Result<(), AppError> {
    let Some((m, slots)) = current_match(state, session, action).await? else {
        return Ok(());
    };
    let Some(slot) = own_slot(&slots, session) else {
        warn!(match_id = m.match_id, session_id = %session.session_id, action, "no slot in match");
        return Ok(());
    };
    if slot.status != from {
        warn!(
            match_id = m.match_id,
            slot_id = slot.slot_id,
            status = slot.status.bits(),
            action,
            "slot status does not allow this"
        );
        return Ok(());
    }

    state
        .matches
        .update_slot(m.match_id, slot.slot_id, SlotUpdate::status(to))
        .await?;
    broadcast_match_updates(state, m.match_id, true, &[]).await
}

/// CREATE_MATCH
pub async fn create_match(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let requested = MatchDescriptor::from_body(body)?;

    if session.multiplayer_match_id.is_some() {
        warn!(session_id = %session.session_id, "create while already in a match");
        state
            .outbox
            .enqueue(session.session_id, server::match_join_fail())
            .await?;
        return Ok(());
    }
    if !session.privileges.contains(Privileges::UNRESTRICTED) {
        warn!(session_id = %session.session_id, "restricted player tried to create a match");
        state
            .outbox
            .enqueue(session.session_id, server::match_join_fail())
            .await?;
        return Ok(());
    }

    let m = state
        .matches
        .create(NewMatch::from_descriptor(&requested, session.account_id))
        .await?;

    let channel = state
        .channels
        .create(NewChannel {
            name: match_channel_name(m.match_id),
            topic: format!("Multiplayer match #{}", m.match_id),
            read_privileges: Privileges::empty(),
            write_privileges: Privileges::empty(),
            auto_join: false,
            temporary: true,
        })
        .await;
    if let Err(e) = channel {
        error!(match_id = m.match_id, error = %e, "match channel creation failed");
        state.matches.delete(m.match_id).await?;
        return Err(e);
    }

    counter!(MATCHES_CREATED).increment(1);
    info!(match_id = m.match_id, host = session.account_id, name = %m.name, "match created");

    let entered = enter_match(state, &m, session).await;
    if !matches!(entered, Ok(true)) {
        error!(match_id = m.match_id, "host could not enter new match");
        abandon_match(state, m.match_id, session).await?;
        return Err(match entered {
            Err(e) => e,
            Ok(_) => AppError::Invariant(format!(
                "host could not be seated in new match {}",
                m.match_id
            )),
        });
    }

    // Lobby members learn about the match as a new listing
    if let Some(lobby) = state.channels.fetch_by_name(LOBBY_CHANNEL).await? {
        let slots = state.matches.fetch_slots(m.match_id).await?;
        let listing = server::new_match(&m.descriptor(&slots), false);
        state
            .outbox
            .enqueue_many(&state.channels.members(lobby.channel_id).await?, &listing)
            .await?;
    }
    broadcast_match_updates(state, m.match_id, false, &[]).await
}

/// Undo a half-made match so it never shows up anywhere.
async fn abandon_match(state: &AppState, match_id: u16, session: &Session) -> Result<(), AppError> {
    state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                multiplayer_match_id: Some(None),
                ..SessionUpdate::default()
            },
        )
        .await?;
    dispose_match(state, match_id).await
}

/// JOIN_MATCH
pub async fn join_match(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let mut reader = PacketReader::new(body);
    let match_id = reader.read_i32()?;
    let password = reader.read_string()?;

    if session.multiplayer_match_id.is_some() {
        warn!(session_id = %session.session_id, "join while already in a match");
        state
            .outbox
            .enqueue(session.session_id, server::match_join_fail())
            .await?;
        return Ok(());
    }

    let found = match u16::try_from(match_id) {
        Ok(id) => state.matches.fetch_one(id).await?,
        Err(_) => None,
    };
    let Some(m) = found else {
        warn!(session_id = %session.session_id, match_id, "join of unknown match");
        state
            .outbox
            .enqueue(session.session_id, server::match_join_fail())
            .await?;
        return Ok(());
    };

    if !m.password.is_empty() && m.password != password {
        warn!(session_id = %session.session_id, match_id = m.match_id, "wrong match password");
        state
            .outbox
            .enqueue(session.session_id, server::match_join_fail())
            .await?;
        return Ok(());
    }

    if enter_match(state, &m, session).await? {
        broadcast_match_updates(state, m.match_id, true, &[]).await?;
    }
    Ok(())
}

/// PART_MATCH
pub async fn part_match(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    if session.multiplayer_match_id.is_none() {
        warn!(session_id = %session.session_id, "part while not in a match");
        return Ok(());
    }
    leave_match(state, session).await
}

/// MATCH_CHANGE_SLOT
pub async fn change_slot(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let Some(target_id) = read_slot_id(body)? else {
        warn!(session_id = %session.session_id, "slot id out of range");
        return Ok(());
    };
    let Some(match_id) = session.multiplayer_match_id else {
        warn!(session_id = %session.session_id, "change slot while not in a match");
        return Ok(());
    };

    {
        let _guard = state.locks.lock(&keys::match_lock(match_id)).await?;

        let Some(current) = state
            .matches
            .fetch_slot_by_session(match_id, session.session_id)
            .await?
        else {
            warn!(match_id, session_id = %session.session_id, "no slot in match");
            return Ok(());
        };
        let Some(target) = state.matches.fetch_slot(match_id, target_id).await? else {
            return Ok(());
        };
        if !target.is_claimable() {
            warn!(match_id, slot_id = target_id, "target slot is not open");
            return Ok(());
        }

        state
            .matches
            .update_slot(
                match_id,
                target_id,
                SlotUpdate {
                    account_id: Some(current.account_id),
                    session_id: Some(current.session_id),
                    status: Some(current.status),
                    team: Some(current.team),
                    mods: Some(current.mods),
                    loaded: Some(current.loaded),
                    skipped: Some(current.skipped),
                },
            )
            .await?;
        state
            .matches
            .update_slot(match_id, current.slot_id, SlotUpdate::reset())
            .await?;
    }

    broadcast_match_updates(state, match_id, true, &[]).await
}

/// MATCH_READY
pub async fn ready(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    transition_own_slot(state, session, SlotStatus::NOT_READY, SlotStatus::READY, "ready").await
}

/// MATCH_NOT_READY
pub async fn not_ready(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    transition_own_slot(state, session, SlotStatus::READY, SlotStatus::NOT_READY, "not_ready").await
}

/// MATCH_NO_BEATMAP
pub async fn no_beatmap(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    transition_own_slot(
        state,
        session,
        SlotStatus::NOT_READY,
        SlotStatus::NO_BEATMAP,
        "no_beatmap",
    )
    .await
}

/// MATCH_HAS_BEATMAP
pub async fn has_beatmap(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    transition_own_slot(
        state,
        session,
        SlotStatus::NO_BEATMAP,
        SlotStatus::NOT_READY,
        "has_beatmap",
    )
    .await
}

/// MATCH_LOCK. Locking an occupied slot removes its player.
pub async fn lock(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let Some(slot_id) = read_slot_id(body)? else {
        warn!(session_id = %session.session_id, "slot id out of range");
        return Ok(());
    };
    let Some((m, slots)) = current_match(state, session, "lock").await? else {
        return Ok(());
    };
    if !require_host(&m, session, "lock") {
        return Ok(());
    }
    let Some(slot) = slots.iter().find(|s| s.slot_id == slot_id) else {
        return Ok(());
    };

    if slot.status == SlotStatus::LOCKED {
        state
            .matches
            .update_slot(m.match_id, slot_id, SlotUpdate::status(SlotStatus::OPEN))
            .await?;
        return broadcast_match_updates(state, m.match_id, true, &[]).await;
    }

    if slot.account_id == Some(m.host_account_id) {
        warn!(match_id = m.match_id, slot_id, "host cannot lock their own slot");
        return Ok(());
    }

    let kicked = slot.session_id;
    state
        .matches
        .update_slot(
            m.match_id,
            slot_id,
            SlotUpdate {
                status: Some(SlotStatus::LOCKED),
                ..SlotUpdate::reset()
            },
        )
        .await?;

    let mut extra = Vec::new();
    if let Some(kicked_id) = kicked {
        state
            .sessions
            .partial_update(
                kicked_id,
                SessionUpdate {
                    multiplayer_match_id: Some(None),
                    ..SessionUpdate::default()
                },
            )
            .await?;
        if let Some(channel) = state
            .channels
            .fetch_by_name(&match_channel_name(m.match_id))
            .await?
        {
            part_channel(state, kicked_id, &channel).await?;
        }
        info!(match_id = m.match_id, slot_id, kicked = %kicked_id, "player removed by slot lock");
        extra.push(kicked_id);
    }

    broadcast_match_updates(state, m.match_id, true, &extra).await
}

/// MATCH_CHANGE_SETTINGS
pub async fn change_settings(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let requested = MatchDescriptor::from_body(body)?;
    let Some((m, slots)) = current_match(state, session, "change_settings").await? else {
        return Ok(());
    };
    if !require_host(&m, session, "change_settings") {
        return Ok(());
    }
    if m.in_progress() {
        warn!(match_id = m.match_id, "settings change while match is in progress");
        return Ok(());
    }

    if requested.beatmap_md5 != m.beatmap_md5 || requested.beatmap_id != m.beatmap_id {
        for slot in slots.iter().filter(|s| s.status == SlotStatus::READY) {
            state
                .matches
                .update_slot(
                    m.match_id,
                    slot.slot_id,
                    SlotUpdate::status(SlotStatus::NOT_READY),
                )
                .await?;
        }
    }

    if requested.team_type != m.team_type {
        reassign_teams(state, m.match_id, requested.team_type).await?;
    }

    let Some(updated) = state
        .matches
        .partial_update(
            m.match_id,
            MatchUpdate {
                name: Some(requested.name),
                beatmap_name: Some(requested.beatmap_name),
                beatmap_id: Some(requested.beatmap_id),
                beatmap_md5: Some(requested.beatmap_md5),
                mode: Some(requested.mode),
                win_condition: Some(requested.win_condition),
                team_type: Some(requested.team_type),
                random_seed: Some(requested.seed),
                ..MatchUpdate::default()
            },
        )
        .await?
    else {
        return Ok(());
    };

    if requested.freemods != updated.freemods {
        set_freemods(state, &updated, requested.freemods).await?;
    }

    broadcast_match_updates(state, m.match_id, true, &[]).await
}

/// MATCH_START. Every seated player with the beatmap starts playing.
pub async fn start(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    let Some((m, slots)) = current_match(state, session, "start").await? else {
        return Ok(());
    };
    if !require_host(&m, session, "start") {
        return Ok(());
    }
    if m.in_progress() {
        warn!(match_id = m.match_id, "match already in progress");
        return Ok(());
    }

    let mut players = Vec::new();
    for slot in slots
        .iter()
        .filter(|s| s.has_player() && s.status != SlotStatus::NO_BEATMAP)
    {
        state
            .matches
            .update_slot(
                m.match_id,
                slot.slot_id,
                SlotUpdate {
                    status: Some(SlotStatus::PLAYING),
                    loaded: Some(false),
                    skipped: Some(false),
                    ..SlotUpdate::default()
                },
            )
            .await?;
        players.extend(slot.session_id);
    }

    let Some(started) = state
        .matches
        .partial_update(
            m.match_id,
            MatchUpdate {
                status: Some(MatchStatus::Playing),
                ..MatchUpdate::default()
            },
        )
        .await?
    else {
        return Ok(());
    };

    let slots = state.matches.fetch_slots(m.match_id).await?;
    state
        .outbox
        .enqueue_many(&players, &server::match_start(&started.descriptor(&slots)))
        .await?;

    info!(match_id = m.match_id, players = players.len(), "match started");
    broadcast_match_updates(state, m.match_id, true, &[]).await
}

/// MATCH_SCORE_UPDATE. Relayed with the sender's slot id to players and
/// to observers in the match channel.
pub async fn score_update(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let frame = ScoreFrame::from_body(body)?;
    let Some((m, slots)) = current_match(state, session, "score_update").await? else {
        return Ok(());
    };
    let Some(slot) = own_slot(&slots, session) else {
        return Ok(());
    };
    if !slot.is_playing() {
        debug!(match_id = m.match_id, slot_id = slot.slot_id, "score update while not playing");
        return Ok(());
    }

    let mut recipients: BTreeSet<Uuid> = playing_sessions(&slots).into_iter().collect();
    if let Some(channel) = state
        .channels
        .fetch_by_name(&match_channel_name(m.match_id))
        .await?
    {
        let seated: BTreeSet<Uuid> = slots.iter().filter_map(|s| s.session_id).collect();
        recipients.extend(
            state
                .channels
                .members(channel.channel_id)
                .await?
                .into_iter()
                .filter(|id| !seated.contains(id)),
        );
    }

    state
        .outbox
        .enqueue_many(&recipients, &server::match_score_update(slot.slot_id, &frame))
        .await?;
    Ok(())
}

/// MATCH_COMPLETE
pub async fn complete(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    let Some((m, slots)) = current_match(state, session, "complete").await? else {
        return Ok(());
    };
    let Some(slot) = own_slot(&slots, session) else {
        return Ok(());
    };
    if !slot.is_playing() {
        warn!(match_id = m.match_id, slot_id = slot.slot_id, "complete while not playing");
        return Ok(());
    }

    state
        .matches
        .update_slot(m.match_id, slot.slot_id, SlotUpdate::status(SlotStatus::COMPLETE))
        .await?;

    if finish_if_complete(state, m.match_id).await? {
        broadcast_match_updates(state, m.match_id, true, &[]).await?;
    }
    Ok(())
}

/// MATCH_CHANGE_MODS
pub async fn change_mods(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let mods = Mods::from_body(body)?;
    let Some((m, slots)) = current_match(state, session, "change_mods").await? else {
        return Ok(());
    };

    if m.freemods {
        let Some(slot) = own_slot(&slots, session) else {
            return Ok(());
        };
        let (speed, rest) = mods.split_speed();

        // Speed mods stay match-wide and only the host picks them
        if m.is_host(session.account_id) {
            state
                .matches
                .partial_update(
                    m.match_id,
                    MatchUpdate {
                        mods: Some(speed),
                        ..MatchUpdate::default()
                    },
                )
                .await?;
        }
        state
            .matches
            .update_slot(
                m.match_id,
                slot.slot_id,
                SlotUpdate {
                    mods: Some(rest),
                    ..SlotUpdate::default()
                },
            )
            .await?;
    } else {
        if !require_host(&m, session, "change_mods") {
            return Ok(());
        }
        state
            .matches
            .partial_update(
                m.match_id,
                MatchUpdate {
                    mods: Some(mods),
                    ..MatchUpdate::default()
                },
            )
            .await?;
    }

    broadcast_match_updates(state, m.match_id, true, &[]).await
}

/// MATCH_LOAD_COMPLETE. `MATCH_ALL_PLAYERS_LOADED` goes out once, when the
/// last playing slot reports in.
pub async fn load_complete(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    let Some(match_id) = session.multiplayer_match_id else {
        warn!(session_id = %session.session_id, "load complete while not in a match");
        return Ok(());
    };
    let _guard = state.locks.lock(&keys::match_lock(match_id)).await?;

    let Some(slot) = state
        .matches
        .fetch_slot_by_session(match_id, session.session_id)
        .await?
    else {
        return Ok(());
    };
    if !slot.is_playing() || slot.loaded {
        return Ok(());
    }

    state
        .matches
        .update_slot(
            match_id,
            slot.slot_id,
            SlotUpdate {
                loaded: Some(true),
                ..SlotUpdate::default()
            },
        )
        .await?;

    finish_if_loaded(state, match_id).await?;
    Ok(())
}

/// MATCH_FAILED
pub async fn failed(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    let Some((m, slots)) = current_match(state, session, "failed").await? else {
        return Ok(());
    };
    let Some(slot) = own_slot(&slots, session) else {
        return Ok(());
    };
    if !slot.is_playing() {
        return Ok(());
    }

    state
        .outbox
        .enqueue_many(
            &playing_sessions(&slots),
            &server::match_player_failed(slot.slot_id),
        )
        .await?;
    debug!(match_id = m.match_id, slot_id = slot.slot_id, "player failed");
    Ok(())
}

/// MATCH_SKIP_REQUEST. `MATCH_SKIP` goes out once every playing slot skipped.
pub async fn skip_request(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    let Some(match_id) = session.multiplayer_match_id else {
        warn!(session_id = %session.session_id, "skip while not in a match");
        return Ok(());
    };
    let _guard = state.locks.lock(&keys::match_lock(match_id)).await?;

    let Some(slot) = state
        .matches
        .fetch_slot_by_session(match_id, session.session_id)
        .await?
    else {
        return Ok(());
    };
    if !slot.is_playing() || slot.skipped {
        return Ok(());
    }

    state
        .matches
        .update_slot(
            match_id,
            slot.slot_id,
            SlotUpdate {
                skipped: Some(true),
                ..SlotUpdate::default()
            },
        )
        .await?;

    let slots = state.matches.fetch_slots(match_id).await?;
    state
        .outbox
        .enqueue_many(
            &playing_sessions(&slots),
            &server::match_player_skipped(slot.slot_id),
        )
        .await?;

    finish_if_skipped(state, match_id).await?;
    Ok(())
}

/// MATCH_TRANSFER_HOST
pub async fn transfer_host(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let Some(slot_id) = read_slot_id(body)? else {
        warn!(session_id = %session.session_id, "slot id out of range");
        return Ok(());
    };
    let Some((m, slots)) = current_match(state, session, "transfer_host").await? else {
        return Ok(());
    };
    if !require_host(&m, session, "transfer_host") {
        return Ok(());
    }
    let Some(target) = slots.iter().find(|s| s.slot_id == slot_id) else {
        return Ok(());
    };
    if !target.is_occupied() {
        warn!(match_id = m.match_id, slot_id, "host transfer to empty slot");
        return Ok(());
    }

    hand_over_host(state, m.match_id, target).await?;
    broadcast_match_updates(state, m.match_id, true, &[]).await
}

/// MATCH_CHANGE_TEAM. Only under a versus team type.
pub async fn change_team(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    let Some((m, slots)) = current_match(state, session, "change_team").await? else {
        return Ok(());
    };
    if !m.team_type.is_versus() {
        warn!(match_id = m.match_id, "team change outside a versus match");
        return Ok(());
    }
    let Some(slot) = own_slot(&slots, session) else {
        return Ok(());
    };

    state
        .matches
        .update_slot(
            m.match_id,
            slot.slot_id,
            SlotUpdate {
                team: Some(slot.team.opposite()),
                ..SlotUpdate::default()
            },
        )
        .await?;
    broadcast_match_updates(state, m.match_id, true, &[]).await
}

/// MATCH_INVITE
pub async fn invite(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let target_id = PacketReader::new(body).read_i32()?;
    let Some((m, _)) = current_match(state, session, "invite").await? else {
        return Ok(());
    };
    let Some(target) = state.sessions.fetch_primary_by_account_id(target_id).await? else {
        warn!(match_id = m.match_id, target_id, "invite to offline player");
        return Ok(());
    };

    let message = ChatMessage {
        sender: session.username.clone(),
        content: format!(
            "Come join my multiplayer match: [osump://{}/{} {}]",
            m.match_id, m.password, m.name
        ),
        recipient: target.username.clone(),
        sender_id: session.account_id,
    };
    state
        .outbox
        .enqueue(target.session_id, server::match_invite(&message))
        .await?;
    Ok(())
}

/// MATCH_CHANGE_PASSWORD. The lobby is not told.
pub async fn change_password(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let requested = MatchDescriptor::from_body(body)?;
    let Some((m, slots)) = current_match(state, session, "change_password").await? else {
        return Ok(());
    };
    if !require_host(&m, session, "change_password") {
        return Ok(());
    }

    state
        .matches
        .partial_update(
            m.match_id,
            MatchUpdate {
                password: Some(requested.password.clone()),
                ..MatchUpdate::default()
            },
        )
        .await?;

    let participants: Vec<Uuid> = slots
        .iter()
        .filter(|s| s.has_player())
        .filter_map(|s| s.session_id)
        .collect();
    state
        .outbox
        .enqueue_many(
            &participants,
            &server::match_change_password(&requested.password),
        )
        .await?;

    broadcast_match_updates(state, m.match_id, false, &[]).await
}

async fn tournament_target(
    state: &AppState,
    session: &Session,
    body: &[u8],
    action: &'static str,
) -> Result<Option<Match>, AppError> {
    let match_id = PacketReader::new(body).read_i32()?;
    if !require_tournament(session, action) {
        return Ok(None);
    }
    let found = match u16::try_from(match_id) {
        Ok(id) => state.matches.fetch_one(id).await?,
        Err(_) => None,
    };
    if found.is_none() {
        warn!(session_id = %session.session_id, match_id, action, "unknown match");
    }
    Ok(found)
}

/// TOURNAMENT_MATCH_INFO_REQUEST
pub async fn tournament_match_info_request(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let Some(m) = tournament_target(state, session, body, "tournament_match_info").await? else {
        return Ok(());
    };
    let slots = state.matches.fetch_slots(m.match_id).await?;
    state
        .outbox
        .enqueue(session.session_id, server::update_match(&m.descriptor(&slots), false))
        .await?;
    Ok(())
}

/// TOURNAMENT_JOIN_MATCH_CHANNEL. Observe a match chat without a slot.
pub async fn tournament_join_match_channel(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let Some(m) = tournament_target(state, session, body, "tournament_join_channel").await? else {
        return Ok(());
    };
    if state
        .matches
        .fetch_slot_by_account(m.match_id, session.account_id)
        .await?
        .is_some()
    {
        warn!(match_id = m.match_id, account_id = session.account_id, "already playing in this match");
        return Ok(());
    }
    if let Some(channel) = state
        .channels
        .fetch_by_name(&match_channel_name(m.match_id))
        .await?
    {
        join_channel(state, session, &channel).await?;
    }
    Ok(())
}

/// TOURNAMENT_LEAVE_MATCH_CHANNEL
pub async fn tournament_leave_match_channel(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let Some(m) = tournament_target(state, session, body, "tournament_leave_channel").await? else {
        return Ok(());
    };
    if let Some(channel) = state
        .channels
        .fetch_by_name(&match_channel_name(m.match_id))
        .await?
    {
        part_channel(state, session.session_id, &channel).await?;
    }
    Ok(())
}

// ============================
// crates/backend-lib/src/multiplayer.rs
// ============================
//! Match coordination shared by the multiplayer handlers, logout and login.
//!
//! Every function here re-fetches what it needs. Steps that read the slot
//! table and then act on what they saw (seating, completion, load and skip
//! barriers) run under the match lock.
use std::collections::BTreeSet;

use bancho_common::{server, MatchTeamType, Mods, SlotStatus, SlotTeam};
use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channels::{match_channel_name, LOBBY_CHANNEL};
use crate::error::AppError;
use crate::handlers::chat::{join_channel, part_channel};
use crate::matches::{Match, MatchStatus, MatchUpdate, Slot, SlotUpdate};
use crate::metrics::MATCHES_DISPOSED;
use crate::sessions::{Session, SessionUpdate};
use crate::storage::keys;
use crate::AppState;

/// Send the current descriptor to everyone who should see it.
///
/// Players and `extra` sessions get the full descriptor. `#lobby` members get
/// it with the password redacted unless `notify_lobby` is false.
pub async fn broadcast_match_updates(
    state: &AppState,
    match_id: u16,
    notify_lobby: bool,
    extra: &[Uuid],
) -> Result<(), AppError> {
    let Some(m) = state.matches.fetch_one(match_id).await? else {
        debug!(match_id, "match gone before broadcast");
        return Ok(());
    };
    let slots = state.matches.fetch_slots(match_id).await?;
    let descriptor = m.descriptor(&slots);

    let mut participants: BTreeSet<Uuid> = slots
        .iter()
        .filter(|s| s.has_player())
        .filter_map(|s| s.session_id)
        .collect();
    participants.extend(extra.iter().copied());

    let full = server::update_match(&descriptor, true);
    state.outbox.enqueue_many(&participants, &full).await?;

    if notify_lobby {
        if let Some(lobby) = state.channels.fetch_by_name(LOBBY_CHANNEL).await? {
            let redacted = server::update_match(&descriptor, false);
            let watchers: Vec<Uuid> = state
                .channels
                .members(lobby.channel_id)
                .await?
                .into_iter()
                .filter(|id| !participants.contains(id))
                .collect();
            state.outbox.enqueue_many(&watchers, &redacted).await?;
        }
    }

    Ok(())
}

/// Seat a session in the first open slot. `None` when the match is full.
pub async fn seat_player(
    state: &AppState,
    m: &Match,
    session: &Session,
) -> Result<Option<Slot>, AppError> {
    let _guard = state.locks.lock(&keys::match_lock(m.match_id)).await?;

    let Some(slot_id) = state.matches.claim_slot_id(m.match_id).await? else {
        return Ok(None);
    };

    state
        .matches
        .update_slot(
            m.match_id,
            slot_id,
            SlotUpdate::occupy(
                session.account_id,
                session.session_id,
                m.team_type.default_team(),
            ),
        )
        .await
}

/// Seat a session, join it to the match channel and record the match on the
/// session. Sends `MATCH_JOIN_SUCCESS` or `MATCH_JOIN_FAIL`.
pub async fn enter_match(state: &AppState, m: &Match, session: &Session) -> Result<bool, AppError> {
    let Some(slot) = seat_player(state, m, session).await? else {
        warn!(match_id = m.match_id, session_id = %session.session_id, "match is full");
        state
            .outbox
            .enqueue(session.session_id, server::match_join_fail())
            .await?;
        return Ok(false);
    };

    state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                multiplayer_match_id: Some(Some(m.match_id)),
                ..SessionUpdate::default()
            },
        )
        .await?;

    if let Some(channel) = state
        .channels
        .fetch_by_name(&match_channel_name(m.match_id))
        .await?
    {
        join_channel(state, session, &channel).await?;
    } else {
        warn!(match_id = m.match_id, "match has no channel");
    }

    let slots = state.matches.fetch_slots(m.match_id).await?;
    state
        .outbox
        .enqueue(
            session.session_id,
            server::match_join_success(&m.descriptor(&slots)),
        )
        .await?;

    info!(
        match_id = m.match_id,
        slot_id = slot.slot_id,
        account_id = session.account_id,
        "player joined match"
    );
    Ok(true)
}

/// Remove a session from its match. Migrates the host or disposes of the
/// match when it empties.
pub async fn leave_match(state: &AppState, session: &Session) -> Result<(), AppError> {
    let Some(match_id) = session.multiplayer_match_id else {
        return Ok(());
    };

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

    let Some(m) = state.matches.fetch_one(match_id).await? else {
        warn!(match_id, session_id = %session.session_id, "left a match that no longer exists");
        return Ok(());
    };

    let left_slot = state
        .matches
        .fetch_slot_by_session(match_id, session.session_id)
        .await?;
    if let Some(slot) = &left_slot {
        state
            .matches
            .update_slot(match_id, slot.slot_id, SlotUpdate::reset())
            .await?;
    }

    if let Some(channel) = state
        .channels
        .fetch_by_name(&match_channel_name(match_id))
        .await?
    {
        part_channel(state, session.session_id, &channel).await?;
    }

    let occupied: Vec<Slot> = state
        .matches
        .fetch_slots(match_id)
        .await?
        .into_iter()
        .filter(Slot::is_occupied)
        .collect();

    let Some(first) = occupied.first() else {
        return dispose_match(state, match_id).await;
    };

    let host_still_seated = occupied
        .iter()
        .any(|s| s.account_id == Some(m.host_account_id));
    if m.is_host(session.account_id) && !host_still_seated {
        transfer_host(state, match_id, first).await?;
    }

    if m.in_progress() {
        // The leaver may have been the last one holding up a barrier
        if let Some(slot) = left_slot.filter(Slot::is_playing) {
            let _guard = state.locks.lock(&keys::match_lock(match_id)).await?;
            if !slot.loaded {
                finish_if_loaded(state, match_id).await?;
            }
            if !slot.skipped {
                finish_if_skipped(state, match_id).await?;
            }
        }
        finish_if_complete(state, match_id).await?;
    }

    broadcast_match_updates(state, match_id, true, &[]).await
}

/// Make the occupant of `slot` the host and tell them.
pub async fn transfer_host(state: &AppState, match_id: u16, slot: &Slot) -> Result<(), AppError> {
    let (Some(account_id), Some(session_id)) = (slot.account_id, slot.session_id) else {
        return Err(AppError::Invariant(format!(
            "host transfer to empty slot {} of match {match_id}",
            slot.slot_id
        )));
    };

    state
        .matches
        .partial_update(
            match_id,
            MatchUpdate {
                host_account_id: Some(account_id),
                ..MatchUpdate::default()
            },
        )
        .await?;
    state
        .outbox
        .enqueue(session_id, server::match_transfer_host())
        .await?;

    info!(match_id, account_id, slot_id = slot.slot_id, "match host transferred");
    Ok(())
}

/// Tear down a match, its channel and its slots.
pub async fn dispose_match(state: &AppState, match_id: u16) -> Result<(), AppError> {
    let packet = server::dispose_match(match_id);

    let mut recipients = BTreeSet::new();
    if let Some(lobby) = state.channels.fetch_by_name(LOBBY_CHANNEL).await? {
        recipients.extend(state.channels.members(lobby.channel_id).await?);
    }

    let match_channel = state
        .channels
        .fetch_by_name(&match_channel_name(match_id))
        .await?;
    let mut members = Vec::new();
    if let Some(channel) = &match_channel {
        members = state.channels.members(channel.channel_id).await?;
        recipients.extend(members.iter().copied());
    }

    state.outbox.enqueue_many(&recipients, &packet).await?;

    if let Some(channel) = &match_channel {
        for member in &members {
            part_channel(state, *member, channel).await?;
            state
                .sessions
                .partial_update(
                    *member,
                    SessionUpdate {
                        multiplayer_match_id: Some(None),
                        ..SessionUpdate::default()
                    },
                )
                .await?;
        }
        state.channels.delete(channel.channel_id).await?;
    }

    state.matches.delete(match_id).await?;
    counter!(MATCHES_DISPOSED).increment(1);
    info!(match_id, "match disposed");
    Ok(())
}

/// Switch freemods on or off.
///
/// On: speed-changing mods stay on the match, the rest move to every
/// occupied slot. Off: the host's slot mods rejoin the match mods and every
/// slot's mods are cleared.
pub async fn set_freemods(state: &AppState, m: &Match, enabled: bool) -> Result<(), AppError> {
    let slots = state.matches.fetch_slots(m.match_id).await?;

    if enabled {
        let (speed, rest) = m.mods.split_speed();
        for slot in slots.iter().filter(|s| s.is_occupied()) {
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
        }
        state
            .matches
            .partial_update(
                m.match_id,
                MatchUpdate {
                    mods: Some(speed),
                    freemods: Some(true),
                    ..MatchUpdate::default()
                },
            )
            .await?;
    } else {
        let host_mods = slots
            .iter()
            .find(|s| s.account_id == Some(m.host_account_id))
            .map_or(Mods::empty(), |s| s.mods);
        let (speed, _) = m.mods.split_speed();

        for slot in &slots {
            if !slot.mods.is_empty() {
                state
                    .matches
                    .update_slot(
                        m.match_id,
                        slot.slot_id,
                        SlotUpdate {
                            mods: Some(Mods::empty()),
                            ..SlotUpdate::default()
                        },
                    )
                    .await?;
            }
        }
        state
            .matches
            .partial_update(
                m.match_id,
                MatchUpdate {
                    mods: Some(speed | host_mods),
                    freemods: Some(false),
                    ..MatchUpdate::default()
                },
            )
            .await?;
    }

    Ok(())
}

/// Put every occupied slot on the default team of `team_type`.
pub async fn reassign_teams(
    state: &AppState,
    match_id: u16,
    team_type: MatchTeamType,
) -> Result<(), AppError> {
    let team = team_type.default_team();
    for slot in state.matches.fetch_slots(match_id).await? {
        let wanted = if slot.is_occupied() { team } else { SlotTeam::Neutral };
        if slot.team != wanted {
            state
                .matches
                .update_slot(
                    match_id,
                    slot.slot_id,
                    SlotUpdate {
                        team: Some(wanted),
                        ..SlotUpdate::default()
                    },
                )
                .await?;
        }
    }
    Ok(())
}

/// End the round once no slot is still playing.
///
/// Completed slots go back to NOT_READY and their players get
/// `MATCH_COMPLETE`. Returns whether the round ended here.
pub async fn finish_if_complete(state: &AppState, match_id: u16) -> Result<bool, AppError> {
    let _guard = state.locks.lock(&keys::match_lock(match_id)).await?;

    let Some(m) = state.matches.fetch_one(match_id).await? else {
        return Ok(false);
    };
    if !m.in_progress() {
        return Ok(false);
    }

    let slots = state.matches.fetch_slots(match_id).await?;
    if slots.iter().any(Slot::is_playing) {
        return Ok(false);
    }

    state
        .matches
        .partial_update(
            match_id,
            MatchUpdate {
                status: Some(MatchStatus::Waiting),
                ..MatchUpdate::default()
            },
        )
        .await?;

    let mut finished = Vec::new();
    for slot in slots.iter().filter(|s| s.status == SlotStatus::COMPLETE) {
        state
            .matches
            .update_slot(
                match_id,
                slot.slot_id,
                SlotUpdate {
                    status: Some(SlotStatus::NOT_READY),
                    loaded: Some(false),
                    skipped: Some(false),
                    ..SlotUpdate::default()
                },
            )
            .await?;
        finished.extend(slot.session_id);
    }

    state
        .outbox
        .enqueue_many(&finished, &server::match_complete())
        .await?;

    info!(match_id, players = finished.len(), "match round complete");
    Ok(true)
}

/// Send `MATCH_ALL_PLAYERS_LOADED` when every playing slot has loaded.
/// The caller holds the match lock.
pub async fn finish_if_loaded(state: &AppState, match_id: u16) -> Result<bool, AppError> {
    let slots = state.matches.fetch_slots(match_id).await?;
    let players = playing_sessions(&slots);
    if players.is_empty() || !slots.iter().filter(|s| s.is_playing()).all(|s| s.loaded) {
        return Ok(false);
    }

    state
        .outbox
        .enqueue_many(&players, &server::match_all_players_loaded())
        .await?;
    debug!(match_id, "all players loaded");
    Ok(true)
}

/// Send `MATCH_SKIP` when every playing slot has asked to skip.
/// The caller holds the match lock.
pub async fn finish_if_skipped(state: &AppState, match_id: u16) -> Result<bool, AppError> {
    let slots = state.matches.fetch_slots(match_id).await?;
    let players = playing_sessions(&slots);
    if players.is_empty() || !slots.iter().filter(|s| s.is_playing()).all(|s| s.skipped) {
        return Ok(false);
    }

    state.outbox.enqueue_many(&players, &server::match_skip()).await?;
    debug!(match_id, "all players skipped");
    Ok(true)
}

/// Sessions seated in a playing slot.
pub fn playing_sessions(slots: &[Slot]) -> Vec<Uuid> {
    slots
        .iter()
        .filter(|s| s.is_playing())
        .filter_map(|s| s.session_id)
        .collect()
}

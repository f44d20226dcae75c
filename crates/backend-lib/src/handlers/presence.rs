// ============================
// crates/backend-lib/src/handlers/presence.rs
// ============================
//! Status changes, presence requests and logout.
use bancho_common::{server, ActionChange, ChatMessage, Decode, PacketReader};
use tracing::{debug, info};

use crate::error::AppError;
use crate::handlers::spectate::{drop_spectators, stop_spectating};
use crate::multiplayer::leave_match;
use crate::presence::{presence_packet, stats_packet};
use crate::sessions::{Session, SessionUpdate};
use crate::AppState;

/// Remove every trace of a session and announce its departure.
///
/// Runs for LOGOUT and when a new login replaces a primary session.
pub async fn end_session(state: &AppState, session: &Session) -> Result<(), AppError> {
    stop_spectating(state, session).await?;
    drop_spectators(state, session).await?;
    leave_match(state, session).await?;

    for channel in state.channels.fetch_many(None).await? {
        state
            .channels
            .remove_member(channel.channel_id, session.session_id)
            .await?;
    }

    state.outbox.delete(session.session_id).await?;
    state.sessions.delete_by_id(session.session_id).await?;

    // A tournament client leaving does not take the player offline
    if session.primary {
        let others: Vec<_> = state
            .sessions
            .fetch_all(None)
            .await?
            .into_iter()
            .map(|s| s.session_id)
            .collect();
        state
            .outbox
            .enqueue_many(&others, &server::user_logout(session.account_id))
            .await?;
    }

    info!(session_id = %session.session_id, account_id = session.account_id, "session ended");
    Ok(())
}

/// CHANGE_ACTION
pub async fn change_action(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let change = ActionChange::from_body(body)?;

    let Some(updated) = state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                action: Some(change.action),
                info_text: Some(change.info_text),
                beatmap_md5: Some(change.beatmap_md5),
                beatmap_id: Some(change.beatmap_id),
                mods: Some(change.mods),
                game_mode: Some(change.mode),
                ..SessionUpdate::default()
            },
        )
        .await?
    else {
        return Ok(());
    };

    let packet = stats_packet(state, &updated).await?;
    let everyone: Vec<_> = state
        .sessions
        .fetch_all(None)
        .await?
        .into_iter()
        .map(|s| s.session_id)
        .collect();
    state.outbox.enqueue_many(&everyone, &packet).await?;
    Ok(())
}

/// REQUEST_STATUS_UPDATE
pub async fn request_status_update(
    state: &AppState,
    session: &Session,
    _body: &[u8],
) -> Result<(), AppError> {
    state
        .outbox
        .enqueue(session.session_id, stats_packet(state, session).await?)
        .await?;
    Ok(())
}

/// PING. The poll itself refreshed the session.
pub async fn ping(_state: &AppState, _session: &Session, _body: &[u8]) -> Result<(), AppError> {
    Ok(())
}

/// LOGOUT
pub async fn logout(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    end_session(state, session).await
}

async fn requested_sessions(state: &AppState, body: &[u8]) -> Result<Vec<Session>, AppError> {
    let account_ids = PacketReader::new(body).read_i32_list()?;
    Ok(state
        .sessions
        .fetch_all(None)
        .await?
        .into_iter()
        .filter(|s| s.primary && account_ids.contains(&s.account_id))
        .collect())
}

/// USER_STATS_REQUEST
pub async fn user_stats_request(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    for other in requested_sessions(state, body).await? {
        if other.session_id == session.session_id {
            continue;
        }
        state
            .outbox
            .enqueue(session.session_id, stats_packet(state, &other).await?)
            .await?;
    }
    Ok(())
}

/// USER_PRESENCE_REQUEST
pub async fn user_presence_request(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    for other in requested_sessions(state, body).await? {
        state
            .outbox
            .enqueue(session.session_id, presence_packet(state, &other).await?)
            .await?;
    }
    Ok(())
}

/// USER_PRESENCE_REQUEST_ALL
pub async fn user_presence_request_all(
    state: &AppState,
    session: &Session,
    _body: &[u8],
) -> Result<(), AppError> {
    for other in state.sessions.fetch_all(None).await? {
        if other.session_id == session.session_id {
            continue;
        }
        state
            .outbox
            .enqueue(session.session_id, presence_packet(state, &other).await?)
            .await?;
    }
    Ok(())
}

/// SET_AWAY_MESSAGE. An empty message clears it.
pub async fn set_away_message(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let message = ChatMessage::from_body(body)?;
    let away = Some(message.content.trim().to_string()).filter(|m| !m.is_empty());
    debug!(session_id = %session.session_id, away = away.is_some(), "away message changed");

    state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                away_message: Some(away),
                ..SessionUpdate::default()
            },
        )
        .await?;
    Ok(())
}

/// TOGGLE_BLOCK_NON_FRIEND_DMS
pub async fn toggle_block_non_friend_dms(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let blocked = PacketReader::new(body).read_i32()? == 1;
    state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                block_non_friend_dms: Some(blocked),
                ..SessionUpdate::default()
            },
        )
        .await?;
    Ok(())
}

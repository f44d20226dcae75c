// ============================
// crates/backend-lib/src/handlers/lobby.rs
// ============================
//! The multiplayer lobby listing.
use bancho_common::server;
use tracing::{debug, warn};

use crate::channels::LOBBY_CHANNEL;
use crate::error::AppError;
use crate::handlers::chat::join_channel;
use crate::sessions::{Session, SessionUpdate};
use crate::AppState;

/// JOIN_LOBBY. Lists every match, passwords redacted.
pub async fn join_lobby(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    let Some(lobby) = state.channels.fetch_by_name(LOBBY_CHANNEL).await? else {
        warn!("lobby channel is not configured");
        return Ok(());
    };

    join_channel(state, session, &lobby).await?;
    state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                receive_match_updates: Some(true),
                ..SessionUpdate::default()
            },
        )
        .await?;

    let matches = state.matches.fetch_all().await?;
    for m in &matches {
        let slots = state.matches.fetch_slots(m.match_id).await?;
        state
            .outbox
            .enqueue(
                session.session_id,
                server::new_match(&m.descriptor(&slots), false),
            )
            .await?;
    }

    debug!(session_id = %session.session_id, matches = matches.len(), "joined lobby");
    Ok(())
}

/// PART_LOBBY
pub async fn part_lobby(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    if let Some(lobby) = state.channels.fetch_by_name(LOBBY_CHANNEL).await? {
        state
            .channels
            .remove_member(lobby.channel_id, session.session_id)
            .await?;
    }

    state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                receive_match_updates: Some(false),
                ..SessionUpdate::default()
            },
        )
        .await?;
    Ok(())
}

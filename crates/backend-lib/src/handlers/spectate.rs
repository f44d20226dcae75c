// ============================
// crates/backend-lib/src/handlers/spectate.rs
// ============================
//! Spectating.
//!
//! The graph entry on the host and the `spectator_host_session_id` on the
//! spectator are always changed together. The `#spec_` channel exists while
//! the host has at least one spectator.
use bancho_common::{server, Decode, PacketReader, ReplayFrameBundle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channels::{spectator_channel_name, Channel, NewChannel};
use crate::error::AppError;
use crate::handlers::chat::{join_channel, part_channel};
use crate::privileges::Privileges;
use crate::sessions::{Session, SessionUpdate};
use crate::AppState;

async fn spectator_channel(state: &AppState, host: &Session) -> Result<Channel, AppError> {
    let name = spectator_channel_name(host.session_id);
    if let Some(channel) = state.channels.fetch_by_name(&name).await? {
        return Ok(channel);
    }

    let created = state
        .channels
        .create(NewChannel {
            name: name.clone(),
            topic: format!("{}'s spectator channel", host.username),
            read_privileges: Privileges::empty(),
            write_privileges: Privileges::empty(),
            auto_join: false,
            temporary: true,
        })
        .await;

    match created {
        Ok(channel) => {
            join_channel(state, host, &channel).await?;
            Ok(channel)
        },
        // Another spectator created it first
        Err(e) => state.channels.fetch_by_name(&name).await?.ok_or(e),
    }
}

/// Detach a session from the host it is watching. Tears the spectator
/// channel down once only the host is left in it.
pub async fn stop_spectating(state: &AppState, session: &Session) -> Result<(), AppError> {
    let Some(host_id) = session.spectator_host_session_id else {
        return Ok(());
    };

    state.spectators.remove(host_id, session.session_id).await?;
    state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                spectator_host_session_id: Some(None),
                ..SessionUpdate::default()
            },
        )
        .await?;

    let remaining = state.spectators.members(host_id).await?;
    state
        .outbox
        .enqueue(host_id, server::spectator_left(session.account_id))
        .await?;
    state
        .outbox
        .enqueue_many(&remaining, &server::fellow_spectator_left(session.account_id))
        .await?;

    if let Some(channel) = state
        .channels
        .fetch_by_name(&spectator_channel_name(host_id))
        .await?
    {
        part_channel(state, session.session_id, &channel).await?;

        if state.channels.member_count(channel.channel_id).await? <= 1 {
            part_channel(state, host_id, &channel).await?;
            state.channels.delete(channel.channel_id).await?;
            debug!(host_session_id = %host_id, "spectator channel closed");
        }
    }

    info!(session_id = %session.session_id, host_session_id = %host_id, "stopped spectating");
    Ok(())
}

/// Detach every spectator of `host` and close its channel.
pub async fn drop_spectators(state: &AppState, host: &Session) -> Result<(), AppError> {
    let spectators = state.spectators.members(host.session_id).await?;
    let channel = state
        .channels
        .fetch_by_name(&spectator_channel_name(host.session_id))
        .await?;

    for spectator in &spectators {
        state
            .sessions
            .partial_update(
                *spectator,
                SessionUpdate {
                    spectator_host_session_id: Some(None),
                    ..SessionUpdate::default()
                },
            )
            .await?;
        if let Some(channel) = &channel {
            part_channel(state, *spectator, channel).await?;
        }
    }
    state.spectators.clear(host.session_id).await?;

    if let Some(channel) = &channel {
        part_channel(state, host.session_id, channel).await?;
        state.channels.delete(channel.channel_id).await?;
    }
    Ok(())
}

/// START_SPECTATING
pub async fn start_spectating(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let target_id = PacketReader::new(body).read_i32()?;

    let Some(host) = state.sessions.fetch_primary_by_account_id(target_id).await? else {
        warn!(session_id = %session.session_id, target_id, "spectate target is offline");
        return Ok(());
    };
    if host.session_id == session.session_id {
        warn!(session_id = %session.session_id, "tried to spectate self");
        return Ok(());
    }

    match session.spectator_host_session_id {
        Some(current) if current == host.session_id => {
            debug!(session_id = %session.session_id, "already spectating this host");
            return Ok(());
        },
        Some(_) => stop_spectating(state, session).await?,
        None => {},
    }

    let channel = spectator_channel(state, &host).await?;
    join_channel(state, session, &channel).await?;

    let fellows = state.spectators.members(host.session_id).await?;
    state.spectators.add(host.session_id, session.session_id).await?;
    state
        .sessions
        .partial_update(
            session.session_id,
            SessionUpdate {
                spectator_host_session_id: Some(Some(host.session_id)),
                ..SessionUpdate::default()
            },
        )
        .await?;

    state
        .outbox
        .enqueue(host.session_id, server::spectator_joined(session.account_id))
        .await?;

    let joined = server::fellow_spectator_joined(session.account_id);
    for fellow_id in fellows {
        let Some(fellow) = state.sessions.fetch_by_id(fellow_id).await? else {
            continue;
        };
        state.outbox.enqueue(fellow_id, joined.clone()).await?;
        state
            .outbox
            .enqueue(
                session.session_id,
                server::fellow_spectator_joined(fellow.account_id),
            )
            .await?;
    }

    info!(
        session_id = %session.session_id,
        host_session_id = %host.session_id,
        "started spectating"
    );
    Ok(())
}

/// STOP_SPECTATING
pub async fn stop_spectating_handler(
    state: &AppState,
    session: &Session,
    _body: &[u8],
) -> Result<(), AppError> {
    if session.spectator_host_session_id.is_none() {
        warn!(session_id = %session.session_id, "stop spectating while not spectating");
        return Ok(());
    }
    stop_spectating(state, session).await
}

/// SPECTATE_FRAMES. Relayed to every spectator of the sender.
pub async fn spectate_frames(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let bundle = ReplayFrameBundle::from_body(body)?;
    let spectators = state.spectators.members(session.session_id).await?;
    if spectators.is_empty() {
        return Ok(());
    }

    state
        .outbox
        .enqueue_many(&spectators, &server::spectate_frames(&bundle))
        .await?;
    Ok(())
}

/// CANT_SPECTATE. The spectator lacks the beatmap; host and fellows are told.
pub async fn cant_spectate(state: &AppState, session: &Session, _body: &[u8]) -> Result<(), AppError> {
    let Some(host_id) = session.spectator_host_session_id else {
        warn!(session_id = %session.session_id, "cant spectate while not spectating");
        return Ok(());
    };

    let mut recipients: Vec<Uuid> = state
        .spectators
        .members(host_id)
        .await?
        .into_iter()
        .filter(|id| *id != session.session_id)
        .collect();
    recipients.push(host_id);

    state
        .outbox
        .enqueue_many(
            &recipients,
            &server::spectator_cant_spectate(session.account_id),
        )
        .await?;
    Ok(())
}

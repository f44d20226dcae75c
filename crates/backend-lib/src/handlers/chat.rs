// ============================
// crates/backend-lib/src/handlers/chat.rs
// ============================
//! Public and private messages and channel membership.
use bancho_common::{server, ChatMessage, Decode, PacketReader};
use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channels::{
    client_channel_name, match_channel_name, spectator_channel_name, Channel, MULTIPLAYER_ALIAS,
    SPECTATOR_ALIAS,
};
use crate::error::AppError;
use crate::metrics::CHAT_MESSAGES;
use crate::sessions::Session;
use crate::AppState;

/// Longest message relayed as is. Longer ones are cut.
const MAX_MESSAGE_CHARS: usize = 2000;

/// Add a session to a channel and send it `CHANNEL_JOIN_SUCCESS`.
/// Returns false when the session may not read the channel.
pub(crate) async fn join_channel(
    state: &AppState,
    session: &Session,
    channel: &Channel,
) -> Result<bool, AppError> {
    if !channel.can_read(session.privileges) {
        warn!(
            session_id = %session.session_id,
            channel = %channel.name,
            "join refused, missing read privileges"
        );
        return Ok(false);
    }

    state
        .channels
        .add_member(channel.channel_id, session.session_id)
        .await?;
    state
        .outbox
        .enqueue(
            session.session_id,
            server::channel_join_success(client_channel_name(&channel.name)),
        )
        .await?;
    Ok(true)
}

/// Remove a session from a channel and send it `CHANNEL_KICK`.
pub(crate) async fn part_channel(
    state: &AppState,
    session_id: Uuid,
    channel: &Channel,
) -> Result<bool, AppError> {
    let removed = state
        .channels
        .remove_member(channel.channel_id, session_id)
        .await?;
    if removed {
        state
            .outbox
            .enqueue(session_id, server::channel_kick(client_channel_name(&channel.name)))
            .await?;
    }
    Ok(removed)
}

/// Look up a channel by the name a client used, resolving the match and
/// spectator aliases for this session.
pub(crate) async fn resolve_channel(
    state: &AppState,
    session: &Session,
    name: &str,
) -> Result<Option<Channel>, AppError> {
    let real_name = match name {
        MULTIPLAYER_ALIAS => match session.multiplayer_match_id {
            Some(match_id) => match_channel_name(match_id),
            None => return Ok(None),
        },
        SPECTATOR_ALIAS => {
            let host = session
                .spectator_host_session_id
                .unwrap_or(session.session_id);
            spectator_channel_name(host)
        },
        other => other.to_string(),
    };

    state.channels.fetch_by_name(&real_name).await
}

fn clamp_content(content: &str) -> String {
    let content = content.trim();
    if content.chars().count() > MAX_MESSAGE_CHARS {
        let cut: String = content.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{cut}... (truncated)")
    } else {
        content.to_string()
    }
}

/// SEND_PUBLIC_MESSAGE
pub async fn send_public_message(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let message = ChatMessage::from_body(body)?;
    let content = clamp_content(&message.content);
    if content.is_empty() {
        return Ok(());
    }

    let Some(channel) = resolve_channel(state, session, &message.recipient).await? else {
        warn!(session_id = %session.session_id, channel = %message.recipient, "message to unknown channel");
        return Ok(());
    };

    if !state
        .channels
        .is_member(channel.channel_id, session.session_id)
        .await?
    {
        warn!(session_id = %session.session_id, channel = %channel.name, "message to channel not joined");
        return Ok(());
    }
    if !channel.can_write(session.privileges) {
        warn!(session_id = %session.session_id, channel = %channel.name, "missing write privileges");
        return Ok(());
    }

    let packet = server::send_message(&ChatMessage {
        sender: session.username.clone(),
        content,
        recipient: message.recipient.clone(),
        sender_id: session.account_id,
    });
    let recipients: Vec<Uuid> = state
        .channels
        .members(channel.channel_id)
        .await?
        .into_iter()
        .filter(|id| *id != session.session_id)
        .collect();
    state.outbox.enqueue_many(&recipients, &packet).await?;

    counter!(CHAT_MESSAGES, "kind" => "public").increment(1);
    debug!(session_id = %session.session_id, channel = %channel.name, recipients = recipients.len(), "public message");
    Ok(())
}

/// SEND_PRIVATE_MESSAGE
pub async fn send_private_message(
    state: &AppState,
    session: &Session,
    body: &[u8],
) -> Result<(), AppError> {
    let message = ChatMessage::from_body(body)?;
    let content = clamp_content(&message.content);
    if content.is_empty() {
        return Ok(());
    }

    let Some(target) = state
        .sessions
        .fetch_primary_by_username(&message.recipient)
        .await?
    else {
        debug!(session_id = %session.session_id, recipient = %message.recipient, "private message to offline player");
        return Ok(());
    };

    // No friend list here, so a block covers every sender
    if target.block_non_friend_dms {
        state
            .outbox
            .enqueue(session.session_id, server::user_dm_blocked(&target.username))
            .await?;
        return Ok(());
    }

    state
        .outbox
        .enqueue(
            target.session_id,
            server::send_message(&ChatMessage {
                sender: session.username.clone(),
                content,
                recipient: target.username.clone(),
                sender_id: session.account_id,
            }),
        )
        .await?;

    if let Some(away) = &target.away_message {
        state
            .outbox
            .enqueue(
                session.session_id,
                server::send_message(&ChatMessage {
                    sender: target.username.clone(),
                    content: away.clone(),
                    recipient: session.username.clone(),
                    sender_id: target.account_id,
                }),
            )
            .await?;
    }

    counter!(CHAT_MESSAGES, "kind" => "private").increment(1);
    Ok(())
}

/// CHANNEL_JOIN
pub async fn channel_join(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let name = PacketReader::new(body).read_string()?;
    let Some(channel) = resolve_channel(state, session, &name).await? else {
        warn!(session_id = %session.session_id, channel = %name, "join of unknown channel");
        return Ok(());
    };

    join_channel(state, session, &channel).await?;
    Ok(())
}

/// CHANNEL_PART
pub async fn channel_part(state: &AppState, session: &Session, body: &[u8]) -> Result<(), AppError> {
    let name = PacketReader::new(body).read_string()?;
    let Some(channel) = resolve_channel(state, session, &name).await? else {
        debug!(session_id = %session.session_id, channel = %name, "part of unknown channel");
        return Ok(());
    };

    if !part_channel(state, session.session_id, &channel).await? {
        debug!(session_id = %session.session_id, channel = %channel.name, "part of channel not joined");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_messages_are_cut() {
        let long = "a".repeat(MAX_MESSAGE_CHARS + 10);
        let clamped = clamp_content(&long);
        assert!(clamped.ends_with("... (truncated)"));
        let kept = clamped.strip_suffix("... (truncated)").unwrap();
        assert_eq!(kept.chars().count(), MAX_MESSAGE_CHARS);
        assert!(kept.chars().all(|c| c == 'a'));

        assert_eq!(clamp_content("  hi  "), "hi");
    }
}

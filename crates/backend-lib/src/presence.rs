// ============================
// crates/backend-lib/src/presence.rs
// ============================
//! Presence and statistics packets built from a session.
use bancho_common::{server, UserPresence, UserStats};

use crate::error::AppError;
use crate::sessions::Session;
use crate::AppState;

pub fn user_presence(session: &Session, global_rank: i32) -> UserPresence {
    UserPresence {
        account_id: session.account_id,
        username: session.username.clone(),
        utc_offset: session.utc_offset,
        country_code: session.country_code,
        privileges: session.privileges.to_client(),
        mode: session.game_mode,
        longitude: session.longitude,
        latitude: session.latitude,
        global_rank,
    }
}

/// Statistics of the session's current leaderboard mode.
pub async fn user_stats(state: &AppState, session: &Session) -> Result<UserStats, AppError> {
    let stats = state
        .stats
        .fetch(session.account_id, session.computed_mode())
        .await?
        .unwrap_or_default();

    // The client reads pp as i16. Past that it shows ranked score in its place.
    let (ranked_score, pp) = match i16::try_from(stats.pp) {
        Ok(pp) => (stats.ranked_score, pp),
        Err(_) => (i64::from(stats.pp), 0),
    };

    Ok(UserStats {
        account_id: session.account_id,
        action: session.action,
        info_text: session.info_text.clone(),
        beatmap_md5: session.beatmap_md5.clone(),
        mods: session.mods,
        mode: session.game_mode,
        beatmap_id: session.beatmap_id,
        ranked_score,
        accuracy: stats.accuracy / 100.0,
        play_count: stats.play_count,
        total_score: stats.total_score,
        global_rank: stats.global_rank,
        pp,
    })
}

pub async fn stats_packet(state: &AppState, session: &Session) -> Result<Vec<u8>, AppError> {
    Ok(server::user_stats(&user_stats(state, session).await?))
}

pub async fn presence_packet(state: &AppState, session: &Session) -> Result<Vec<u8>, AppError> {
    let stats = user_stats(state, session).await?;
    Ok(server::user_presence(&user_presence(session, stats.global_rank)))
}

/// `USER_PRESENCE` followed by `USER_STATS`.
pub async fn presence_packets(state: &AppState, session: &Session) -> Result<Vec<u8>, AppError> {
    let stats = user_stats(state, session).await?;
    let mut out = server::user_presence(&user_presence(session, stats.global_rank));
    out.extend(server::user_stats(&stats));
    Ok(out)
}
